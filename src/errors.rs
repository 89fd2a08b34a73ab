/// Error shapes a caller actually branches on. Everything else (absorbed
/// external failures, per-field parse misses) never reaches this type — it
/// is logged and discarded at the boundary that produced it, per the error
/// handling design.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A poll result's `stdout` was not a single valid JSON object.
    #[error("malformed poll result from {label}: {source}")]
    MalformedResult { label: String, source: serde_json::Error },
    /// A poll result referenced a gateway this engine has no record of.
    #[error("no gateway entry for {gw_number}")]
    UnknownGateway { gw_number: String },
    /// Saving an uploaded file to disk failed.
    #[error("error saving {filename}: {source}")]
    UploadIo { filename: String, source: std::io::Error },
    /// The external interpreter (or `capinfos`/`tshark`/`netstat`) could not
    /// be launched at all.
    #[error("failed to launch {program}: {source}")]
    Launch { program: String, source: std::io::Error },
}
