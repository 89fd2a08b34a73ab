//! Enriches each uploaded capture with `capinfos` and RTP-stream-analyzer
//! output, then files it into `PCAPs`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::upload_server::UploadMeta;
use super::Engine;
use crate::capture::Capture;
use crate::process_runner::run_cmd;

/// Drains the upload queue until it closes or cancellation fires. A
/// failure from either external tool yields an empty field rather than
/// dropping the capture record — the file was already saved and deserves
/// an entry even if enrichment is incomplete.
pub async fn run(
    engine: Arc<Engine>,
    mut rx: mpsc::Receiver<UploadMeta>,
    timeout: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        let meta = tokio::select! {
            meta = rx.recv() => match meta {
                Some(m) => m,
                None => break,
            },
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    break;
                }
                continue;
            }
        };

        process_one(&engine, meta, timeout).await;
    }
}

async fn process_one(engine: &Arc<Engine>, meta: UploadMeta, timeout: Duration) {
    let path_str = meta.path.to_string_lossy().to_string();

    let capinfos = run_cmd("capinfos", &[&path_str], timeout, Some(&meta.filename)).await;
    let capinfos_text = if capinfos.returncode == Some(0) {
        capinfos.stdout
    } else {
        tracing::warn!(filename = %meta.filename, "capinfos failed, storing capture without it");
        String::new()
    };

    let rtpinfos = run_cmd(
        "tshark",
        &[
            "-n",
            "-q",
            "-o",
            "rtp.heuristic_rtp:TRUE",
            "-z",
            "rtp,streams",
            "-r",
            &path_str,
        ],
        timeout,
        Some(&meta.filename),
    )
    .await;
    let rtpinfos_text = if rtpinfos.returncode == Some(0) {
        rtpinfos.stdout
    } else {
        tracing::warn!(filename = %meta.filename, "tshark rtp-streams analysis failed, storing capture without it");
        String::new()
    };

    let gw_number = engine
        .stores
        .gws
        .read()
        .get(&meta.remote_ip)
        .cloned()
        .unwrap_or_else(|| "NA".to_string());

    let capture = Capture {
        remote_ip: meta.remote_ip,
        filename: meta.filename.clone(),
        file_size: meta.file_size,
        received_timestamp: meta.received_timestamp,
        capinfos: capinfos_text,
        rtpinfos: rtpinfos_text,
        gw_number,
    };

    engine.stores.pcaps.write().put(meta.filename, capture);
}
