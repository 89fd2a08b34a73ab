//! A minimal HTTP/1.1 server for pcap uploads: one `PUT`/`POST` per
//! connection, filename taken from the request path, body written to disk
//! as-is, `Connection: close` on every response.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// One successfully-received upload, handed off to the Upload Processor.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub remote_ip: String,
    pub filename: String,
    pub path: PathBuf,
    pub file_size: u64,
    pub received_timestamp: chrono::NaiveDateTime,
}

/// Accepts connections on `addr` until cancellation fires, writing uploads
/// under `upload_dir`. Each connection is handled independently; a
/// malformed request never takes the listener down.
pub async fn run(
    addr: SocketAddr,
    upload_dir: String,
    tx: mpsc::Sender<UploadMeta>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind upload server");
            return;
        }
    };
    tracing::info!(%addr, "upload server listening");

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = cancel_rx.changed() => break,
        };

        let upload_dir = upload_dir.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer.ip().to_string(), &upload_dir, &tx).await {
                tracing::debug!(peer = %peer, error = %e, "upload connection ended with an error");
            }
        });
    }

    tracing::debug!("upload server cancelled");
}

async fn handle_connection(
    mut stream: TcpStream,
    remote_ip: String,
    upload_dir: &str,
    tx: &mpsc::Sender<UploadMeta>,
) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return respond(&mut stream, 400, "Bad Request").await;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_terminator(&buf) {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return respond(&mut stream, 400, "Bad Request").await;
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    if method != "PUT" && method != "POST" {
        return respond(&mut stream, 405, "Method Not Allowed").await;
    }

    let filename = match sanitize_filename(&path) {
        Some(f) => f,
        None => return respond(&mut stream, 400, "Bad Request").await,
    };

    let content_length: usize = lines
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let body_start = header_end + 4;
    let mut body = buf.split_off(body_start.min(buf.len()));
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    let target = Path::new(upload_dir).join(&filename);
    if let Err(source) = tokio::fs::write(&target, &body).await {
        let err = crate::errors::EngineError::UploadIo { filename: filename.clone(), source };
        tracing::error!(error = %err, "failed to write uploaded file");
        return respond(&mut stream, 500, "Internal Server Error").await;
    }

    let meta = UploadMeta {
        remote_ip,
        filename: filename.clone(),
        path: target,
        file_size: body.len() as u64,
        received_timestamp: chrono::Utc::now().naive_utc(),
    };
    if tx.send(meta).await.is_err() {
        tracing::warn!(filename, "upload queue closed, result will not be enriched");
    }

    let body = format!("File {filename} uploaded successfully ({} bytes)\n", content_length);
    respond_with_body(&mut stream, 201, "Created", &body).await
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Percent-decodes `path`, then takes its basename with `..`, `/`, and `\`
/// stripped, so a crafted or encoded path can never escape `upload_dir`.
fn sanitize_filename(path: &str) -> Option<String> {
    let decoded = percent_decode(path);
    let base = decoded.rsplit(['/', '\\']).next().unwrap_or(&decoded);
    let cleaned = base.replace("..", "");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Minimal `%XX` URL-decoding; invalid or truncated escapes pass through
/// literally rather than being rejected.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

async fn respond(stream: &mut TcpStream, code: u16, reason: &str) -> std::io::Result<()> {
    let body = format!("{code} {reason}\n");
    respond_with_body(stream, code, reason, &body).await
}

async fn respond_with_body(
    stream: &mut TcpStream,
    code: u16,
    reason: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {code} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_path_traversal_attempts() {
        assert_eq!(sanitize_filename("/../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("/capture.pcap").as_deref(), Some("capture.pcap"));
        assert_eq!(sanitize_filename("/sub/dir/cap.pcap").as_deref(), Some("cap.pcap"));
        assert_eq!(sanitize_filename("/..//a/../b").as_deref(), Some("b"));
    }

    #[test]
    fn decodes_percent_escapes_before_sanitizing() {
        assert_eq!(sanitize_filename("/cap%20001.pcap").as_deref(), Some("cap 001.pcap"));
        assert_eq!(sanitize_filename("/a%2Fb%2Fcap.pcap").as_deref(), Some("cap.pcap"));
        assert_eq!(sanitize_filename("/%2e%2e/etc/passwd").as_deref(), Some("passwd"));
    }

    #[test]
    fn rejects_empty_filename() {
        assert_eq!(sanitize_filename("/"), None);
        assert_eq!(sanitize_filename("/.."), None);
    }

    #[test]
    fn finds_header_terminator_across_reads() {
        let buf = b"PUT /x.pcap HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
        assert_eq!(find_header_terminator(buf), Some(buf.len() - 4 - 3));
    }

    #[tokio::test]
    async fn put_round_trip_writes_file_and_replies_201() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel::<UploadMeta>(4);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let upload_dir = dir.path().to_str().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let _ = handle_connection(stream, peer.ip().to_string(), &upload_dir, &tx).await;
        });
        drop(cancel_rx);

        let body = vec![b'x'; 1024];
        let mut client = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "PUT /cap_001.pcap HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        client.write_all(request.as_bytes()).await.unwrap();
        client.write_all(&body).await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 201 Created"));
        assert!(response.contains("File cap_001.pcap uploaded successfully (1024 bytes)"));
        assert!(response.contains("Connection: close"));

        let meta = rx.recv().await.unwrap();
        assert_eq!(meta.filename, "cap_001.pcap");
        assert_eq!(meta.file_size, 1024);

        let saved = tokio::fs::read(dir.path().join("cap_001.pcap")).await.unwrap();
        assert_eq!(saved.len(), 1024);
    }
}
