//! The `Capture` record: one uploaded pcap file plus its enrichment output.

use once_cell::sync::Lazy;
use regex::Regex;

/// One uploaded packet capture, enriched by the Upload Processor with
/// `capinfos` and RTP-stream-analyzer output.
#[derive(Debug, Clone)]
pub struct Capture {
    pub remote_ip: String,
    pub filename: String,
    pub file_size: u64,
    pub received_timestamp: chrono::NaiveDateTime,
    pub capinfos: String,
    pub rtpinfos: String,
    pub gw_number: String,
}

static RE_FIRST_PKT: Lazy<Regex> = Lazy::new(|| Regex::new(r"First packet time:\s+(.*?)\.").unwrap());
static RE_LAST_PKT: Lazy<Regex> = Lazy::new(|| Regex::new(r"Last packet time:\s+(.*?)\.").unwrap());

impl Capture {
    /// Parsed from `capinfos` output; empty string if absent or unparseable.
    pub fn first_packet_time(&self) -> String {
        RE_FIRST_PKT
            .captures(&self.capinfos)
            .map(|c| c[1].to_string())
            .unwrap_or_default()
    }

    pub fn last_packet_time(&self) -> String {
        RE_LAST_PKT
            .captures(&self.capinfos)
            .map(|c| c[1].to_string())
            .unwrap_or_default()
    }

    /// Number of RTP streams the analyzer reported: lines carrying an SSRC
    /// marker (`0x...`).
    pub fn rtp_streams(&self) -> usize {
        self.rtpinfos.lines().filter(|l| l.contains("0x")).count()
    }

    /// Number of RTP streams the analyzer flagged as problematic: lines
    /// ending in a trailing `X`.
    pub fn rtp_problems(&self) -> usize {
        self.rtpinfos
            .lines()
            .filter(|l| l.trim_end().ends_with('X'))
            .count()
    }
}
