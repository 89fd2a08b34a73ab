//! Enumerates candidate gateways by shelling out to `netstat -tan` and
//! matching established connections to the call-controller's known ports.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::process_runner::run_cmd;

/// Local port → protocol tag, matching the call controller's known ports.
const PORT_PROTOCOLS: &[(&str, &str)] = &[
    ("1039", "ptls"),
    ("2944", "tls"),
    ("2945", "unenc"),
    ("61440", "h323"),
    ("61441", "h323"),
    ("61442", "h323"),
    ("61443", "h323"),
    ("61444", "h323"),
];

/// A known development fallback candidate, used only when
/// `Config::discovery_fallback` is set and enumeration finds nothing.
pub const FALLBACK_CANDIDATE: &str = "10.10.48.58";

static RE_ESTABLISHED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^tcp\S*\s+\d+\s+\d+\s+\S+:(\d+)\s+([0-9.]+):(\d+)\s+ESTABLISHED").unwrap()
});

/// Runs `netstat -tan` and returns `remote_ip -> protocol` for every
/// established connection whose *local* port matches the known
/// call-controller port set.
///
/// Any failure to launch or parse `netstat` yields an empty map — the
/// caller (Discovery) treats an empty candidate set as "nothing found",
/// never as an error that aborts discovery.
pub async fn connected_gateways(timeout: Duration) -> HashMap<String, String> {
    let result = run_cmd("netstat", &["-tan"], timeout, Some("netstat")).await;
    if result.error_kind.is_some() {
        tracing::warn!(error_kind = ?result.error_kind, "netstat enumeration failed");
        return HashMap::new();
    }
    parse_established(&result.stdout)
}

fn parse_established(netstat_output: &str) -> HashMap<String, String> {
    let ports: HashMap<&str, &str> = PORT_PROTOCOLS.iter().copied().collect();
    let mut found = HashMap::new();

    for caps in RE_ESTABLISHED.captures_iter(netstat_output) {
        let local_port = &caps[1];
        let remote_ip = caps[2].to_string();
        if let Some(proto) = ports.get(local_port) {
            found.insert(remote_ip, proto.to_string());
        }
    }
    found
}

/// Intersects a candidate map with an optional filter set (the `--filter`
/// CLI flag); an empty/absent filter passes everything through.
pub fn apply_filter(
    candidates: HashMap<String, String>,
    filter: &[String],
) -> HashMap<String, String> {
    if filter.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|(ip, _)| filter.iter().any(|f| f == ip))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NETSTAT: &str = "\
Active Internet connections (w/o servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 10.1.1.5:1039           10.0.0.1:54321          ESTABLISHED
tcp        0      0 10.1.1.5:2944           10.0.0.2:54322          ESTABLISHED
tcp        0      0 10.1.1.5:22             10.0.0.9:54323          ESTABLISHED
tcp6       0      0 10.1.1.5:61440          10.0.0.3:54324          ESTABLISHED
";

    #[test]
    fn parses_established_connections_on_known_ports() {
        let found = parse_established(SAMPLE_NETSTAT);
        assert_eq!(found.get("10.0.0.1").map(String::as_str), Some("ptls"));
        assert_eq!(found.get("10.0.0.2").map(String::as_str), Some("tls"));
        assert_eq!(found.get("10.0.0.3").map(String::as_str), Some("h323"));
        assert!(!found.contains_key("10.0.0.9"));
    }

    #[test]
    fn filter_intersects_candidate_set() {
        let mut candidates = HashMap::new();
        candidates.insert("10.0.0.1".to_string(), "ptls".to_string());
        candidates.insert("10.0.0.2".to_string(), "tls".to_string());

        let filtered = apply_filter(candidates, &["10.0.0.1".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("10.0.0.1"));
    }

    #[test]
    fn empty_filter_passes_everything() {
        let mut candidates = HashMap::new();
        candidates.insert("10.0.0.1".to_string(), "ptls".to_string());
        let filtered = apply_filter(candidates, &[]);
        assert_eq!(filtered.len(), 1);
    }
}
