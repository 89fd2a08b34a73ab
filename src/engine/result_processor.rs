//! Consumes poll results from the fan-in channel, decodes the JSON body,
//! and folds it into `GWs`/`BGWs`/`RTPs`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::message::{PollMessage, PollResultJson};
use super::Engine;
use crate::errors::EngineError;
use crate::gateway::UpdatePayload;
use crate::parsers::rtp;

/// Drains `rx` until the channel closes or cancellation fires. Every
/// message is handled independently; a malformed or unresolvable one is
/// logged and dropped, never propagated.
pub async fn run(engine: Arc<Engine>, mut rx: mpsc::Receiver<PollMessage>, mut cancel_rx: watch::Receiver<bool>) {
    loop {
        let message = tokio::select! {
            message = rx.recv() => match message {
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

        if message.result.error_kind.is_some() {
            tracing::debug!(
                label = ?message.result.label,
                error_kind = ?message.result.error_kind,
                "poll produced no result to process"
            );
            continue;
        }

        process_one(&engine, message);
    }
}

fn process_one(engine: &Arc<Engine>, message: PollMessage) {
    let label = message.result.label.clone().unwrap_or_default();

    let parsed: PollResultJson = match serde_json::from_str(&message.result.stdout) {
        Ok(v) => v,
        Err(source) => {
            let err = EngineError::MalformedResult { label: label.clone(), source };
            tracing::warn!(error = %err, "poll result was not valid JSON, dropping");
            return;
        }
    };

    let gw_number = match parsed
        .gw_number
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| message.known_gw_number.clone())
    {
        Some(n) => n,
        None => {
            tracing::warn!(label, "poll result carried no gateway identity, dropping");
            return;
        }
    };

    if let Some(lan_ip) = parsed.lan_ip.clone().filter(|s| !s.is_empty()) {
        let mut gws = engine.stores.gws.write();
        if !gws.contains(&lan_ip) {
            gws.put(lan_ip, gw_number.clone());
        }
    }

    let mut fresh_active_ids: Vec<String> = Vec::new();
    for (global_id, rtpstat) in &parsed.rtp_sessions {
        match rtp::parse_rtpstat(global_id, rtpstat) {
            Some(details) => {
                let is_active = details.is_active();
                let is_healthy = details.nok() == rtp::Nok::None;
                if is_active {
                    fresh_active_ids.push(global_id.clone());
                }
                // nok_rtp_only skips both active sessions (not yet terminated)
                // and healthy terminated ones; only unhealthy terminated
                // sessions are worth retaining under that policy.
                let skip = engine.config.nok_rtp_only && (is_active || is_healthy);
                if !skip {
                    engine.stores.rtps.write().put(global_id.clone(), details);
                } else {
                    tracing::debug!(global_id, "session discarded under nok_rtp_only");
                }
            }
            None => {
                tracing::debug!(global_id, "rtp session blob did not match the expected shape, dropping");
            }
        }
    }

    let mut bgws = engine.stores.bgws.write();
    let bgw = match bgws.get_mut(&gw_number) {
        Some(bgw) => bgw,
        None => {
            let err = EngineError::UnknownGateway { gw_number: gw_number.clone() };
            tracing::warn!(error = %err, "poll result referenced an unknown gateway, dropping");
            return;
        }
    };

    bgw.update(&UpdatePayload {
        gw_name: parsed.gw_name,
        gw_number: Some(gw_number),
        last_session_id: parsed.last_session_id,
        last_seen: parsed.last_seen,
        commands: parsed.commands.into_iter().collect(),
    });

    bgw.active_session_ids = fresh_active_ids.into_iter().collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::Bgw;
    use crate::process_runner::CommandResult;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            bgw_user: "root".to_string(),
            bgw_passwd: String::new(),
            max_polling: 20,
            timeout: Duration::from_secs(20),
            polling_secs: 20,
            storage_maxlen: 999,
            http_host: None,
            http_port: 8080,
            upload_dir: "/tmp".to_string(),
            nok_rtp_only: false,
            discovery_fallback: false,
            log_filter: "bgwatch=info".to_string(),
        }
    }

    fn message(stdout: &str) -> PollMessage {
        PollMessage {
            result: CommandResult {
                stdout: stdout.to_string(),
                stderr: String::new(),
                returncode: Some(0),
                error_kind: None,
                label: Some("10.0.0.1".to_string()),
            },
            known_gw_number: Some("001".to_string()),
        }
    }

    fn rtp_blob(status: &str, qos: &str, packets: u32) -> String {
        format!(
            "\r\nSession-ID: 1\r\nStatus: {status}, QOS: {qos}, EngineId: 1\r\nStart-Time: 2025-01-01,00:00:00, End-Time: -\r\nDuration: -\r\nCName: a\r\nPhone: \r\nLocal-Address: 1.1.1.1:1 SSRC 1\r\nRemote-Address: 2.2.2.2:2 SSRC 2 (0)\r\nSamples: 0 (5 sec)\r\nCodec:\r\nG711U 1B 1mS x, Silence-suppression(Tx/Rx) D/D, Play-Time 1sec, Loss 0% #0, Avg-Loss 0%, RTT 0mS #0, Avg-RTT 0mS, JBuf-under/overruns 0%/0%, Jbuf-Delay 0mS, Max-Jbuf-Delay 0mS\r\nReceived-RTP:\r\nPackets {packets}, Loss 0% #0, Avg-Loss 0%, RTT 0mS #0, Avg-RTT 0mS, Jitter 0mS #0, Avg-Jitter 0mS, TTL(last/min/max) 1/1/1, Duplicates 0, Seq-Fall 0, DSCP 0, L2Pri 0, RTCP 0, Flow-Label 0\r\nTransmitted-RTP:\r\nVLAN 0, DSCP 0, L2Pri 0, RTCP 0, Flow-Label 0\r\nRemote-Statistics:\r\nLoss 0% #0, Avg-Loss 0%, Jitter 0mS #0, Avg-Jitter 0mS\r\nEcho-Cancellation:\r\nLoss 0dB #0, Len 0mS\r\nRSVP:\r\nStatus Unused, Failures 0\r\n"
        )
    }

    fn engine_with_gateway(config: Config) -> Arc<Engine> {
        let engine = Engine::new(config);
        engine.stores.bgws.write().put("001".to_string(), Bgw::new("10.0.0.1", "ptls", 10));
        engine
    }

    #[test]
    fn malformed_json_is_dropped_without_panic() {
        let engine = engine_with_gateway(test_config());
        process_one(&engine, message("not json"));
        assert_eq!(engine.stores.bgws.read().get(&"001".to_string()).unwrap().polls, 0);
    }

    #[test]
    fn resolves_gateway_by_known_hint_and_populates_gws_index() {
        let engine = engine_with_gateway(test_config());
        let body = serde_json::json!({
            "lan_ip": "10.0.0.1",
            "last_seen": "2025-01-01,00:00:00",
            "commands": {"show system": "Model                  : G450\n"}
        });
        process_one(&engine, message(&body.to_string()));

        let bgw = engine.stores.bgws.read().get(&"001".to_string()).unwrap().clone();
        assert_eq!(bgw.polls, 1);
        assert_eq!(bgw.model, "G450");
        assert_eq!(engine.stores.gws.read().get(&"10.0.0.1".to_string()), Some(&"001".to_string()));
    }

    #[test]
    fn nok_rtp_only_retains_only_unhealthy_terminated_sessions() {
        let mut config = test_config();
        config.nok_rtp_only = true;
        let engine = engine_with_gateway(config);

        let active_ok_id = "2025-01-01,00:00:00,001,00001";
        let terminated_ok_id = "2025-01-01,00:00:01,001,00002";
        let terminated_zero_id = "2025-01-01,00:00:02,001,00003";

        let body = serde_json::json!({
            "gw_number": "001",
            "rtp_sessions": {
                active_ok_id: rtp_blob("Active", "Ok", 10),
                terminated_ok_id: rtp_blob("Terminated", "Ok", 10),
                terminated_zero_id: rtp_blob("Terminated", "Ok", 0),
            }
        });
        process_one(&engine, message(&body.to_string()));

        let rtps = engine.stores.rtps.read();
        assert_eq!(rtps.len(), 1);
        assert!(rtps.contains(&terminated_zero_id.to_string()));

        let bgw = engine.stores.bgws.read().get(&"001".to_string()).unwrap().clone();
        assert_eq!(bgw.active_session_ids.len(), 1);
        assert!(bgw.active_session_ids.contains(active_ok_id));
    }

    #[test]
    fn unknown_gateway_is_dropped() {
        let engine = Engine::new(test_config());
        let body = serde_json::json!({"gw_number": "999"});
        process_one(&engine, message(&body.to_string()));
        assert!(engine.stores.bgws.read().get(&"999".to_string()).is_none());
    }
}
