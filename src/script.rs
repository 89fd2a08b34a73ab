//! Renders the opaque `expect` dialog for one gateway from a static
//! template plus credentials, watermarks, and the selected command list.
//!
//! Never touches the network; its only side effect is dequeuing at most one
//! ad-hoc command batch from the gateway.

use crate::config::{Config, DISCOVERY_COMMANDS, QUERY_COMMANDS};
use crate::gateway::Bgw;

/// The compiled-in template for the interactive-CLI dialog. Its exact
/// login/prompt handshake is an external collaborator; this crate only
/// owns placeholder substitution.
pub const TEMPLATE: &str = include_str!("../templates/gateway_poll.exp.tmpl");

/// Template placeholders, substituted `{name}`-style.
const PLACEHOLDERS: &[&str] = &[
    "{lan_ip}",
    "{user}",
    "{passwd}",
    "{prev_last_session_id}",
    "{prev_active_session_ids}",
    "{rtp_stats}",
    "{commands}",
    "{debug}",
];

/// Builds the `expect -c <script>` payload for one poll cycle against `bgw`.
///
/// Command-list selection: discovery commands on a never-seen gateway, else
/// query commands with any queued ad-hoc batch prepended in FIFO order.
pub fn build_script(bgw: &mut Bgw, template: &str, config: &Config) -> String {
    let is_discovery = bgw.is_new();

    let rtp_stats = if is_discovery { 0 } else { 1 };
    let prev_last_session_id = if is_discovery {
        String::new()
    } else {
        bgw.last_session_id.clone().unwrap_or_default()
    };
    let mut prev_active_session_ids: Vec<String> = if is_discovery {
        Vec::new()
    } else {
        bgw.active_session_ids.iter().cloned().collect()
    };
    prev_active_session_ids.sort();

    let mut commands: Vec<String> = if is_discovery {
        DISCOVERY_COMMANDS.iter().map(|s| s.to_string()).collect()
    } else {
        QUERY_COMMANDS.iter().map(|s| s.to_string()).collect()
    };

    if !is_discovery {
        if let Some(queued) = bgw.dequeue_commands() {
            tracing::info!(lan_ip = %bgw.lan_ip, ?queued, "prepending queued ad-hoc commands");
            let mut merged = queued;
            merged.extend(commands);
            commands = merged;
        }
    }

    let debug = if tracing::enabled!(tracing::Level::DEBUG) { 1 } else { 0 };

    let quoted_active_ids = prev_active_session_ids
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(" ");
    let quoted_commands = commands
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(" ");

    let mut script = template.to_string();
    script = script.replace("{lan_ip}", &bgw.lan_ip);
    script = script.replace("{user}", &config.bgw_user);
    script = script.replace("{passwd}", &config.bgw_passwd);
    script = script.replace("{prev_last_session_id}", &format!("\"{prev_last_session_id}\""));
    script = script.replace("{prev_active_session_ids}", &format!("{{{quoted_active_ids}}}"));
    script = script.replace("{rtp_stats}", &rtp_stats.to_string());
    script = script.replace("{commands}", &format!("{{{quoted_commands}}}"));
    script = script.replace("{debug}", &debug.to_string());
    script
}

/// Used only by tests/logging to confirm every placeholder the template
/// relies on is recognized by this builder.
pub fn known_placeholders() -> &'static [&'static str] {
    PLACEHOLDERS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const TEMPLATE: &str = "spawn ssh {user}@{lan_ip}\nset passwd {passwd}\nset prev_id {prev_last_session_id}\nset prev_active {prev_active_session_ids}\nset rtp_stats {rtp_stats}\nset commands {commands}\nset debug {debug}\n";

    fn test_config() -> Config {
        Config {
            bgw_user: "root".to_string(),
            bgw_passwd: "secret".to_string(),
            max_polling: 20,
            timeout: std::time::Duration::from_secs(20),
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

    #[test]
    fn discovery_uses_discovery_commands_and_zero_rtp_stats() {
        let mut bgw = Bgw::new("10.0.0.1", "ptls", 10);
        let script = build_script(&mut bgw, TEMPLATE, &test_config());
        assert!(script.contains("set rtp_stats 0"));
        assert!(script.contains(DISCOVERY_COMMANDS[0]));
        assert!(script.contains("set prev_id \"\""));
    }

    #[test]
    fn polling_prepends_queued_commands_before_query_commands() {
        let mut bgw = Bgw::new("10.0.0.1", "ptls", 10);
        bgw.update(&crate::gateway::UpdatePayload {
            last_seen: Some("2025-01-01,00:00:00".to_string()),
            ..Default::default()
        });
        bgw.enqueue_commands(vec!["clear capture-buffer".to_string(), "capture start".to_string()]);

        let script = build_script(&mut bgw, TEMPLATE, &test_config());
        assert!(script.contains("set rtp_stats 1"));
        let clear_idx = script.find("clear capture-buffer").unwrap();
        let query_idx = script.find(QUERY_COMMANDS[0]).unwrap();
        assert!(clear_idx < query_idx, "ad-hoc commands must precede the query cycle's built-ins");
    }

    #[test]
    fn polling_carries_forward_watermark_and_active_sessions() {
        let mut bgw = Bgw::new("10.0.0.1", "ptls", 10);
        bgw.update(&crate::gateway::UpdatePayload {
            last_seen: Some("2025-01-01,00:00:00".to_string()),
            last_session_id: Some("00042".to_string()),
            ..Default::default()
        });
        bgw.active_session_ids.insert("00001".to_string());
        bgw.active_session_ids.insert("00002".to_string());

        let script = build_script(&mut bgw, TEMPLATE, &test_config());
        assert!(script.contains("set prev_id \"00042\""));
        assert!(script.contains("\"00001\" \"00002\""));
    }

    #[test]
    fn build_script_does_not_touch_network_only_dequeues_once() {
        let mut bgw = Bgw::new("10.0.0.1", "ptls", 10);
        bgw.update(&crate::gateway::UpdatePayload {
            last_seen: Some("2025-01-01,00:00:00".to_string()),
            ..Default::default()
        });
        bgw.enqueue_commands(vec!["a".to_string()]);
        bgw.enqueue_commands(vec!["b".to_string()]);

        let _ = build_script(&mut bgw, TEMPLATE, &test_config());
        assert!(bgw.has_pending_commands(), "only one batch dequeued per build");
    }
}
