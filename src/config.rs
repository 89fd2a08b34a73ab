use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Engine tunables loaded once at startup and shared read-only thereafter.
///
/// Every field has a sensible default; all of them are overridable via
/// environment variable (optionally sourced from a `.env` file). Nothing
/// in the engine re-reads the environment after [`Config::from_env`]
/// returns.
#[derive(Debug, Clone)]
pub struct Config {
    pub bgw_user: String,
    pub bgw_passwd: String,

    pub max_polling: usize,
    pub timeout: Duration,
    pub polling_secs: u64,

    pub storage_maxlen: usize,

    pub http_host: Option<IpAddr>,
    pub http_port: u16,
    pub upload_dir: String,

    pub nok_rtp_only: bool,

    /// Seed discovery with a single fixed development candidate when
    /// `netstat` enumeration finds nothing and no explicit IP input was
    /// given. Off by default.
    pub discovery_fallback: bool,

    pub log_filter: String,
}

/// Discovery and query command lists are fixed, not environment-configurable.
pub const DISCOVERY_COMMANDS: &[&str] = &[
    "show running-config",
    "show system",
    "show faults",
    "show capture",
    "show voip-dsp",
    "show temp",
    "show port",
    "show sla-monitor",
    "show utilization",
    "show announcements files",
    "show lldp config",
    "show mg list",
];

pub const QUERY_COMMANDS: &[&str] = &["show voip-dsp", "show capture"];

pub const CAPTURE_SETUP_COMMANDS: &[&str] =
    &["clear capture-buffer", "capture start"];

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            bgw_user: env::var("BGW_USER").unwrap_or_else(|_| "root".to_string()),
            bgw_passwd: env::var("BGW_PASSWD").unwrap_or_else(|_| String::new()),

            max_polling: env_parse("MAX_POLLING", 20),
            timeout: env_duration("TIMEOUT_SECS", Duration::from_secs(20)),
            polling_secs: env_parse("POLLING_SECS", 20),

            storage_maxlen: env_parse("STORAGE_MAXLEN", 999),

            http_host: env::var("HTTP_SERVER")
                .ok()
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse().ok())
                .or(Some("0.0.0.0".parse().unwrap())),
            http_port: env_parse("HTTP_PORT", 8080),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "/tmp".to_string()),

            nok_rtp_only: env_parse_bool("NOK_RTP_ONLY", false),
            discovery_fallback: env_parse_bool("DISCOVERY_FALLBACK", false),

            log_filter: env::var("LOG_FILTER").unwrap_or_else(|_| "bgwatch=info".to_string()),
        })
    }
}

/// Accepts either a bare integer (seconds, matching `TIMEOUT_SECS`'s name)
/// or a `humantime`-style duration (`"20s"`, `"1m"`) so an operator can be
/// explicit about units without the crate guessing.
fn env_duration(key: &str, default: Duration) -> Duration {
    let Some(raw) = env::var(key).ok() else {
        return default;
    };
    if let Ok(secs) = raw.parse::<u64>() {
        return Duration::from_secs(secs);
    }
    humantime::parse_duration(&raw).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        // SAFETY: test-local env mutation, no other test in this process reads these keys.
        for key in [
            "BGW_USER", "BGW_PASSWD", "MAX_POLLING", "TIMEOUT_SECS", "POLLING_SECS",
            "STORAGE_MAXLEN", "HTTP_SERVER", "HTTP_PORT", "UPLOAD_DIR", "NOK_RTP_ONLY",
            "DISCOVERY_FALLBACK", "LOG_FILTER",
        ] {
            env::remove_var(key);
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.max_polling, 20);
        assert_eq!(cfg.polling_secs, 20);
        assert_eq!(cfg.storage_maxlen, 999);
        assert_eq!(cfg.http_port, 8080);
        assert!(!cfg.nok_rtp_only);
        assert!(!cfg.discovery_fallback);
        assert_eq!(cfg.timeout, Duration::from_secs(20));
    }

    #[test]
    fn timeout_accepts_bare_seconds_or_humantime_string() {
        assert_eq!(env_duration("__BGWATCH_TEST_DOES_NOT_EXIST__", Duration::from_secs(7)), Duration::from_secs(7));

        env::set_var("__BGWATCH_TEST_TIMEOUT__", "45");
        assert_eq!(env_duration("__BGWATCH_TEST_TIMEOUT__", Duration::from_secs(1)), Duration::from_secs(45));

        env::set_var("__BGWATCH_TEST_TIMEOUT__", "2m");
        assert_eq!(env_duration("__BGWATCH_TEST_TIMEOUT__", Duration::from_secs(1)), Duration::from_secs(120));
        env::remove_var("__BGWATCH_TEST_TIMEOUT__");
    }
}
