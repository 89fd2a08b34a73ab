//! One-shot discovery: queries every candidate exactly once, in parallel,
//! and folds each success straight into `GWs`/`BGWs` as it completes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::message::PollResultJson;
use super::{DiscoveryProgress, Engine};
use crate::errors::EngineError;
use crate::gateway::{Bgw, UpdatePayload};
use crate::process_runner::run_cmd;
use crate::script::{build_script, TEMPLATE};

/// Runs one query cycle against every `(ip, proto)` candidate, reporting
/// `(ok, err, total)` progress after each completion via `progress`.
/// Successes are folded in as discovered; failures are counted only, never
/// retried within this call.
pub async fn run(
    engine: &Arc<Engine>,
    candidates: HashMap<String, String>,
    progress: impl Fn(DiscoveryProgress) + Send + Sync + 'static,
) {
    let total = candidates.len();
    if total == 0 {
        progress((0, 0, 0));
        return;
    }

    let mut set = JoinSet::new();
    for (lan_ip, proto) in candidates {
        let engine = Arc::clone(engine);
        set.spawn(async move { query_one(&engine, lan_ip, proto).await });
    }

    let mut ok = 0usize;
    let mut err = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(true) => ok += 1,
            Ok(false) => err += 1,
            Err(e) => {
                tracing::error!(error = %e, "discovery task panicked");
                err += 1;
            }
        }
        progress((ok, err, total));
    }
}

/// Queries one candidate and, on success, applies the result directly
/// (discovery never goes through the fan-in channel since there is no
/// long-lived poller behind it yet). Returns whether the candidate yielded
/// a usable result.
async fn query_one(engine: &Arc<Engine>, lan_ip: String, proto: String) -> bool {
    let mut bgw = Bgw::new(lan_ip.clone(), proto, engine.config.polling_secs);
    let script = build_script(&mut bgw, TEMPLATE, &engine.config);

    let result = run_cmd("expect", &["-c", &script], engine.config.timeout, Some(&lan_ip)).await;
    if result.error_kind.is_some() {
        tracing::debug!(lan_ip, error_kind = ?result.error_kind, "discovery query failed");
        return false;
    }

    let parsed: PollResultJson = match serde_json::from_str(&result.stdout) {
        Ok(v) => v,
        Err(source) => {
            let err = EngineError::MalformedResult { label: lan_ip.clone(), source };
            tracing::debug!(error = %err, "discovery result was not valid JSON");
            return false;
        }
    };

    let gw_number = match parsed.gw_number.clone().filter(|s| !s.is_empty()) {
        Some(n) => n,
        None => {
            tracing::debug!(lan_ip, "discovery result carried no gateway number");
            return false;
        }
    };

    bgw.gw_number = gw_number.clone();
    bgw.update(&UpdatePayload {
        gw_name: parsed.gw_name,
        gw_number: Some(gw_number.clone()),
        last_session_id: parsed.last_session_id,
        last_seen: parsed.last_seen,
        commands: parsed.commands.into_iter().collect(),
    });

    engine.stores.gws.write().put(lan_ip, gw_number.clone());
    engine.stores.bgws.write().put(gw_number, bgw);

    true
}
