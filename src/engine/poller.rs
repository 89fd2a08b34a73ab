//! The long-lived per-gateway polling loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use super::message::PollMessage;
use super::Engine;
use crate::process_runner::run_cmd;
use crate::script::{build_script, TEMPLATE};

/// Runs until cancellation or the gateway disappears from `BGWs`. Each
/// iteration: acquire a concurrency permit, build the script, invoke the
/// external interpreter, release the permit, push the result, sleep the
/// remainder of the configured cadence.
pub async fn run_poller(
    engine: Arc<Engine>,
    gw_number: String,
    tx: mpsc::Sender<PollMessage>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut avg_sleep_secs = 0.0_f64;
    let mut cycles: u64 = 0;

    loop {
        if *cancel_rx.borrow() {
            break;
        }

        let permit = tokio::select! {
            permit = engine.semaphore().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = cancel_rx.changed() => break,
        };

        let t0 = Instant::now();

        let (script, lan_ip) = {
            let mut bgws = engine.stores.bgws.write();
            match bgws.get_mut(&gw_number) {
                Some(bgw) => (build_script(bgw, TEMPLATE, &engine.config), bgw.lan_ip.clone()),
                None => {
                    tracing::warn!(gw_number, "gateway no longer present, stopping poller");
                    drop(permit);
                    return;
                }
            }
        };

        let result = run_cmd("expect", &["-c", &script], engine.config.timeout, Some(&lan_ip)).await;
        drop(permit);

        if result.error_kind.as_deref() == Some("Timeout") {
            tracing::warn!(gw_number = %gw_number, "poll timed out, continuing cadence");
        }

        let send_result = tx
            .send(PollMessage {
                result,
                known_gw_number: Some(gw_number.clone()),
            })
            .await;
        if send_result.is_err() {
            tracing::debug!(gw_number = %gw_number, "result channel closed, stopping poller");
            break;
        }

        let elapsed = t0.elapsed();
        let configured = Duration::from_secs(engine.config.polling_secs);
        let sleep_for = configured.checked_sub(elapsed).unwrap_or(Duration::ZERO);

        cycles += 1;
        avg_sleep_secs += (sleep_for.as_secs_f64() - avg_sleep_secs) / cycles as f64;
        tracing::debug!(
            gw_number = %gw_number,
            elapsed_secs = elapsed.as_secs_f64(),
            sleep_secs = sleep_for.as_secs_f64(),
            avg_sleep_secs,
            "poll cycle complete"
        );

        if sleep_for.is_zero() {
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = cancel_rx.changed() => break,
        }
    }

    tracing::debug!(gw_number = %gw_number, "poller cancelled");
}
