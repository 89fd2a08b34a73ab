//! Owns the four shared stores and drives the engine's lifecycle:
//! discovery, steady-state polling, and clean shutdown of both.

pub mod discovery_driver;
pub mod message;
pub mod poller;
pub mod result_processor;
pub mod upload_processor;
pub mod upload_server;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

use crate::capture::Capture;
use crate::config::Config;
use crate::gateway::Bgw;
use crate::parsers::rtp::RtpDetails;
use crate::store::OrderedStore;

use message::PollMessage;

/// `lan_ip -> gw_number` reverse index; unbounded.
pub type GwIndex = OrderedStore<String, String>;
/// `gw_number -> Bgw`; unbounded.
pub type BgwStore = OrderedStore<String, Bgw>;
/// `global_id -> RtpDetails`; bounded at `Config::storage_maxlen`.
pub type RtpStore = OrderedStore<String, RtpDetails>;
/// `filename -> Capture`; unbounded.
pub type CaptureStore = OrderedStore<String, Capture>;

/// The four shared stores, each behind its own short-lived read/write lock.
/// `parking_lot::RwLock` fits here because no store access ever spans an
/// `.await`.
#[derive(Debug, Default)]
pub struct Stores {
    pub gws: RwLock<GwIndex>,
    pub bgws: RwLock<BgwStore>,
    pub rtps: RwLock<RtpStore>,
    pub pcaps: RwLock<CaptureStore>,
}

/// Progress tuple emitted during discovery: `(ok, err, total)`.
pub type DiscoveryProgress = (usize, usize, usize);

/// Owns configuration, shared state, and every background task this engine
/// spawns. Constructed once per process; `discovery_start`/`polling_start`/
/// `*_stop` are its only mutating entry points besides the stores
/// themselves.
pub struct Engine {
    pub config: Arc<Config>,
    pub stores: Arc<Stores>,
    polling_semaphore: Arc<Semaphore>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    poller_handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    result_processor_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    upload_server_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    upload_processor_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    polling_running: parking_lot::Mutex<bool>,
}

impl Engine {
    pub fn new(config: Config) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let max_polling = config.max_polling;
        Arc::new(Self {
            config: Arc::new(config),
            stores: Arc::new(Stores {
                gws: RwLock::new(GwIndex::unbounded()),
                bgws: RwLock::new(BgwStore::unbounded()),
                rtps: RwLock::new(RtpStore::new(None)),
                pcaps: RwLock::new(CaptureStore::unbounded()),
            }),
            polling_semaphore: Arc::new(Semaphore::new(max_polling)),
            cancel_tx,
            cancel_rx,
            poller_handles: parking_lot::Mutex::new(Vec::new()),
            result_processor_handle: parking_lot::Mutex::new(None),
            upload_server_handle: parking_lot::Mutex::new(None),
            upload_processor_handle: parking_lot::Mutex::new(None),
            polling_running: parking_lot::Mutex::new(false),
        })
    }

    fn new_cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    /// Initializes `RTPs`' retention bound from `Config::storage_maxlen`.
    /// Called once at startup after construction.
    pub fn apply_storage_maxlen(&self) {
        self.stores.rtps.write().set_maxlen(Some(self.config.storage_maxlen));
    }

    /// One-shot enumeration + poll of every reachable gateway, populating
    /// `GWs`/`BGWs`. Clears both stores first.
    /// `explicit_ips`, if non-empty, bypasses `netstat` enumeration
    /// entirely; `filter` (if non-empty) intersects whichever candidate set
    /// results.
    pub async fn discovery_start(
        self: &Arc<Self>,
        explicit_ips: &[String],
        filter: &[String],
        progress: impl Fn(DiscoveryProgress) + Send + Sync + 'static,
    ) {
        self.stores.gws.write().clear();
        self.stores.bgws.write().clear();

        let candidates: HashMap<String, String> = if !explicit_ips.is_empty() {
            explicit_ips.iter().map(|ip| (ip.clone(), "unknown".to_string())).collect()
        } else {
            let found = crate::discovery::connected_gateways(self.config.timeout).await;
            if found.is_empty() && self.config.discovery_fallback {
                tracing::warn!("netstat enumeration empty, using discovery_fallback candidate");
                let mut fallback = HashMap::new();
                fallback.insert(
                    crate::discovery::FALLBACK_CANDIDATE.to_string(),
                    "ptls".to_string(),
                );
                fallback
            } else {
                found
            }
        };
        let candidates = crate::discovery::apply_filter(candidates, filter);

        discovery_driver::run(self, candidates, progress).await;
    }

    /// Starts steady-state polling: one poller task per entry currently in
    /// `BGWs`, the Result Processor, and (if configured) the upload
    /// server + processor. Refuses if already running or `BGWs` is empty.
    pub async fn polling_start(self: &Arc<Self>) -> anyhow::Result<()> {
        {
            let mut running = self.polling_running.lock();
            if *running {
                anyhow::bail!("polling already running");
            }
            if self.stores.bgws.read().is_empty() {
                anyhow::bail!("no gateways discovered yet");
            }
            *running = true;
        }

        // Reset per-BGW watermarks so the first poll of this run is treated
        // as a discovery-shaped cycle (fresh cadence baseline).
        {
            let mut bgws = self.stores.bgws.write();
            let gw_numbers: Vec<String> = bgws.keys().cloned().collect();
            for gw_number in gw_numbers {
                if let Some(bgw) = bgws.get_mut(&gw_number) {
                    bgw.last_seen = None;
                }
            }
        }

        let (tx, rx) = mpsc::channel::<PollMessage>(1024);

        let gw_numbers: Vec<String> = self.stores.bgws.read().keys().cloned().collect();
        let mut handles = Vec::with_capacity(gw_numbers.len());
        for gw_number in gw_numbers {
            let handle = tokio::spawn(poller::run_poller(
                Arc::clone(self),
                gw_number,
                tx.clone(),
                self.new_cancel_receiver(),
            ));
            handles.push(handle);
        }
        *self.poller_handles.lock() = handles;

        let rp_handle = tokio::spawn(result_processor::run(
            Arc::clone(self),
            rx,
            self.new_cancel_receiver(),
        ));
        *self.result_processor_handle.lock() = Some(rp_handle);

        if let Some(host) = self.config.http_host {
            let (upload_tx, upload_rx) =
                mpsc::channel::<upload_server::UploadMeta>(256);
            let addr = std::net::SocketAddr::new(host, self.config.http_port);
            let server_handle = tokio::spawn(upload_server::run(
                addr,
                self.config.upload_dir.clone(),
                upload_tx,
                self.new_cancel_receiver(),
            ));
            *self.upload_server_handle.lock() = Some(server_handle);

            let processor_handle = tokio::spawn(upload_processor::run(
                Arc::clone(self),
                upload_rx,
                self.config.timeout,
                self.new_cancel_receiver(),
            ));
            *self.upload_processor_handle.lock() = Some(processor_handle);
        }

        Ok(())
    }

    /// Cancels every running task and waits for them to finish. Idempotent.
    pub async fn polling_stop(self: &Arc<Self>) {
        {
            let mut running = self.polling_running.lock();
            if !*running {
                return;
            }
            *running = false;
        }

        let _ = self.cancel_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.poller_handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        if let Some(handle) = self.result_processor_handle.lock().take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.upload_server_handle.lock().take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.upload_processor_handle.lock().take() {
            let _ = handle.await;
        }

        // Reset the cancellation signal so a subsequent polling_start works.
        let _ = self.cancel_tx.send(false);
    }

    pub fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.polling_semaphore)
    }
}
