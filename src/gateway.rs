//! Per-gateway state: raw `show …` text, eagerly-derived scalars, the
//! capture-service state machine, the ad-hoc command queue, and rolling
//! poll statistics.
//!
//! Derived scalars are recomputed eagerly at ingestion: [`Bgw::update`] is
//! the single writer and recomputes every derived field from the raw text
//! it was just handed, so there is no stale cache to invalidate and no
//! interior mutability needed for readers.

use std::collections::{HashSet, VecDeque};

use chrono::NaiveDateTime;

use crate::parsers;

/// Timestamp format used throughout the wire protocol (`last_seen`,
/// RTP `Start-Time`/`End-Time`): `"%Y-%m-%d,%H:%M:%S"`.
pub const TIMESTAMP_FMT: &str = "%Y-%m-%d,%H:%M:%S";

/// Base (non-transitional) states the capture service can report itself in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBase {
    Unknown,
    Na,
    Disabled,
    Inactive,
    Running,
    Stopped,
    Starting,
    Stopping,
}

impl CaptureBase {
    fn from_str(s: &str) -> Self {
        let lower = s.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return CaptureBase::Unknown;
        }
        if lower == "na" {
            return CaptureBase::Na;
        }
        for (prefix, base) in [
            ("starting", CaptureBase::Starting),
            ("stopping", CaptureBase::Stopping),
            ("running", CaptureBase::Running),
            ("stopped", CaptureBase::Stopped),
            ("disabled", CaptureBase::Disabled),
            ("inactive", CaptureBase::Inactive),
        ] {
            if lower.starts_with(prefix) {
                return base;
            }
        }
        CaptureBase::Unknown
    }
}

/// Default raw `show …` attributes plus derived scalars, command queue, and
/// poll statistics for one gateway.
#[derive(Debug, Clone, Default)]
pub struct Bgw {
    pub lan_ip: String,
    pub proto: String,
    pub polling_secs: u64,

    pub gw_name: String,
    pub gw_number: String,

    pub polls: u64,
    pub avg_poll_secs: f64,
    pub last_seen: Option<NaiveDateTime>,
    /// Count of inter-arrival gaps folded into `avg_poll_secs` so far
    /// (`polls - 1` once at least one gap has been observed).
    gap_count: u64,

    pub last_session_id: Option<String>,
    pub active_session_ids: HashSet<String>,

    // Raw show-command text, keyed by the fixed attribute names below.
    pub show_announcements_files: String,
    pub show_capture: String,
    pub show_faults: String,
    pub show_lldp_config: String,
    pub show_mg_list: String,
    pub show_port: String,
    pub show_rtp_stat_summary: String,
    pub show_running_config: String,
    pub show_sla_monitor: String,
    pub show_system: String,
    pub show_temp: String,
    pub show_utilization: String,
    pub show_voip_dsp: String,

    // Eagerly-derived scalars, recomputed whenever the backing raw text changes.
    pub model: String,
    pub fw: String,
    pub hw: String,
    pub mainboard_hw: String,
    pub chassis_hw: String,
    pub serial: String,
    pub mac: String,
    pub location: String,
    pub uptime: String,
    pub memory: String,
    pub comp_flash: String,
    pub psu1: String,
    pub psu2: String,
    pub temp: String,
    pub cpu_util: String,
    pub ram_util: String,
    pub port_redu: String,
    pub port1: String,
    pub port1_status: String,
    pub port1_neg: String,
    pub port1_duplex: String,
    pub port1_speed: String,
    pub port2: String,
    pub port2_status: String,
    pub port2_neg: String,
    pub port2_duplex: String,
    pub port2_speed: String,
    pub snmp: String,
    pub snmp_trap: String,
    pub rtp_stat_service: String,
    pub slamon_service: String,
    pub sla_server: String,
    pub lldp: String,
    pub faults: String,
    pub announcements: String,
    pub inuse_dsp: String,
    pub active_session: String,
    pub total_session: String,
    pub mm_v: [String; 8],
    pub mm_v10: String,

    capture_base: CaptureBase,
    packet_capture_raw: String,
    capture_status_derived: String,

    /// One producer (UI), one consumer (poller); a batch is drained whole
    /// as a single cycle prefix.
    pending_commands: VecDeque<Vec<String>>,
}

impl Bgw {
    pub fn new(lan_ip: impl Into<String>, proto: impl Into<String>, polling_secs: u64) -> Self {
        Self {
            lan_ip: lan_ip.into(),
            proto: proto.into(),
            polling_secs,
            ..Default::default()
        }
    }

    /// Whether this gateway has ever completed a poll. Drives discovery vs.
    /// query command-list selection in the script builder.
    pub fn is_new(&self) -> bool {
        self.last_seen.is_none()
    }

    /// Enqueue one ad-hoc command batch (e.g. capture start/stop), to be
    /// prepended to the next cycle's built-in commands.
    pub fn enqueue_commands(&mut self, commands: Vec<String>) {
        self.pending_commands.push_back(commands);
    }

    /// Dequeue the oldest pending batch, if any. Called at most once per
    /// script build.
    pub fn dequeue_commands(&mut self) -> Option<Vec<String>> {
        self.pending_commands.pop_front()
    }

    pub fn has_pending_commands(&self) -> bool {
        !self.pending_commands.is_empty()
    }

    /// User-visible request to transition the capture service into a
    /// transitional state (`starting`/`stopping`), issued locally by the
    /// UI — never by a poll observation.
    pub fn request_capture_transition(&mut self, transitional: &str) {
        let base = CaptureBase::from_str(transitional);
        debug_assert!(matches!(base, CaptureBase::Starting | CaptureBase::Stopping));
        self.capture_base = base;
        self.packet_capture_raw = transitional.to_string();
    }

    /// Feed one freshly-observed capture status string through the state
    /// machine. Silently ignores illegal transitions; a `tracing::debug!`
    /// is emitted by the caller.
    fn observe_capture(&mut self, observed: &str) {
        let obs_base = CaptureBase::from_str(observed);

        if obs_base == CaptureBase::Na {
            self.capture_base = CaptureBase::Na;
            self.packet_capture_raw = "NA".to_string();
            self.capture_status_derived = "NA".to_string();
            return;
        }
        if matches!(obs_base, CaptureBase::Unknown) {
            return;
        }

        let accept = match self.capture_base {
            CaptureBase::Unknown | CaptureBase::Na => {
                matches!(obs_base, CaptureBase::Running | CaptureBase::Stopped | CaptureBase::Disabled | CaptureBase::Inactive)
            }
            CaptureBase::Starting => obs_base == CaptureBase::Running,
            CaptureBase::Stopping => obs_base == CaptureBase::Stopped,
            CaptureBase::Running => obs_base == CaptureBase::Stopped,
            CaptureBase::Stopped => obs_base == CaptureBase::Running,
            CaptureBase::Disabled | CaptureBase::Inactive => {
                matches!(obs_base, CaptureBase::Running | CaptureBase::Stopped | CaptureBase::Disabled | CaptureBase::Inactive)
            }
        };

        if accept {
            self.capture_base = obs_base;
            self.packet_capture_raw = observed.to_string();
            self.capture_status_derived = observed.to_string();
        } else {
            tracing::debug!(
                gw_number = %self.gw_number,
                from = ?self.capture_base,
                observed,
                "ignored illegal capture-state transition"
            );
        }
    }

    /// User-visible packet-capture value: the stored raw string while in a
    /// transitional base state, otherwise the freshly derived status.
    pub fn packet_capture(&self) -> &str {
        if matches!(self.capture_base, CaptureBase::Starting | CaptureBase::Stopping) {
            &self.packet_capture_raw
        } else {
            &self.capture_status_derived
        }
    }

    /// Applies a fully-decoded poll payload: identity fields, per-command
    /// raw text (invalidating/recomputing every derived scalar it touches),
    /// and the poll-cadence statistics. Idempotent for a given input.
    pub fn update(&mut self, payload: &UpdatePayload) {
        if let Some(name) = &payload.gw_name {
            if !name.is_empty() || self.gw_name.is_empty() {
                self.gw_name = name.clone();
            }
        }
        if let Some(number) = &payload.gw_number {
            if !number.is_empty() {
                self.gw_number = number.clone();
            }
        }
        if let Some(sid) = &payload.last_session_id {
            self.last_session_id = Some(sid.clone());
        }

        if let Some(last_seen_raw) = &payload.last_seen {
            if let Ok(last_seen) = NaiveDateTime::parse_from_str(last_seen_raw, TIMESTAMP_FMT) {
                match self.last_seen {
                    None => self.last_seen = Some(last_seen),
                    Some(prev) => {
                        let delta_secs = (last_seen - prev).num_milliseconds() as f64 / 1000.0;
                        self.gap_count += 1;
                        self.avg_poll_secs = round1(
                            self.avg_poll_secs
                                + (delta_secs - self.avg_poll_secs) / self.gap_count as f64,
                        );
                        self.last_seen = Some(last_seen);
                    }
                }
                self.polls += 1;
            }
        }

        for (cmd, text) in &payload.commands {
            self.apply_command(cmd, text);
        }
    }

    fn apply_command(&mut self, cmd: &str, text: &str) {
        match cmd {
            "show announcements files" => {
                self.show_announcements_files = text.to_string();
                self.announcements = parsers::announcements(text);
            }
            "show capture" => {
                self.show_capture = text.to_string();
                let derived = parsers::capture_status(text);
                self.observe_capture(&derived);
            }
            "show faults" => {
                self.show_faults = text.to_string();
                self.faults = parsers::faults(text);
            }
            "show lldp config" => {
                self.show_lldp_config = text.to_string();
                self.lldp = parsers::lldp(text);
            }
            "show mg list" => {
                self.show_mg_list = text.to_string();
                let groups = parsers::mg_groupdict(text);
                for slot in 1..=8u8 {
                    self.mm_v[(slot - 1) as usize] = parsers::mm_v(&groups, slot);
                }
                self.mm_v10 = parsers::mm_v10(&groups);
            }
            "show port" => {
                self.show_port = text.to_string();
                match parsers::port_info(text, 0) {
                    Some(p) => {
                        self.port1 = p.port;
                        self.port1_status = p.status;
                        self.port1_neg = p.neg;
                        self.port1_duplex = p.duplex;
                        self.port1_speed = p.speed;
                    }
                    None => {
                        self.port1 = "NA".to_string();
                        self.port1_status = "NA".to_string();
                        self.port1_neg = "NA".to_string();
                        self.port1_duplex = "NA".to_string();
                        self.port1_speed = "NA".to_string();
                    }
                }
                match parsers::port_info(text, 1) {
                    Some(p) => {
                        self.port2 = p.port;
                        self.port2_status = p.status;
                        self.port2_neg = p.neg;
                        self.port2_duplex = p.duplex;
                        self.port2_speed = p.speed;
                    }
                    None => {
                        self.port2 = "NA".to_string();
                        self.port2_status = "NA".to_string();
                        self.port2_neg = "NA".to_string();
                        self.port2_duplex = "NA".to_string();
                        self.port2_speed = "NA".to_string();
                    }
                }
            }
            "show rtp-stat summary" => {
                self.show_rtp_stat_summary = text.to_string();
                self.active_session = parsers::active_session(text);
                self.total_session = parsers::total_session(text);
            }
            "show running-config" => {
                self.show_running_config = text.to_string();
                self.port_redu = parsers::port_redu(text);
                self.snmp = parsers::snmp(text);
                self.snmp_trap = parsers::snmp_trap(text);
                self.rtp_stat_service = parsers::rtp_stat_service(text);
            }
            "show sla-monitor" => {
                self.show_sla_monitor = text.to_string();
                self.slamon_service = parsers::slamon_service(text);
                self.sla_server = parsers::sla_server(text);
            }
            "show system" => {
                self.show_system = text.to_string();
                self.model = parsers::model(text);
                self.fw = parsers::fw(text);
                self.hw = parsers::hw(text);
                self.mainboard_hw = parsers::mainboard_hw(text);
                self.chassis_hw = parsers::chassis_hw(text);
                self.serial = parsers::serial(text);
                self.mac = parsers::mac(text);
                self.location = parsers::location(text);
                self.uptime = parsers::uptime(text);
                self.memory = parsers::memory(text);
                self.comp_flash = parsers::comp_flash(text);
                self.psu1 = parsers::psu1(text);
                self.psu2 = parsers::psu2(text);
            }
            "show temp" => {
                self.show_temp = text.to_string();
                self.temp = parsers::temp(text);
            }
            "show utilization" => {
                self.show_utilization = text.to_string();
                self.cpu_util = parsers::cpu_util(text);
                self.ram_util = parsers::ram_util(text);
            }
            "show voip-dsp" => {
                self.show_voip_dsp = text.to_string();
                self.inuse_dsp = parsers::inuse_dsp(text);
            }
            "show upload status 10" => {
                if text.contains("executing") {
                    self.enqueue_commands(vec![cmd.to_string()]);
                }
            }
            other => {
                tracing::debug!(command = other, "unrecognized show command, discarded");
            }
        }
    }
}

/// The subset of a decoded poll-result JSON document consumed by
/// [`Bgw::update`]. `commands` carries the raw text for whichever
/// `show …` outputs this cycle happened to include.
#[derive(Debug, Clone, Default)]
pub struct UpdatePayload {
    pub gw_name: Option<String>,
    pub gw_number: Option<String>,
    pub last_session_id: Option<String>,
    pub last_seen: Option<String>,
    pub commands: Vec<(String, String)>,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
