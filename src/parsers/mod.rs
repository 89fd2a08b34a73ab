//! Pure functions from raw `show …` command text to derived scalars.
//!
//! Every function here returns the documented sentinel (`"?"`, `""`, or a
//! caller-supplied "NA") on a missing or unrecognized field rather than
//! raising — parsing never panics.

pub mod rtp;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

macro_rules! lazy_re {
    ($name:ident, $pat:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($pat).expect("static regex"));
    };
}

lazy_re!(RE_MODEL, r"Model\s+:\s+(\S+)");
lazy_re!(RE_FW, r"FW Vintage\s+:\s+(\S+)");
lazy_re!(RE_HW_VINTAGE, r"HW Vintage\s+:\s+(\S+)");
lazy_re!(RE_HW_SUFFIX, r"HW Suffix\s+:\s+(\S+)");
lazy_re!(RE_MAINBOARD_VINTAGE, r"Mainboard HW Vintage\s+:\s+(\S+)");
lazy_re!(RE_MAINBOARD_SUFFIX, r"Mainboard HW Suffix\s+:\s+(\S+)");
lazy_re!(RE_CHASSIS_VINTAGE, r"Chassis HW Vintage\s+:\s+(\S+)");
lazy_re!(RE_CHASSIS_SUFFIX, r"Chassis HW Suffix\s+:\s+(\S+)");
lazy_re!(RE_FLASH, r"Flash Memory\s+:\s+(.*)");
lazy_re!(RE_MEMORY, r"Memory #\d+\s+:\s+(\S+)");
lazy_re!(RE_DSP_SOCKETS, r"Media Socket .*?: M?P?(\d+) ");
lazy_re!(RE_SERIAL, r"Serial No\s+:\s+(\S+)");
lazy_re!(RE_MAC, r"LAN MAC Address\s+:\s+(\S+)");
lazy_re!(RE_LOCATION, r"System Location\s+:\s+(\S+)");
lazy_re!(RE_UPTIME, r"Uptime \(\S+\)\s+:\s+(\S+)");
lazy_re!(RE_PSU1, r"PSU #1\s+:\s+\S+ (\S+)");
lazy_re!(RE_PSU2, r"PSU #2\s+:\s+\S+ (\S+)");
lazy_re!(RE_TEMP, r"Temperature\s+:\s+(\S+) \((\S+)\)");
lazy_re!(RE_CPU_UTIL, r"10\s+(\d+)%\s+(\d+)%");
lazy_re!(RE_RAM_UTIL, r"10\s+\S+\s+\S+\s+(\d+)%");
lazy_re!(RE_PORT_REDU, r"port redundancy \d+/(\d+) \d+/(\d+)");
lazy_re!(RE_SNMP_TRAP, r"snmp-server bgw_ip \S+ traps");
lazy_re!(RE_SLA_ADMIN, r"SLA Monitor:\s+(\S+)");
lazy_re!(RE_SLA_SERVER, r"Registered Server IP Address:\s+(\S+)");
lazy_re!(RE_FAULT_LINE, r"\s+\+ (\S+)");
lazy_re!(RE_IN_USE_DSP, r"In Use\s+:\s+(\d+)");
lazy_re!(RE_ACTIVE_SESSION, r"nal\s+\S+\s+(\S+)");
lazy_re!(RE_TOTAL_SESSION, r"nal\s+\S+\s+\S+\s+(\S+)");
lazy_re!(RE_PORT_LINE, r".*Avaya Inc");
lazy_re!(
    RE_PORT_GROUP,
    r".*?(?P<port>\d+/\d+).*?(?P<name>.*?).*?(?P<status>connected|no link).*?(?P<vlan>\d+).*?(?P<level>\d+).*?(?P<neg>\S+).*?(?P<duplex>\S+).*?(?P<speed>\S+)"
);
lazy_re!(
    RE_MM_LINE,
    r".*?(?P<slot>\S+).*?(?P<mtype>\S+).*?(?P<code>\S+).*?(?P<suffix>\S+).*?(?P<hw_vint>\S+).*?(?P<fw_vint>\S+)"
);
lazy_re!(RE_CAPTURE_SERVICE_STATE, r" service is (\w+) and (\w+)");
lazy_re!(RE_CAPTURE_STATUS_WORD, r"Capture service is \w+ and (\w+)");
lazy_re!(RE_CAPTURE_OCCUPANCY, r"buffer occupancy: (\d+)\.");

/// Returns `"?"` on a missing field.
pub fn model(show_system: &str) -> String {
    first_group(&RE_MODEL, show_system).unwrap_or_else(|| "?".to_string())
}

pub fn fw(show_system: &str) -> String {
    first_group(&RE_FW, show_system).unwrap_or_else(|| "?".to_string())
}

pub fn hw(show_system: &str) -> String {
    let vintage = first_group(&RE_HW_VINTAGE, show_system).unwrap_or_else(|| "?".to_string());
    let suffix = first_group(&RE_HW_SUFFIX, show_system).unwrap_or_else(|| "?".to_string());
    format!("{vintage}{suffix}")
}

pub fn mainboard_hw(show_system: &str) -> String {
    let vintage =
        first_group(&RE_MAINBOARD_VINTAGE, show_system).unwrap_or_else(|| "?".to_string());
    let suffix =
        first_group(&RE_MAINBOARD_SUFFIX, show_system).unwrap_or_else(|| "?".to_string());
    format!("{vintage}{suffix}")
}

pub fn chassis_hw(show_system: &str) -> String {
    let vintage = first_group(&RE_CHASSIS_VINTAGE, show_system).unwrap_or_else(|| "?".to_string());
    let suffix = first_group(&RE_CHASSIS_SUFFIX, show_system).unwrap_or_else(|| "?".to_string());
    format!("{vintage}{suffix}")
}

pub fn comp_flash(show_system: &str) -> String {
    match first_group(&RE_FLASH, show_system) {
        Some(flash) if flash.contains("No") => String::new(),
        Some(flash) => flash.replace(' ', ""),
        None => String::new(),
    }
}

fn to_mbyte(value: &str) -> u64 {
    lazy_re!(RE_MEM_UNIT, r"(\d+)([MG]B)");
    let Some(caps) = RE_MEM_UNIT.captures(value) else {
        return 0;
    };
    let num: u64 = caps[1].parse().unwrap_or(0);
    match &caps[2] {
        "MB" => num,
        "GB" => 1024 * num,
        _ => 0,
    }
}

pub fn memory(show_system: &str) -> String {
    let total: u64 = RE_MEMORY
        .captures_iter(show_system)
        .map(|c| to_mbyte(&c[1]))
        .sum();
    format!("{total}MB")
}

pub fn dsp_count(show_system: &str) -> String {
    let total: i64 = RE_DSP_SOCKETS
        .captures_iter(show_system)
        .filter_map(|c| c[1].parse::<i64>().ok())
        .sum();
    if RE_DSP_SOCKETS.is_match(show_system) {
        total.to_string()
    } else {
        "?".to_string()
    }
}

pub fn serial(show_system: &str) -> String {
    first_group(&RE_SERIAL, show_system).unwrap_or_else(|| "?".to_string())
}

/// MAC address with colons stripped.
pub fn mac(show_system: &str) -> String {
    first_group(&RE_MAC, show_system)
        .map(|m| m.replace(':', ""))
        .unwrap_or_else(|| "?".to_string())
}

pub fn location(show_system: &str) -> String {
    first_group(&RE_LOCATION, show_system).unwrap_or_default()
}

/// `"1d02h03m04s"`-style rendering of the raw `Uptime (…)   : d,hh:mm` field.
pub fn uptime(show_system: &str) -> String {
    match first_group(&RE_UPTIME, show_system) {
        Some(raw) => {
            let once_comma = raw.replacen(',', "d", 1);
            let mut replaced_colons = 0;
            let rendered: String = once_comma
                .chars()
                .map(|c| {
                    if c == ':' && replaced_colons == 0 {
                        replaced_colons += 1;
                        'h'
                    } else if c == ':' {
                        'm'
                    } else {
                        c
                    }
                })
                .collect();
            format!("{rendered}s")
        }
        None => "?".to_string(),
    }
}

pub fn psu1(show_system: &str) -> String {
    first_group(&RE_PSU1, show_system).unwrap_or_default()
}

pub fn psu2(show_system: &str) -> String {
    first_group(&RE_PSU2, show_system).unwrap_or_default()
}

pub fn temp(show_temp: &str) -> String {
    match RE_TEMP.captures(show_temp) {
        Some(c) => format!("{}/{}", &c[1], &c[2]),
        None => "?/?".to_string(),
    }
}

pub fn cpu_util(show_utilization: &str) -> String {
    match RE_CPU_UTIL.captures(show_utilization) {
        Some(c) => format!("{}%/{}%", &c[1], &c[2]),
        None => "?/?".to_string(),
    }
}

pub fn ram_util(show_utilization: &str) -> String {
    match RE_RAM_UTIL.captures(show_utilization) {
        Some(c) => format!("{}%", &c[1]),
        None => String::new(),
    }
}

pub fn port_redu(show_running_config: &str) -> String {
    match RE_PORT_REDU.captures(show_running_config) {
        Some(c) => format!("{}/{}", &c[1], &c[2]),
        None => String::new(),
    }
}

pub fn snmp(show_running_config: &str) -> String {
    let mut versions = Vec::new();
    for line in show_running_config.lines().map(str::trim) {
        if line.starts_with("snmp-server community") {
            versions.push("2");
        }
        if line.starts_with("encrypted-snmp-server community") {
            versions.push("3");
        }
    }
    if versions.is_empty() {
        String::new()
    } else {
        format!("v{}", versions.join("&"))
    }
}

pub fn snmp_trap(show_running_config: &str) -> String {
    if RE_SNMP_TRAP.is_match(show_running_config) {
        "enabled".to_string()
    } else {
        "disabled".to_string()
    }
}

pub fn rtp_stat_service(show_running_config: &str) -> String {
    if show_running_config.contains("rtp-stat-service") {
        "enabled".to_string()
    } else {
        "disabled".to_string()
    }
}

pub fn slamon_service(show_sla_monitor: &str) -> String {
    first_group(&RE_SLA_ADMIN, show_sla_monitor)
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "?".to_string())
}

pub fn sla_server(show_sla_monitor: &str) -> String {
    first_group(&RE_SLA_SERVER, show_sla_monitor).unwrap_or_default()
}

pub fn lldp(show_lldp_config: &str) -> String {
    if show_lldp_config.contains("Application status: disable") {
        "disabled".to_string()
    } else {
        "enabled".to_string()
    }
}

pub fn faults(show_faults: &str) -> String {
    if show_faults.contains("No Fault Messages") {
        "0".to_string()
    } else {
        RE_FAULT_LINE.find_iter(show_faults).count().to_string()
    }
}

pub fn announcements(show_announcements_files: &str) -> String {
    show_announcements_files
        .matches("announcement file")
        .count()
        .to_string()
}

pub fn inuse_dsp(show_voip_dsp: &str) -> String {
    let total: i64 = RE_IN_USE_DSP
        .captures_iter(show_voip_dsp)
        .filter_map(|c| c[1].parse::<i64>().ok())
        .sum();
    total.to_string()
}

/// `{admin}/{running}` or `"disabled"` when the capture service is disabled.
pub fn capture_service(show_capture: &str) -> String {
    match RE_CAPTURE_SERVICE_STATE.captures(show_capture) {
        Some(c) if &c[1] == "disabled" => "disabled".to_string(),
        Some(c) => format!("{}/{}", &c[1], &c[2]),
        None => "?/?".to_string(),
    }
}

/// Base runtime status derived from `show capture`, before the
/// starting/stopping transitional overlay in [`crate::gateway`].
pub fn capture_status(show_capture: &str) -> String {
    if show_capture.is_empty() || show_capture.contains("try again") {
        return "NA".to_string();
    }

    let service = capture_service(show_capture);
    if service == "disabled" {
        return "inactive".to_string();
    }

    let word = RE_CAPTURE_STATUS_WORD
        .captures(show_capture)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let occupancy = RE_CAPTURE_OCCUPANCY
        .captures(show_capture)
        .map(|c| format!("({:>2}%)", &c[1]))
        .unwrap_or_default();

    if show_capture.contains("Actual capture stopped") || show_capture.contains("and inactive") {
        return join_status("stopped", &occupancy);
    }
    if show_capture.contains("enabled and active") {
        return join_status("running", &occupancy);
    }
    word
}

fn join_status(base: &str, occupancy: &str) -> String {
    if occupancy.is_empty() {
        base.to_string()
    } else {
        format!("{base} {occupancy}")
    }
}

pub fn active_session(show_rtp_stat_summary: &str) -> String {
    first_group(&RE_ACTIVE_SESSION, show_rtp_stat_summary).unwrap_or_else(|| "?/?".to_string())
}

pub fn total_session(show_rtp_stat_summary: &str) -> String {
    first_group(&RE_TOTAL_SESSION, show_rtp_stat_summary).unwrap_or_else(|| "?/?".to_string())
}

/// One parsed row of `show mg list`, keyed by slot (`"v1"`..`"v8"`, `"v10"`).
#[derive(Debug, Clone, Default)]
pub struct MediaModule {
    pub mtype: String,
    pub code: String,
    pub suffix: String,
    pub hw_vint: String,
}

pub fn mg_groupdict(show_mg_list: &str) -> HashMap<String, MediaModule> {
    let mut groups = HashMap::new();
    for line in show_mg_list.lines().map(str::trim) {
        if !line.starts_with('v') || line.contains("Not Installed") {
            continue;
        }
        let Some(caps) = RE_MM_LINE.captures(line) else {
            continue;
        };
        let slot = caps["slot"].to_string();
        groups.insert(
            slot,
            MediaModule {
                mtype: caps["mtype"].to_string(),
                code: caps["code"].to_string(),
                suffix: caps["suffix"].to_string(),
                hw_vint: caps["hw_vint"].to_string(),
            },
        );
    }
    groups
}

/// Media-module code+suffix for slots 1..8; empty string if the slot has no
/// recognized row in `show mg list`.
pub fn mm_v(groups: &HashMap<String, MediaModule>, slot: u8) -> String {
    let Some(m) = groups.get(&format!("v{slot}")) else {
        return String::new();
    };
    let code = if m.code == "ICC" { &m.mtype } else { &m.code };
    format!("{code}{}", m.suffix)
}

pub fn mm_v10(groups: &HashMap<String, MediaModule>) -> String {
    match groups.get("v10") {
        Some(m) => format!("{}{}", m.hw_vint, m.suffix),
        None => String::new(),
    }
}

/// Parsed fields of one `show port` line for port index `0` or `1`.
#[derive(Debug, Clone, Default)]
pub struct PortInfo {
    pub port: String,
    pub status: String,
    pub neg: String,
    pub duplex: String,
    pub speed: String,
}

/// `idx` is 0 for LAN port 1, 1 for LAN port 2.
pub fn port_info(show_port: &str, idx: usize) -> Option<PortInfo> {
    let lines: Vec<&str> = RE_PORT_LINE.find_iter(show_port).map(|m| m.as_str()).collect();
    let line = lines.get(idx)?;
    let caps = RE_PORT_GROUP.captures(line)?;
    Some(PortInfo {
        port: caps["port"].to_string(),
        status: caps["status"].to_string(),
        neg: caps["neg"].to_string(),
        duplex: caps["duplex"].to_string(),
        speed: caps["speed"].to_string(),
    })
}

fn first_group(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_SYSTEM: &str = "\
Model                  : G450
FW Vintage             : 38.30.0
HW Vintage             : 2
HW Suffix              : A
Mainboard HW Vintage   : 3
Mainboard HW Suffix    : B
Chassis HW Vintage     : 1
Chassis HW Suffix      : A
Serial No              : 11TG00123456
LAN MAC Address        : 00:1b:4f:12:34:56
System Location        : Lobby
Flash Memory           : 1GB
Memory #1              : 512MB
Memory #2              : 512MB
PSU #1                 : Installed OK
PSU #2                 : Not Installed
Uptime (d,hh:mm)       : 12,03:45
Media Socket 1         : MP80 channels
";

    #[test]
    fn parses_system_scalars() {
        assert_eq!(model(SHOW_SYSTEM), "G450");
        assert_eq!(fw(SHOW_SYSTEM), "38.30.0");
        assert_eq!(hw(SHOW_SYSTEM), "2A");
        assert_eq!(mainboard_hw(SHOW_SYSTEM), "3B");
        assert_eq!(chassis_hw(SHOW_SYSTEM), "1A");
        assert_eq!(serial(SHOW_SYSTEM), "11TG00123456");
        assert_eq!(mac(SHOW_SYSTEM), "001b4f123456");
        assert_eq!(location(SHOW_SYSTEM), "Lobby");
        assert_eq!(memory(SHOW_SYSTEM), "1024MB");
        assert_eq!(comp_flash(SHOW_SYSTEM), "1GB");
        assert_eq!(psu1(SHOW_SYSTEM), "OK");
        assert_eq!(psu2(SHOW_SYSTEM), "Installed");
        assert_eq!(uptime(SHOW_SYSTEM), "12d03h45s");
        assert_eq!(dsp_count(SHOW_SYSTEM), "80");
    }

    #[test]
    fn missing_field_returns_sentinel() {
        assert_eq!(model(""), "?");
        assert_eq!(fw(""), "?");
        assert_eq!(location(""), "");
    }

    #[test]
    fn capture_status_reads_admin_and_occupancy() {
        let disabled = "The capture service is disabled and inactive";
        assert_eq!(capture_status(disabled), "inactive");

        let running = "Capture service is enabled and active, buffer occupancy: 42.0%";
        assert_eq!(capture_status(running), "running (42%)");

        let stopped = "Capture service is enabled and inactive: Actual capture stopped";
        assert_eq!(capture_status(stopped), "stopped");

        assert_eq!(capture_status(""), "NA");
        assert_eq!(capture_status("please try again"), "NA");
    }

    #[test]
    fn faults_counts_plus_prefixed_lines() {
        let text = "  + FAULT-ONE\n  + FAULT-TWO\nsome other line";
        assert_eq!(faults(text), "2");
        assert_eq!(faults("No Fault Messages"), "0");
    }

    #[test]
    fn mg_groupdict_skips_not_installed_rows() {
        let text = "v1   MM  MM714  B   3   10\nv2   MM  Not Installed\n";
        let groups = mg_groupdict(text);
        assert_eq!(mm_v(&groups, 1), "MM714B");
        assert_eq!(mm_v(&groups, 2), "");
    }

    #[test]
    fn port_info_reads_the_nth_avaya_inc_line() {
        let text = "1/1   SFP      connected   1   0   auto   full   1000   Avaya Inc\n\
                     2/1   SFP      no link     1   0   auto   full   1000   Avaya Inc\n";
        let p1 = port_info(text, 0).unwrap();
        assert_eq!(p1.port, "1/1");
        assert_eq!(p1.status, "connected");
        assert_eq!(p1.speed, "1000");

        let p2 = port_info(text, 1).unwrap();
        assert_eq!(p2.port, "2/1");
        assert_eq!(p2.status, "no link");
    }

    #[test]
    fn port_info_is_none_past_the_last_line() {
        let text = "1/1   SFP      connected   1   0   auto   full   1000   Avaya Inc\n";
        assert!(port_info(text, 1).is_none());
    }
}
