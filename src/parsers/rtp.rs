//! Parses one `show rtp-stat detailed <n>` blob (as carried in the
//! `rtp_sessions` map of a poll result) into an [`RtpDetails`] record.
//!
//! The whole blob is matched against one giant `.*?(?P<field>...)` regex
//! with case-insensitive, dot-matches-newline semantics; the field order
//! below is exactly that pattern's capture order.

use once_cell::sync::Lazy;
use regex::Regex;

/// Health classification of one RTP session, derived from `qos` and
/// `rx_rtp_packets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nok {
    /// Healthy: QoS is `ok` and at least one RTP packet was received.
    None,
    /// Zero packets received on the receive side.
    Zero,
    /// QoS reported anything other than `ok`.
    Qos,
}

impl Nok {
    pub fn as_str(self) -> &'static str {
        match self {
            Nok::None => "None",
            Nok::Zero => "Zero",
            Nok::Qos => "QoS",
        }
    }
}

/// One observed RTP session, parsed from raw `show rtp-stat detailed` text.
///
/// `status` is compared only against the literal `"Terminated"` for
/// [`RtpDetails::is_active`]; other statuses (e.g. `Halted`) are not
/// special-cased.
#[derive(Debug, Clone)]
pub struct RtpDetails {
    pub global_id: String,
    pub gw_number: String,
    pub session_id: String,

    pub status: String,
    pub qos: String,
    pub engine_id: String,
    pub start_time: String,
    pub end_time: String,
    pub duration: String,
    pub cname: String,
    pub phone: String,

    pub local_addr: String,
    pub local_port: String,
    pub local_ssrc: String,
    pub remote_addr: String,
    pub remote_port: String,
    pub remote_ssrc: String,

    pub codec: String,
    pub codec_psize: String,
    pub codec_ptime: String,
    pub codec_enc: String,

    pub rx_rtp_packets: u64,
    pub rx_rtp_loss: String,
    pub rx_rtp_jitter: String,
    pub rx_rtp_rtt: String,
    pub rx_rtp_duplicates: String,
    pub rx_rtp_seqfall: String,
    pub rx_rtp_dscp: String,
    pub rx_rtp_l2pri: String,
    pub rx_rtp_rtcp: String,
    pub rx_rtp_flow_label: String,

    pub tx_rtp_vlan: String,
    pub tx_rtp_dscp: String,
    pub tx_rtp_l2pri: String,
    pub tx_rtp_rtcp: String,
    pub tx_rtp_flow_label: String,

    pub rem_loss: String,
    pub rem_jitter: String,

    pub ec_loss: String,
    pub ec_len: String,

    pub rsvp_status: String,
    pub rsvp_failures: String,
}

impl RtpDetails {
    /// `status != "Terminated"` — see the doc comment above on why no other
    /// value is treated as inactive.
    pub fn is_active(&self) -> bool {
        self.status != "Terminated"
    }

    pub fn nok(&self) -> Nok {
        if self.rx_rtp_packets == 0 {
            Nok::Zero
        } else if !self.qos.eq_ignore_ascii_case("ok") {
            Nok::Qos
        } else {
            Nok::None
        }
    }

    pub fn local_ssrc_hex(&self) -> String {
        to_hex(&self.local_ssrc)
    }

    pub fn remote_ssrc_hex(&self) -> String {
        to_hex(&self.remote_ssrc)
    }
}

fn to_hex(decimal: &str) -> String {
    match decimal.parse::<u64>() {
        Ok(v) => format!("0x{v:x}"),
        Err(_) => String::new(),
    }
}

static RE_DETAILED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xis)
        .*?Session-ID:\s*(?P<session_id>\d+)
        .*?Status:\s*(?P<status>\S+),
        .*?QOS:\s*(?P<qos>\S+),
        .*?EngineId:\s*(?P<engineid>\d+)
        .*?Start-Time:\s*(?P<start_time>\S+),
        .*?End-Time:\s*(?P<end_time>\S+)
        .*?Duration:\s*(?P<duration>\S+)
        .*?CName:\s*(?P<cname>\S+)
        .*?Phone:\s*(?P<phone>.*?)\s+
        .*?Local-Address:\s*(?P<local_addr>\S+):
        .*?(?P<local_port>\d+)
        .*?SSRC\s*(?P<local_ssrc>\d+)
        .*?Remote-Address:\s*(?P<remote_addr>\S+):
        .*?(?P<remote_port>\d+)
        .*?SSRC\s*(?P<remote_ssrc>\d+)
        .*?(?P<remote_ssrc_change>\S+)
        .*?Samples:\s*(?P<samples>\d+)
        .*?(?P<sampling_interval>\(.*?\))
        .*?Codec:\s+(?P<codec>\S+)
        .*?(?P<codec_psize>\S+)
        .*?(?P<codec_ptime>\S+)
        .*?(?P<codec_enc>\S+),
        .*?Silence-suppression\(Tx/Rx\)\s*(?P<codec_silence_suppr_tx>\S+)/
        .*?(?P<codec_silence_suppr_rx>\S+),
        .*?Play-Time\s*(?P<codec_play_time>\S+),
        .*?Loss\s*(?P<codec_loss>\S+)
        .*?\#(?P<codec_loss_events>\d+),
        .*?Avg-Loss\s*(?P<codec_avg_loss>\S+),
        .*?RTT\s*(?P<codec_rtt>\S+)
        .*?\#(?P<codec_rtt_events>\d+),
        .*?Avg-RTT\s*(?P<codec_avg_rtt>\S+),
        .*?JBuf-under/overruns\s*(?P<codec_jbuf_underruns>\S+)/
        .*?(?P<codec_jbuf_overruns>\S+),
        .*?Jbuf-Delay\s*(?P<codec_jbuf_delay>\S+),
        .*?Max-Jbuf-Delay\s*(?P<codec_max_jbuf_delay>\S+)
        .*?Packets\s*(?P<rx_rtp_packets>\d+),
        .*?Loss\s*(?P<rx_rtp_loss>\S+)
        .*?\#(?P<rx_rtp_loss_events>\d+),
        .*?Avg-Loss\s*(?P<rx_rtp_avg_loss>\S+),
        .*?RTT\s*(?P<rx_rtp_rtt>\S+)
        .*?\#(?P<rx_rtp_rtt_events>\d+),
        .*?Avg-RTT\s*(?P<rx_rtp_avg_rtt>\S+),
        .*?Jitter\s*(?P<rx_rtp_jitter>\S+)
        .*?\#(?P<rx_rtp_jitter_events>\d+),
        .*?Avg-Jitter\s*(?P<rx_rtp_avg_jitter>\S+),
        .*?TTL\(last/min/max\)\s*(?P<rx_rtp_ttl_last>\d+)/
        .*?(?P<rx_rtp_ttl_min>\d+)/
        .*?(?P<rx_rtp_ttl_max>\d+),
        .*?Duplicates\s*(?P<rx_rtp_duplicates>\d+),
        .*?Seq-Fall\s*(?P<rx_rtp_seqfall>\d+),
        .*?DSCP\s*(?P<rx_rtp_dscp>\d+),
        .*?L2Pri\s*(?P<rx_rtp_l2pri>\d+),
        .*?RTCP\s*(?P<rx_rtp_rtcp>\d+),
        .*?Flow-Label\s*(?P<rx_rtp_flow_label>\d+)
        .*?VLAN\s*(?P<tx_rtp_vlan>\d+),
        .*?DSCP\s*(?P<tx_rtp_dscp>\d+),
        .*?L2Pri\s*(?P<tx_rtp_l2pri>\d+),
        .*?RTCP\s*(?P<tx_rtp_rtcp>\d+),
        .*?Flow-Label\s*(?P<tx_rtp_flow_label>\d+)
        .*?Loss\s*(?P<rem_loss>\S+)
        .*\#(?P<rem_loss_events>\S+),
        .*?Avg-Loss\s*(?P<rem_avg_loss>\S+),
        .*?Jitter\s*(?P<rem_jitter>\S+)
        .*?\#(?P<rem_jitter_events>\S+),
        .*?Avg-Jitter\s*(?P<rem_avg_jitter>\S+)
        .*?Loss\s*(?P<ec_loss>\S+)
        .*?\#(?P<ec_loss_events>\S+),
        .*?Len\s*(?P<ec_len>\S+)
        .*?Status\s*(?P<rsvp_status>\S+),
        .*?Failures\s*(?P<rsvp_failures>\d+)
        ",
    )
    .expect("static regex")
});

/// `global_id` is `"<start-time>,<gateway-number>,<session-id>"`; the
/// gateway number is taken from the id itself, not from a field inside
/// `rtpstat`. Returns `None` on a malformed id or a blob that
/// doesn't match the expected shape — callers log and drop, per the "parser
/// mismatch" error policy.
pub fn parse_rtpstat(global_id: &str, rtpstat: &str) -> Option<RtpDetails> {
    let mut parts = global_id.splitn(3, ',');
    let _start_time = parts.next()?;
    let gw_number = parts.next()?.to_string();
    let session_id_from_id = parts.next()?.to_string();

    let caps = RE_DETAILED.captures(rtpstat)?;
    let get = |name: &str| caps.name(name).map(|m| m.as_str().to_string()).unwrap_or_default();

    let session_id = get("session_id");
    let rx_rtp_packets = get("rx_rtp_packets").parse().unwrap_or(0);

    Some(RtpDetails {
        global_id: global_id.to_string(),
        gw_number,
        session_id: if session_id.is_empty() { session_id_from_id } else { session_id },
        status: get("status"),
        qos: get("qos"),
        engine_id: get("engineid"),
        start_time: get("start_time"),
        end_time: get("end_time"),
        duration: get("duration"),
        cname: get("cname"),
        phone: get("phone"),
        local_addr: get("local_addr"),
        local_port: get("local_port"),
        local_ssrc: get("local_ssrc"),
        remote_addr: get("remote_addr"),
        remote_port: get("remote_port"),
        remote_ssrc: get("remote_ssrc"),
        codec: get("codec"),
        codec_psize: get("codec_psize"),
        codec_ptime: get("codec_ptime"),
        codec_enc: get("codec_enc"),
        rx_rtp_packets,
        rx_rtp_loss: get("rx_rtp_loss"),
        rx_rtp_jitter: get("rx_rtp_jitter"),
        rx_rtp_rtt: get("rx_rtp_rtt"),
        rx_rtp_duplicates: get("rx_rtp_duplicates"),
        rx_rtp_seqfall: get("rx_rtp_seqfall"),
        rx_rtp_dscp: get("rx_rtp_dscp"),
        rx_rtp_l2pri: get("rx_rtp_l2pri"),
        rx_rtp_rtcp: get("rx_rtp_rtcp"),
        rx_rtp_flow_label: get("rx_rtp_flow_label"),
        tx_rtp_vlan: get("tx_rtp_vlan"),
        tx_rtp_dscp: get("tx_rtp_dscp"),
        tx_rtp_l2pri: get("tx_rtp_l2pri"),
        tx_rtp_rtcp: get("tx_rtp_rtcp"),
        tx_rtp_flow_label: get("tx_rtp_flow_label"),
        rem_loss: get("rem_loss"),
        rem_jitter: get("rem_jitter"),
        ec_loss: get("ec_loss"),
        ec_len: get("ec_len"),
        rsvp_status: get("rsvp_status"),
        rsvp_failures: get("rsvp_failures"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\r\nshow rtp-stat detailed 00001\r\n\r\nSession-ID: 1\r\nStatus: Terminated, QOS: Ok, EngineId: 10\r\nStart-Time: 2024-11-04,10:06:07, End-Time: 2024-11-04,10:07:07\r\nDuration: 00:00:00\r\nCName: gwp@10.10.48.58\r\nPhone: \r\nLocal-Address: 192.168.110.110:2052 SSRC 1653399062\r\nRemote-Address: 10.10.48.192:35000 SSRC 2704961869 (0)\r\nSamples: 0 (5 sec)\r\n\r\nCodec:\r\nG711U 200B 20mS srtpAesCm128HmacSha180, Silence-suppression(Tx/Rx) Disabled/Disabled, Play-Time 4.720sec, Loss 0.8% #0, Avg-Loss 0.8%, RTT 0mS #0, Avg-RTT 0mS, JBuf-under/overruns 0.0%/0.0%, Jbuf-Delay 22mS, Max-Jbuf-Delay 22mS\r\n\r\nReceived-RTP:\r\nPackets 1, Loss 0.3% #0, Avg-Loss 0.3%, RTT 0mS #0, Avg-RTT 0mS, Jitter 2mS #0, Avg-Jitter 2mS, TTL(last/min/max) 56/56/56, Duplicates 0, Seq-Fall 0, DSCP 0, L2Pri 0, RTCP 0, Flow-Label 2\r\n\r\nTransmitted-RTP:\r\nVLAN 0, DSCP 46, L2Pri 0, RTCP 10, Flow-Label 0\r\n\r\nRemote-Statistics:\r\nLoss 0.0% #0, Avg-Loss 0.0%, Jitter 0mS #0, Avg-Jitter 0mS\r\n\r\nEcho-Cancellation:\r\nLoss 0dB #2, Len 0mS\r\n\r\nRSVP:\r\nStatus Unused, Failures 0\n";

    #[test]
    fn parses_session_fields_and_global_id() {
        let d = parse_rtpstat("2024-11-04,10:06:07,001,00001", SAMPLE).unwrap();
        assert_eq!(d.gw_number, "001");
        assert_eq!(d.status, "Terminated");
        assert_eq!(d.qos, "Ok");
        assert_eq!(d.rx_rtp_packets, 1);
        assert_eq!(d.local_addr, "192.168.110.110");
        assert_eq!(d.remote_addr, "10.10.48.192");
        assert!(!d.is_active());
    }

    #[test]
    fn nok_classification() {
        let mut d = parse_rtpstat("t,001,00001", SAMPLE).unwrap();
        assert_eq!(d.nok(), Nok::None);
        d.rx_rtp_packets = 0;
        assert_eq!(d.nok(), Nok::Zero);
        d.rx_rtp_packets = 1;
        d.qos = "Faulted".to_string();
        assert_eq!(d.nok(), Nok::Qos);
    }

    #[test]
    fn ssrc_hex_rendering() {
        let d = parse_rtpstat("t,001,00001", SAMPLE).unwrap();
        assert_eq!(d.local_ssrc_hex(), "0x628cde16");
    }

    #[test]
    fn malformed_blob_returns_none() {
        assert!(parse_rtpstat("t,001,00001", "not an rtp blob at all").is_none());
    }

    #[test]
    fn malformed_global_id_returns_none() {
        assert!(parse_rtpstat("only-one-part", SAMPLE).is_none());
    }
}
