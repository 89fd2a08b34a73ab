//! Wire shape of a poll result's decoded JSON and the message a poller
//! pushes onto the fan-in channel.

use std::collections::HashMap;

use serde::Deserialize;

use crate::process_runner::CommandResult;

/// One poller's raw output, fanned in to the Result Processor. Carries the
/// gateway's own identity only as a hint (`known_gw_number`, set by
/// Discovery for its caller-supplied BGW); polling-mode messages are
/// resolved purely from the decoded JSON body, since all gateways share one
/// channel and one Result Processor.
#[derive(Debug)]
pub struct PollMessage {
    pub result: CommandResult,
    pub known_gw_number: Option<String>,
}

/// The required-core-plus-arbitrary-extra shape of a poll result's JSON
/// body. Unknown top-level keys are ignored by `serde` (no
/// `deny_unknown_fields`) since the payload shape is dynamic and extra
/// fields may be added by a given gateway's command set.
#[derive(Debug, Deserialize, Default)]
pub struct PollResultJson {
    pub gw_number: Option<String>,
    pub lan_ip: Option<String>,
    pub gw_name: Option<String>,
    pub last_session_id: Option<String>,
    pub last_seen: Option<String>,
    #[serde(default)]
    pub commands: HashMap<String, String>,
    #[serde(default)]
    pub rtp_sessions: HashMap<String, String>,
}
