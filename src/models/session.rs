use serde::{Deserialize, Serialize};

/// Default session TTL in seconds (§4.4).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Per-client authenticated context keyed by a rotating `refresh_token` (§3, §4.4).
///
/// Indexed three ways in the queue store: by `refresh_token` (primary), by
/// `client_instance_id` (forward index), and by `copy_setup_id` (reverse index, a SET).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub refresh_token: String,
    pub client_instance_id: String,
    pub copy_setup_id: i64,
    pub client_ip: String,
    pub poll_interval: i32,
}
