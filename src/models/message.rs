use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum/maximum accepted length for message text after normalization (§3, §8.10).
pub const MESSAGE_TEXT_MIN_LEN: usize = 4;
pub const MESSAGE_TEXT_MAX_LEN: usize = 2000;

/// A record for an observed chat utterance, keyed by `(chat_room_id, external_message_id)`.
///
/// Never hard-deleted: a `deleted` event is modeled by emitting a `SignalReply`, not by
/// removing this row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_room_id: i64,
    pub external_message_id: String,
    pub text: String,
    pub post_time: DateTime<Utc>,
    pub signal_id: Option<i64>,
    pub signal_reply_id: Option<i64>,
}

impl Message {
    pub fn is_signal_linked(&self) -> bool {
        self.signal_id.is_some()
    }
}

/// Checks the [4, 2000] length bound from §3/§8.10. Applied to already-normalized text.
pub fn is_acceptable_length(text: &str) -> bool {
    let len = text.chars().count();
    (MESSAGE_TEXT_MIN_LEN..=MESSAGE_TEXT_MAX_LEN).contains(&len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_short() {
        assert!(!is_acceptable_length("hi"));
        assert!(is_acceptable_length("hiya"));
    }

    #[test]
    fn rejects_too_long() {
        let text = "a".repeat(2001);
        assert!(!is_acceptable_length(&text));
        let text = "a".repeat(2000);
        assert!(is_acceptable_length(&text));
    }
}
