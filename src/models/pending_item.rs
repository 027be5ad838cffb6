/// The two kinds of queued delivery a `PendingItem` can hold (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Trade,
    SignalReply,
}

impl PendingKind {
    pub fn as_key_segment(&self) -> &'static str {
        match self {
            PendingKind::Trade => "trades",
            PendingKind::SignalReply => "signal_replies",
        }
    }
}
