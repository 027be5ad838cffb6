use serde::{Deserialize, Serialize};

/// An operational command against a prior `Signal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplyAction {
    Close,
    Breakeven,
    ModifySl,
}

impl ReplyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyAction::Close => "CLOSE",
            ReplyAction::Breakeven => "BREAKEVEN",
            ReplyAction::ModifySl => "MODIFY_SL",
        }
    }
}

impl std::str::FromStr for ReplyAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLOSE" => Ok(ReplyAction::Close),
            "BREAKEVEN" => Ok(ReplyAction::Breakeven),
            "MODIFY_SL" => Ok(ReplyAction::ModifySl),
            _ => Err(()),
        }
    }
}

/// What produced a `SignalReply`: a human's chat reply, an edit that changed a signal's
/// meaning, a deletion, or the model-assisted extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeneratedBy {
    Reply,
    Update,
    Delete,
    Ai,
}

impl GeneratedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratedBy::Reply => "REPLY",
            GeneratedBy::Update => "UPDATE",
            GeneratedBy::Delete => "DELETE",
            GeneratedBy::Ai => "AI",
        }
    }
}

impl std::str::FromStr for GeneratedBy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REPLY" => Ok(GeneratedBy::Reply),
            "UPDATE" => Ok(GeneratedBy::Update),
            "DELETE" => Ok(GeneratedBy::Delete),
            "AI" => Ok(GeneratedBy::Ai),
            _ => Err(()),
        }
    }
}

/// An action directed at a prior `Signal`, produced by the lifecycle processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReply {
    pub id: i64,
    pub action: ReplyAction,
    pub generated_by: GeneratedBy,
    pub info_message: Option<String>,
    pub original_signal_id: i64,
    /// Required iff `action == ModifySl`.
    pub new_sl: Option<f64>,
}

impl SignalReply {
    /// §3: `new_sl` is required iff `action == MODIFY_SL`.
    pub fn has_consistent_new_sl(&self) -> bool {
        match self.action {
            ReplyAction::ModifySl => self.new_sl.is_some(),
            _ => self.new_sl.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modify_sl_requires_new_sl() {
        let reply = SignalReply {
            id: 1,
            action: ReplyAction::ModifySl,
            generated_by: GeneratedBy::Ai,
            info_message: None,
            original_signal_id: 1,
            new_sl: None,
        };
        assert!(!reply.has_consistent_new_sl());
    }

    #[test]
    fn close_forbids_new_sl() {
        let reply = SignalReply {
            id: 1,
            action: ReplyAction::Close,
            generated_by: GeneratedBy::Delete,
            info_message: None,
            original_signal_id: 1,
            new_sl: None,
        };
        assert!(reply.has_consistent_new_sl());
    }
}
