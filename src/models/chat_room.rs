use serde::{Deserialize, Serialize};

/// Kind of chat-source room a `ChatRoom` was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    Unknown,
}

impl std::str::FromStr for ChatKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "private" => ChatKind::Private,
            "group" => ChatKind::Group,
            "supergroup" => ChatKind::Supergroup,
            "channel" => ChatKind::Channel,
            _ => ChatKind::Unknown,
        })
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Supergroup => "supergroup",
            ChatKind::Channel => "channel",
            ChatKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A durable chat-room identifier. Owns a sequence of `Message`s and
/// participates (many-to-many) with `CopySetup`s through a membership table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: i64,
    pub external_chat_id: String,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub handle: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_strings_fall_back() {
        let kind: ChatKind = "weird".parse().unwrap();
        assert_eq!(kind, ChatKind::Unknown);
    }

    #[test]
    fn round_trips_display_and_parse() {
        for kind in [
            ChatKind::Private,
            ChatKind::Group,
            ChatKind::Supergroup,
            ChatKind::Channel,
        ] {
            let s = kind.to_string();
            let parsed: ChatKind = s.parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
