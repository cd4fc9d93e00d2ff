use serde::{Deserialize, Serialize};

use courier_core::types::DestinationId;

/// Classification of a destination as reported by the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// A plain (legacy) group chat.
    Group,
    /// An upgraded group. When the platform migrates a group, the supergroup
    /// is the surviving half of the pair.
    Supergroup,
    /// Anything else — private chats, broadcast channels. The reconciler
    /// discards these; scheduled sends only target groups.
    Other,
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DestinationKind::Group => "group",
            DestinationKind::Supergroup => "supergroup",
            DestinationKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "group" => Ok(DestinationKind::Group),
            "supergroup" => Ok(DestinationKind::Supergroup),
            "other" => Ok(DestinationKind::Other),
            other => Err(format!("unknown destination kind: {other}")),
        }
    }
}

/// One entry of the remote platform's destination listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    /// Platform-native id. Stable for the lifetime of the destination, but a
    /// group→supergroup migration produces a *new* id for the same chat.
    pub id: DestinationId,
    /// Display name. Not unique — the reconciler uses it to detect the two
    /// halves of a migrated group.
    pub name: String,
    pub kind: DestinationKind,
    /// False when the identity is banned from posting here.
    pub can_send: bool,
}
