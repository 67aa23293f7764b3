//! Chat event kinds and normalization.
//!
//! Application events arrive as a name plus loosely-populated argument
//! slots; [`normalize_event`] turns them into a uniform record the rest of
//! the engine consumes. Unrecognized names normalize to "no event" (a
//! record with no kind), which callers treat as "execute nothing".

use serde::{Deserialize, Serialize};

use crate::types::{Message, Room, User};

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The chat events outgoing integrations can subscribe to. Wire names keep
/// the historical camelCase form of the webhook contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    SendMessage,
    FileUploaded,
    RoomArchived,
    RoomCreated,
    RoomJoined,
    RoomLeft,
    UserCreated,
}

impl EventKind {
    /// Parse a wire-form event name. `None` for unrecognized names.
    pub fn parse(name: &str) -> Option<EventKind> {
        match name {
            "sendMessage" => Some(EventKind::SendMessage),
            "fileUploaded" => Some(EventKind::FileUploaded),
            "roomArchived" => Some(EventKind::RoomArchived),
            "roomCreated" => Some(EventKind::RoomCreated),
            "roomJoined" => Some(EventKind::RoomJoined),
            "roomLeft" => Some(EventKind::RoomLeft),
            "userCreated" => Some(EventKind::UserCreated),
            _ => None,
        }
    }

    /// Wire-form name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SendMessage => "sendMessage",
            EventKind::FileUploaded => "fileUploaded",
            EventKind::RoomArchived => "roomArchived",
            EventKind::RoomCreated => "roomCreated",
            EventKind::RoomJoined => "roomJoined",
            EventKind::RoomLeft => "roomLeft",
            EventKind::UserCreated => "userCreated",
        }
    }

    /// Whether integrations for this event are registered under channel
    /// keys. Events that don't target channels register under the `__any`
    /// sentinel instead.
    pub fn uses_channel(&self) -> bool {
        matches!(
            self,
            EventKind::SendMessage
                | EventKind::FileUploaded
                | EventKind::RoomJoined
                | EventKind::RoomLeft
        )
    }

    /// Whether trigger-word filtering applies to this event.
    pub fn uses_trigger_words(&self) -> bool {
        matches!(self, EventKind::SendMessage)
    }

    /// Whether the integration's static target room applies to this event.
    pub fn uses_target_room(&self) -> bool {
        matches!(self, EventKind::UserCreated)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Loosely-populated argument slots handed in with an event name. Which
/// slots a kind actually reads is decided during normalization.
#[derive(Debug, Clone, Default)]
pub struct EventArgs {
    pub message: Option<Message>,
    pub room: Option<Room>,
    pub user: Option<User>,
    pub owner: Option<User>,
}

/// The uniform event record one trigger-execution pass operates on.
/// Retried attempts carry a clone of this record.
#[derive(Debug, Clone, Default)]
pub struct NormalizedEvent {
    /// `None` means "no event": nothing will be executed.
    pub kind: Option<EventKind>,
    pub message: Option<Message>,
    pub room: Option<Room>,
    pub user: Option<User>,
    pub owner: Option<User>,
}

/// Normalize an event name plus argument slots into a typed record.
///
/// Each kind declares which slots it requires; if any required slot is
/// absent, none of the optional fields are populated (they stay absent,
/// not defaulted) and the downstream mapper aborts the pass.
pub fn normalize_event(name: &str, args: EventArgs) -> NormalizedEvent {
    let Some(kind) = EventKind::parse(name) else {
        tracing::warn!(event = name, "an unhandled trigger event was called");
        return NormalizedEvent::default();
    };

    let mut normalized = NormalizedEvent {
        kind: Some(kind),
        ..NormalizedEvent::default()
    };

    match kind {
        EventKind::SendMessage => {
            if let (Some(message), Some(room)) = (args.message, args.room) {
                normalized.message = Some(message);
                normalized.room = Some(room);
            }
        }
        EventKind::FileUploaded => {
            if let (Some(user), Some(room), Some(message)) = (args.user, args.room, args.message) {
                normalized.user = Some(user);
                normalized.room = Some(room);
                normalized.message = Some(message);
            }
        }
        EventKind::RoomArchived | EventKind::RoomJoined | EventKind::RoomLeft => {
            if let (Some(room), Some(user)) = (args.room, args.user) {
                normalized.room = Some(room);
                normalized.user = Some(user);
            }
        }
        EventKind::RoomCreated => {
            if let (Some(owner), Some(room)) = (args.owner, args.room) {
                normalized.owner = Some(owner);
                normalized.room = Some(room);
            }
        }
        EventKind::UserCreated => {
            normalized.user = args.user;
        }
    }

    tracing::debug!(event = %kind, "got the event arguments for the event");
    normalized
}
