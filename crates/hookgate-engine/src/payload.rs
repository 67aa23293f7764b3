//! Outgoing payload construction.
//!
//! The payload is rebuilt from scratch on every attempt (including retries)
//! so delayed executions observe current settings. Embedded user and owner
//! objects are always scrubbed of their credential sub-object before
//! inclusion; this is a data-loss-prevention requirement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{EventKind, NormalizedEvent};
use crate::types::{value_is_truthy, Message, Room, User};

/// The data body sent to an outgoing webhook. Wire field names keep the
/// historical webhook contract (`siteUrl`, `isEdited`, `tmid`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutgoingPayload {
    pub token: String,
    pub bot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "siteUrl", default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "isEdited", default, skip_serializing_if = "Option::is_none")]
    pub is_edited: Option<bool>,
    #[serde(rename = "tmid", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<User>,
}

impl OutgoingPayload {
    /// Fresh payload for one attempt: token populated, everything else
    /// absent, `bot` false until the mapper decides otherwise.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }
}

fn fill_message_fields(payload: &mut OutgoingPayload, room: &Room, message: &Message) {
    payload.channel_id = Some(room.id.clone());
    payload.channel_name = room.name.clone();
    payload.message_id = Some(message.id.clone());
    payload.timestamp = Some(message.ts);
    payload.user_id = Some(message.author.id.clone());
    payload.user_name = Some(message.author.username.clone());
    payload.text = Some(message.text.clone());

    if let Some(alias) = &message.alias {
        payload.alias = Some(alias.clone());
    }

    if let Some(bot) = &message.bot {
        // Truthiness coercion preserved from the historical contract: a
        // non-boolean bot descriptor still marks the payload as bot.
        payload.bot = value_is_truthy(bot);
    }
}

/// Fill `payload` from the normalized event.
///
/// When the fields the event kind requires are absent, the payload is left
/// unmodified and a warning is emitted; callers must treat an unmodified
/// payload as "abort, do not send".
pub fn map_event_to_payload(
    payload: &mut OutgoingPayload,
    event: &NormalizedEvent,
    site_url: Option<String>,
) {
    let Some(kind) = event.kind else {
        return;
    };

    match kind {
        EventKind::SendMessage => {
            let (Some(room), Some(message)) = (&event.room, &event.message) else {
                tracing::warn!(
                    event = %kind,
                    "the integration was called but the room or message was not defined"
                );
                return;
            };
            fill_message_fields(payload, room, message);
            payload.site_url = site_url;

            if message.edited_at.is_some() {
                payload.is_edited = Some(true);
            }

            if let Some(thread_id) = &message.thread_id {
                payload.thread_id = Some(thread_id.clone());
            }
        }
        EventKind::FileUploaded => {
            let (Some(room), Some(message)) = (&event.room, &event.message) else {
                tracing::warn!(
                    event = %kind,
                    "the integration was called but the room or message was not defined"
                );
                return;
            };
            fill_message_fields(payload, room, message);
            payload.user = event.user.as_ref().map(User::without_services);
            payload.room = Some(room.clone());
            payload.message = Some(message.clone());
        }
        EventKind::RoomCreated => {
            let (Some(room), Some(owner)) = (&event.room, &event.owner) else {
                tracing::warn!(
                    event = %kind,
                    "the integration was called but the room or owner was not defined"
                );
                return;
            };
            payload.channel_id = Some(room.id.clone());
            payload.channel_name = room.name.clone();
            payload.timestamp = room.ts;
            payload.user_id = Some(owner.id.clone());
            payload.user_name = Some(owner.username.clone());
            payload.owner = Some(owner.without_services());
            payload.room = Some(room.clone());
        }
        EventKind::RoomArchived | EventKind::RoomJoined | EventKind::RoomLeft => {
            let (Some(room), Some(user)) = (&event.room, &event.user) else {
                tracing::warn!(
                    event = %kind,
                    "the integration was called but the room or user was not defined"
                );
                return;
            };
            payload.timestamp = Some(Utc::now());
            payload.channel_id = Some(room.id.clone());
            payload.channel_name = room.name.clone();
            payload.user_id = Some(user.id.clone());
            payload.user_name = Some(user.username.clone());
            payload.user = Some(user.without_services());
            payload.room = Some(room.clone());

            if user.is_bot() {
                payload.bot = true;
            }
        }
        EventKind::UserCreated => {
            let Some(user) = &event.user else {
                tracing::warn!(
                    event = %kind,
                    "the integration was called but the user was not defined"
                );
                return;
            };
            payload.timestamp = user.created_at;
            payload.user_id = Some(user.id.clone());
            payload.user_name = Some(user.username.clone());
            payload.user = Some(user.without_services());

            if user.is_bot() {
                payload.bot = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageAuthor, RoomKind};
    use serde_json::json;

    fn room() -> Room {
        Room {
            id: "general-id".into(),
            name: Some("general".into()),
            kind: RoomKind::Public,
            ts: Some(Utc::now()),
            uids: vec![],
            usernames: vec![],
        }
    }

    fn user(id: &str, username: &str) -> User {
        User {
            id: id.into(),
            username: username.into(),
            name: None,
            user_type: None,
            created_at: Some(Utc::now()),
            services: Some(json!({"password": {"bcrypt": "hash"}})),
        }
    }

    fn message(text: &str) -> Message {
        Message {
            id: "m1".into(),
            room_id: "general-id".into(),
            text: text.into(),
            ts: Utc::now(),
            author: MessageAuthor {
                id: "u1".into(),
                username: "alice".into(),
            },
            alias: None,
            bot: None,
            edited_at: None,
            thread_id: None,
            attachments: vec![],
        }
    }

    fn event(kind: EventKind) -> NormalizedEvent {
        NormalizedEvent {
            kind: Some(kind),
            ..NormalizedEvent::default()
        }
    }

    #[test]
    fn send_message_maps_core_fields() {
        let mut ev = event(EventKind::SendMessage);
        ev.room = Some(room());
        ev.message = Some(message("hello"));

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, Some("https://chat.example".into()));

        assert_eq!(payload.channel_id.as_deref(), Some("general-id"));
        assert_eq!(payload.channel_name.as_deref(), Some("general"));
        assert_eq!(payload.message_id.as_deref(), Some("m1"));
        assert_eq!(payload.user_id.as_deref(), Some("u1"));
        assert_eq!(payload.user_name.as_deref(), Some("alice"));
        assert_eq!(payload.text.as_deref(), Some("hello"));
        assert_eq!(payload.site_url.as_deref(), Some("https://chat.example"));
        assert!(payload.is_edited.is_none());
        assert!(!payload.bot);
    }

    #[test]
    fn send_message_without_room_leaves_payload_unmodified() {
        let mut ev = event(EventKind::SendMessage);
        ev.message = Some(message("hello"));

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);

        let json = serde_json::to_value(&payload).expect("serialize");
        // Only token and bot survive serialization; every mapped field is
        // still absent.
        assert_eq!(json, json!({"token": "tok", "bot": false}));
    }

    #[test]
    fn truthy_bot_descriptor_coerces_to_true() {
        let mut msg = message("hi");
        msg.bot = Some(json!({"i": "some-integration"}));

        let mut ev = event(EventKind::SendMessage);
        ev.room = Some(room());
        ev.message = Some(msg);

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);
        assert!(payload.bot);
    }

    #[test]
    fn edited_message_sets_is_edited() {
        let mut msg = message("hi");
        msg.edited_at = Some(Utc::now());
        msg.thread_id = Some("t1".into());

        let mut ev = event(EventKind::SendMessage);
        ev.room = Some(room());
        ev.message = Some(msg);

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);
        assert_eq!(payload.is_edited, Some(true));
        assert_eq!(payload.thread_id.as_deref(), Some("t1"));
    }

    #[test]
    fn file_uploaded_embeds_scrubbed_user() {
        let mut ev = event(EventKind::FileUploaded);
        ev.room = Some(room());
        ev.message = Some(message("file"));
        ev.user = Some(user("u2", "bob"));

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);

        let embedded = payload.user.expect("user embedded");
        assert!(embedded.services.is_none());
        assert!(payload.room.is_some());
        assert!(payload.message.is_some());
    }

    #[test]
    fn room_created_requires_owner() {
        let mut ev = event(EventKind::RoomCreated);
        ev.room = Some(room());

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);
        assert!(payload.channel_id.is_none());
    }

    #[test]
    fn room_created_embeds_scrubbed_owner() {
        let mut ev = event(EventKind::RoomCreated);
        ev.room = Some(room());
        ev.owner = Some(user("u9", "owner"));

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);

        assert_eq!(payload.user_id.as_deref(), Some("u9"));
        let owner = payload.owner.expect("owner embedded");
        assert!(owner.services.is_none());
    }

    #[test]
    fn room_joined_bot_user_sets_bot_flag() {
        let mut joiner = user("u3", "bot-user");
        joiner.user_type = Some("bot".into());

        let mut ev = event(EventKind::RoomJoined);
        ev.room = Some(room());
        ev.user = Some(joiner);

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);
        assert!(payload.bot);
        assert!(payload.timestamp.is_some());
        assert!(payload.user.expect("user").services.is_none());
    }

    #[test]
    fn user_created_uses_creation_time() {
        let created = user("u4", "newbie");
        let created_at = created.created_at;

        let mut ev = event(EventKind::UserCreated);
        ev.user = Some(created);

        let mut payload = OutgoingPayload::new("tok");
        map_event_to_payload(&mut payload, &ev, None);
        assert_eq!(payload.timestamp, created_at);
        assert!(payload.channel_id.is_none());
    }
}
