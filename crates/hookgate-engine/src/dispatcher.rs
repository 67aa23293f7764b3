//! Message dispatch on behalf of an integration.
//!
//! Resolves the acting user (impersonation or the configured bot account)
//! and the target room, stamps the bot-origin marker and default
//! alias/avatar/emoji, then delegates to the chat directory's posting
//! capability. Failures are soft: `None` is returned and logged, nothing
//! propagates to the executor's caller.

use std::sync::Arc;

use serde_json::json;

use crate::payload::OutgoingPayload;
use crate::traits::ChatDirectory;
use crate::types::{MessageDraft, OutgoingIntegration, PostDefaults, PostedMessage, Room, RoomKind};

pub struct MessageDispatcher {
    directory: Arc<dyn ChatDirectory>,
}

impl MessageDispatcher {
    pub fn new(directory: Arc<dyn ChatDirectory>) -> Self {
        Self { directory }
    }

    /// Post `draft` for `trigger`. `name_or_id` is an optional room hint,
    /// `fallback_room` the room the event happened in, and `payload`
    /// supplies the impersonation username.
    pub async fn send(
        &self,
        trigger: &OutgoingIntegration,
        name_or_id: Option<&str>,
        fallback_room: Option<&Room>,
        mut draft: MessageDraft,
        payload: &OutgoingPayload,
    ) -> Option<Vec<PostedMessage>> {
        // Try the user we are impersonating first; fall back to the
        // integration's configured bot account, which is required to exist.
        let mut user = None;
        if trigger.impersonate_user {
            if let Some(user_name) = &payload.user_name {
                user = self
                    .directory
                    .find_user_by_username_ignoring_case(user_name)
                    .await;
            }
        }

        let user = match user {
            Some(user) => user,
            None => {
                match self
                    .directory
                    .find_user_by_username_ignoring_case(&trigger.username)
                    .await
                {
                    Some(user) => user,
                    None => {
                        tracing::error!(
                            username = %trigger.username,
                            "the user doesn't exist, so we can't send the message"
                        );
                        return None;
                    }
                }
            }
        };

        let hint = name_or_id
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| draft.channel.clone().filter(|s| !s.is_empty()))
            .or_else(|| trigger.target_room.clone().filter(|s| !s.is_empty()));

        let room = match hint {
            Some(hint) => match self
                .directory
                .find_room_by_name_or_id_joining(&user, &hint)
                .await
            {
                Some(room) => Some(room),
                None => fallback_room.cloned(),
            },
            None => fallback_room.cloned(),
        };

        let Some(room) = room else {
            tracing::warn!(
                integration = %trigger.name,
                "the integration doesn't have a room configured nor did it provide a room to send the message to"
            );
            return None;
        };

        tracing::debug!(
            integration = %trigger.name,
            room = %room.id,
            kind = ?room.kind,
            "found a room for the integration"
        );

        draft.bot = Some(json!({ "i": trigger.id }));

        let defaults = PostDefaults {
            alias: trigger.alias.clone().unwrap_or_default(),
            avatar: trigger.avatar.clone().unwrap_or_default(),
            emoji: trigger.emoji.clone().unwrap_or_default(),
            channel: if room.kind == RoomKind::Direct {
                format!("@{}", room.id)
            } else {
                format!("#{}", room.id)
            },
        };

        self.directory.post_message(&user, draft, defaults).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::InMemoryChatDirectory;
    use crate::events::EventKind;
    use crate::types::{RetryDelay, User};

    fn trigger() -> OutgoingIntegration {
        OutgoingIntegration {
            id: "i1".into(),
            name: "test hook".into(),
            enabled: true,
            event: EventKind::SendMessage,
            channel: vec![],
            urls: vec![],
            username: "hook-bot".into(),
            token: "tok".into(),
            alias: Some("Webhook".into()),
            avatar: None,
            emoji: None,
            impersonate_user: false,
            target_room: None,
            trigger_words: vec![],
            trigger_word_anywhere: false,
            run_on_edits: false,
            retry_failed_calls: false,
            retry_count: 0,
            retry_delay: RetryDelay::default(),
            script_enabled: false,
        }
    }

    fn user(id: &str, username: &str) -> User {
        User {
            id: id.into(),
            username: username.into(),
            name: None,
            user_type: None,
            created_at: None,
            services: None,
        }
    }

    fn room(id: &str, kind: RoomKind) -> Room {
        Room {
            id: id.into(),
            name: Some(id.to_string()),
            kind,
            ts: None,
            uids: vec![],
            usernames: vec![],
        }
    }

    fn draft(text: &str) -> MessageDraft {
        MessageDraft {
            text: Some(text.into()),
            ..MessageDraft::default()
        }
    }

    #[tokio::test]
    async fn missing_bot_user_fails_without_posting() {
        let directory = Arc::new(InMemoryChatDirectory::new());
        let dispatcher = MessageDispatcher::new(directory.clone());

        let result = dispatcher
            .send(
                &trigger(),
                None,
                Some(&room("general", RoomKind::Public)),
                draft("hi"),
                &OutgoingPayload::new("tok"),
            )
            .await;

        assert!(result.is_none());
        assert!(directory.posted().is_empty());
    }

    #[tokio::test]
    async fn posts_with_bot_marker_and_defaults() {
        let directory = Arc::new(InMemoryChatDirectory::new());
        directory.add_user(user("u1", "hook-bot"));
        directory.add_room(room("general", RoomKind::Public));
        let dispatcher = MessageDispatcher::new(directory.clone());

        let result = dispatcher
            .send(
                &trigger(),
                None,
                Some(&room("general", RoomKind::Public)),
                draft("hi"),
                &OutgoingPayload::new("tok"),
            )
            .await
            .expect("posted");

        assert_eq!(result.len(), 1);
        let posted = &directory.posted()[0];
        assert_eq!(posted.channel, "#general");
        assert_eq!(posted.message.bot.as_ref().expect("marker")["i"], "i1");
        assert_eq!(posted.message.alias.as_deref(), Some("Webhook"));
    }

    #[tokio::test]
    async fn direct_room_channel_display_uses_at_prefix() {
        let directory = Arc::new(InMemoryChatDirectory::new());
        directory.add_user(user("u1", "hook-bot"));
        let dispatcher = MessageDispatcher::new(directory.clone());

        dispatcher
            .send(
                &trigger(),
                None,
                Some(&room("dm1", RoomKind::Direct)),
                draft("hi"),
                &OutgoingPayload::new("tok"),
            )
            .await
            .expect("posted");

        assert_eq!(directory.posted()[0].channel, "@dm1");
    }

    #[tokio::test]
    async fn impersonation_uses_payload_user_name() {
        let directory = Arc::new(InMemoryChatDirectory::new());
        directory.add_user(user("u1", "hook-bot"));
        directory.add_user(user("u2", "Alice"));
        directory.add_room(room("general", RoomKind::Public));
        let dispatcher = MessageDispatcher::new(directory.clone());

        let mut record = trigger();
        record.impersonate_user = true;
        let mut payload = OutgoingPayload::new("tok");
        payload.user_name = Some("alice".into());

        dispatcher
            .send(
                &record,
                None,
                Some(&room("general", RoomKind::Public)),
                draft("hi"),
                &payload,
            )
            .await
            .expect("posted");

        assert_eq!(directory.posted()[0].message.author.username, "Alice");
    }

    #[tokio::test]
    async fn draft_channel_hint_overrides_fallback_room() {
        let directory = Arc::new(InMemoryChatDirectory::new());
        directory.add_user(user("u1", "hook-bot"));
        directory.add_room(room("ops", RoomKind::Public));
        let dispatcher = MessageDispatcher::new(directory.clone());

        let mut message = draft("hi");
        message.channel = Some("#ops".into());

        dispatcher
            .send(
                &trigger(),
                None,
                Some(&room("general", RoomKind::Public)),
                message,
                &OutgoingPayload::new("tok"),
            )
            .await
            .expect("posted");

        assert_eq!(directory.posted()[0].channel, "#ops");
    }

    #[tokio::test]
    async fn unresolvable_hint_falls_back_to_event_room() {
        let directory = Arc::new(InMemoryChatDirectory::new());
        directory.add_user(user("u1", "hook-bot"));
        let dispatcher = MessageDispatcher::new(directory.clone());

        let mut record = trigger();
        record.target_room = Some("#nowhere".into());

        dispatcher
            .send(
                &record,
                None,
                Some(&room("general", RoomKind::Public)),
                draft("hi"),
                &OutgoingPayload::new("tok"),
            )
            .await
            .expect("posted");

        assert_eq!(directory.posted()[0].channel, "#general");
    }

    #[tokio::test]
    async fn no_room_anywhere_fails() {
        let directory = Arc::new(InMemoryChatDirectory::new());
        directory.add_user(user("u1", "hook-bot"));
        let dispatcher = MessageDispatcher::new(directory.clone());

        let result = dispatcher
            .send(&trigger(), None, None, draft("hi"), &OutgoingPayload::new("tok"))
            .await;
        assert!(result.is_none());
    }
}
