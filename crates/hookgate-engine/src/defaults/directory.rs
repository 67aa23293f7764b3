//! In-memory chat directory for tests and lightweight embedding.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::traits::ChatDirectory;
use crate::types::{Message, MessageAuthor, MessageDraft, PostDefaults, PostedMessage, Room, User};

/// A small chat world: seeded users/rooms/messages, plus a log of every
/// message posted through it.
#[derive(Default)]
pub struct InMemoryChatDirectory {
    users: RwLock<Vec<User>>,
    rooms: RwLock<Vec<Room>>,
    messages: RwLock<Vec<Message>>,
    posted: RwLock<Vec<PostedMessage>>,
}

impl InMemoryChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.users.write().push(user);
    }

    pub fn add_room(&self, room: Room) {
        self.rooms.write().push(room);
    }

    pub fn add_message(&self, message: Message) {
        self.messages.write().push(message);
    }

    /// Messages posted through this directory, in order.
    pub fn posted(&self) -> Vec<PostedMessage> {
        self.posted.read().clone()
    }
}

#[async_trait]
impl ChatDirectory for InMemoryChatDirectory {
    async fn find_user_by_id(&self, id: &str) -> Option<User> {
        self.users.read().iter().find(|u| u.id == id).cloned()
    }

    async fn find_user_by_username_ignoring_case(&self, username: &str) -> Option<User> {
        self.users
            .read()
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned()
    }

    async fn find_room_by_id(&self, id: &str) -> Option<Room> {
        self.rooms.read().iter().find(|r| r.id == id).cloned()
    }

    async fn find_message_by_id(&self, id: &str) -> Option<Message> {
        self.messages.read().iter().find(|m| m.id == id).cloned()
    }

    async fn find_room_by_name_or_id_joining(&self, _user: &User, name_or_id: &str) -> Option<Room> {
        let bare = name_or_id
            .strip_prefix('#')
            .or_else(|| name_or_id.strip_prefix('@'))
            .unwrap_or(name_or_id);
        self.rooms
            .read()
            .iter()
            .find(|r| r.id == bare || r.name.as_deref() == Some(bare))
            .cloned()
    }

    async fn post_message(
        &self,
        user: &User,
        draft: MessageDraft,
        defaults: PostDefaults,
    ) -> Option<Vec<PostedMessage>> {
        let channel = draft
            .channel
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or(defaults.channel);
        let room_id = channel.trim_start_matches(['#', '@']).to_string();

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            room_id,
            text: draft.text.clone().unwrap_or_default(),
            ts: Utc::now(),
            author: MessageAuthor {
                id: user.id.clone(),
                username: user.username.clone(),
            },
            alias: draft
                .alias
                .clone()
                .or_else(|| (!defaults.alias.is_empty()).then(|| defaults.alias.clone())),
            bot: draft.bot.clone(),
            edited_at: None,
            thread_id: None,
            attachments: draft.attachments.clone(),
        };

        let posted = PostedMessage { channel, message };
        self.posted.write().push(posted.clone());
        Some(vec![posted])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoomKind;

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

    #[tokio::test]
    async fn username_lookup_ignores_case() {
        let directory = InMemoryChatDirectory::new();
        directory.add_user(user("u1", "Hook.Bot"));

        let found = directory
            .find_user_by_username_ignoring_case("hook.bot")
            .await;
        assert_eq!(found.expect("user").id, "u1");
    }

    #[tokio::test]
    async fn room_lookup_strips_prefixes() {
        let directory = InMemoryChatDirectory::new();
        directory.add_room(Room {
            id: "general-id".into(),
            name: Some("general".into()),
            kind: RoomKind::Public,
            ts: None,
            uids: vec![],
            usernames: vec![],
        });

        let requester = user("u1", "alice");
        for hint in ["#general", "general", "general-id", "#general-id"] {
            let found = directory
                .find_room_by_name_or_id_joining(&requester, hint)
                .await;
            assert!(found.is_some(), "hint: {hint}");
        }
        assert!(directory
            .find_room_by_name_or_id_joining(&requester, "#nope")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn post_applies_defaults() {
        let directory = InMemoryChatDirectory::new();
        let poster = user("u1", "hook-bot");

        let result = directory
            .post_message(
                &poster,
                MessageDraft {
                    text: Some("hi".into()),
                    ..MessageDraft::default()
                },
                PostDefaults {
                    alias: "Webhook".into(),
                    avatar: String::new(),
                    emoji: String::new(),
                    channel: "#general-id".into(),
                },
            )
            .await
            .expect("posted");

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].channel, "#general-id");
        assert_eq!(result[0].message.room_id, "general-id");
        assert_eq!(result[0].message.alias.as_deref(), Some("Webhook"));
        assert_eq!(directory.posted().len(), 1);
    }
}
