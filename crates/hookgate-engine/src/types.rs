//! Foundational types for the outgoing trigger engine.
//!
//! Every type here is `Serialize + Deserialize + Debug + Clone`. Header and
//! wire maps use `BTreeMap` (never `HashMap`) for deterministic
//! serialization. Enums that mirror persisted admin configuration are
//! `#[non_exhaustive]` with a catch-all variant so stale records
//! deserialize instead of erroring.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::EventKind;

// ---------------------------------------------------------------------------
// Chat snapshots
// ---------------------------------------------------------------------------

/// Room visibility classes. Anything that is neither a direct room nor a
/// public channel resolves through the private-group registry rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RoomKind {
    #[serde(rename = "d")]
    Direct,
    #[serde(rename = "c")]
    Public,
    #[serde(rename = "p")]
    Private,
    #[serde(other)]
    Other,
}

/// A room snapshot as seen by the trigger engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Room {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: RoomKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    /// Participant user ids (populated for direct rooms).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uids: Vec<String>,
    /// Participant usernames (populated for direct rooms).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usernames: Vec<String>,
}

/// A user snapshot. `services` carries the authentication-credential blob
/// and must never reach a webhook payload; see
/// [`without_services()`](User::without_services).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Value>,
}

impl User {
    /// Clone with the credential sub-object removed. Mandatory before
    /// embedding a user in any outgoing payload.
    pub fn without_services(&self) -> User {
        User {
            services: None,
            ..self.clone()
        }
    }

    /// Whether this account is a bot account.
    pub fn is_bot(&self) -> bool {
        self.user_type.as_deref() == Some("bot")
    }
}

/// Author slice of a message (id + username).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MessageAuthor {
    pub id: String,
    pub username: String,
}

/// A message snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub text: String,
    pub ts: DateTime<Utc>,
    pub author: MessageAuthor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Bot descriptor. Any truthy value marks the message as bot-authored;
    /// the payload mapper preserves that coercion as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Thread id (`tmid` on the wire).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Integration configuration
// ---------------------------------------------------------------------------

/// Backoff strategy between retried webhook calls.
///
/// Persisted admin configuration; an unrecognized value deserializes to
/// `Unknown`, which [`delay_ms()`](RetryDelay::delay_ms) reports as a
/// configuration error (`None`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum RetryDelay {
    /// 0.1s, 1s, 10s, 1m40s, ...
    #[default]
    PowersOfTen,
    /// 2s, 4s, 8s, ...
    PowersOfTwo,
    /// 2s, 4s, 6s, ...
    IncrementsOfTwo,
    #[serde(other)]
    Unknown,
}

impl RetryDelay {
    /// Wait time in milliseconds before retry number `tries + 1`, where
    /// `tries` counts already-failed attempts. `None` means the configured
    /// strategy is invalid and no retry must be scheduled.
    pub fn delay_ms(&self, tries: u32) -> Option<u64> {
        match self {
            RetryDelay::PowersOfTen => Some(10u64.pow(tries + 2)),
            RetryDelay::PowersOfTwo => Some(2u64.pow(tries + 1) * 1000),
            RetryDelay::IncrementsOfTwo => Some((u64::from(tries) + 1) * 2000),
            RetryDelay::Unknown => None,
        }
    }
}

/// An outgoing webhook integration as configured by an admin workflow.
///
/// Read-only to this engine except for the disable-on-410 mutation applied
/// through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutgoingIntegration {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub event: EventKind,
    /// Channel keys in their prefixed form (`#room-id`, `#room-name`,
    /// `@username`) or a registry sentinel. Empty means "all public
    /// channels" for channel-targeted events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    /// Bot account the integration posts as.
    pub username: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Post as the payload's user instead of the configured bot account.
    #[serde(default)]
    pub impersonate_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_room: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_words: Vec<String>,
    /// Match trigger words anywhere in the text instead of prefix-only.
    #[serde(default)]
    pub trigger_word_anywhere: bool,
    #[serde(default)]
    pub run_on_edits: bool,
    #[serde(default)]
    pub retry_failed_calls: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_delay: RetryDelay,
    /// Whether the integration carries transform scripts. Consumed by
    /// script engines, opaque to the executor.
    #[serde(default)]
    pub script_enabled: bool,
}

// ---------------------------------------------------------------------------
// Message drafts and posting
// ---------------------------------------------------------------------------

/// A message to be posted on behalf of an integration, produced by script
/// hooks or derived from a webhook response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MessageDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Bot-origin marker, stamped by the dispatcher with the integration id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<Value>,
}

/// Defaults applied by the posting capability when the draft leaves a field
/// unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PostDefaults {
    pub alias: String,
    pub avatar: String,
    pub emoji: String,
    /// Channel display form: `@{room id}` for direct rooms, `#{room id}`
    /// otherwise.
    pub channel: String,
}

/// A message accepted by the posting capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PostedMessage {
    pub channel: String,
    pub message: Message,
}

// ---------------------------------------------------------------------------
// HTTP request/response shapes
// ---------------------------------------------------------------------------

/// The request a script engine's prepare hook yields. `url`/`method` are
/// optional because a script may null them out to suppress the call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutgoingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Basic-auth credentials, `user:password` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// A message to dispatch before the HTTP call is made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageDraft>,
}

/// A fully-materialized HTTP call handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpCallRequest {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// The transport's view of a completed HTTP exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpCallResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpCallResponse {
    /// The declared media type, lowercased, without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| {
                v.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
    }
}

/// JS-style truthiness for JSON values. The payload mapper and word-match
/// paths preserve the historical coercion semantics of the webhook
/// contract, which were defined in these terms.
pub(crate) fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip<T: Serialize + for<'de> Deserialize<'de>>(val: &T) -> T {
        let json = serde_json::to_string(val).expect("serialize");
        serde_json::from_str(&json).expect("deserialize")
    }

    #[test]
    fn retry_delay_powers_of_ten_sequence() {
        let d = RetryDelay::PowersOfTen;
        assert_eq!(d.delay_ms(0), Some(100));
        assert_eq!(d.delay_ms(1), Some(1_000));
        assert_eq!(d.delay_ms(2), Some(10_000));
    }

    #[test]
    fn retry_delay_powers_of_two_sequence() {
        let d = RetryDelay::PowersOfTwo;
        assert_eq!(d.delay_ms(0), Some(2_000));
        assert_eq!(d.delay_ms(1), Some(4_000));
        assert_eq!(d.delay_ms(2), Some(8_000));
    }

    #[test]
    fn retry_delay_increments_of_two_sequence() {
        let d = RetryDelay::IncrementsOfTwo;
        assert_eq!(d.delay_ms(0), Some(2_000));
        assert_eq!(d.delay_ms(1), Some(4_000));
        assert_eq!(d.delay_ms(2), Some(6_000));
    }

    #[test]
    fn retry_delay_unknown_is_config_error() {
        let d: RetryDelay = serde_json::from_str("\"fibonacci\"").expect("deserialize");
        assert_eq!(d, RetryDelay::Unknown);
        assert_eq!(d.delay_ms(0), None);
    }

    #[test]
    fn retry_delay_round_trip() {
        for d in [
            RetryDelay::PowersOfTen,
            RetryDelay::PowersOfTwo,
            RetryDelay::IncrementsOfTwo,
        ] {
            assert_eq!(round_trip(&d), d);
        }
    }

    #[test]
    fn room_kind_wire_form() {
        assert_eq!(serde_json::to_string(&RoomKind::Direct).expect("ser"), "\"d\"");
        assert_eq!(serde_json::to_string(&RoomKind::Public).expect("ser"), "\"c\"");
        let other: RoomKind = serde_json::from_str("\"l\"").expect("deserialize");
        assert_eq!(other, RoomKind::Other);
    }

    #[test]
    fn without_services_strips_credentials() {
        let user = User {
            id: "u1".into(),
            username: "rocket.cat".into(),
            name: None,
            user_type: None,
            created_at: None,
            services: Some(json!({"password": {"bcrypt": "$2b$..."}})),
        };
        let scrubbed = user.without_services();
        assert!(scrubbed.services.is_none());
        assert_eq!(scrubbed.username, user.username);
        // Original is untouched.
        assert!(user.services.is_some());
    }

    #[test]
    fn content_type_strips_parameters() {
        let res = HttpCallResponse {
            status: 200,
            headers: BTreeMap::from([(
                "Content-Type".to_string(),
                "application/json; charset=utf-8".to_string(),
            )]),
            body: String::new(),
        };
        assert_eq!(res.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn truthiness_matches_wire_contract() {
        assert!(value_is_truthy(&json!({"i": "abc"})));
        assert!(value_is_truthy(&json!(true)));
        assert!(value_is_truthy(&json!("x")));
        assert!(!value_is_truthy(&json!(false)));
        assert!(!value_is_truthy(&json!(null)));
        assert!(!value_is_truthy(&json!("")));
        assert!(!value_is_truthy(&json!(0)));
    }
}
