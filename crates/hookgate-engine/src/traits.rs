//! Collaborator trait interfaces for the trigger engine.
//!
//! Every external capability the engine consumes is defined as a trait so
//! alternate implementations can be substituted without touching the
//! executor. In-crate defaults live in `defaults/`.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{HistoryError, ScriptError, TransportError};
use crate::history::HistoryUpdate;
use crate::payload::OutgoingPayload;
use crate::types::{
    HttpCallRequest, HttpCallResponse, Message, MessageDraft, OutgoingIntegration,
    OutgoingRequest, PostDefaults, PostedMessage, Room, User,
};

// ---------------------------------------------------------------------------
// ScriptEngine
// ---------------------------------------------------------------------------

/// What the response-processing hook decided.
#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    /// Post this message; the attempt ends when it is dispatched.
    Message(MessageDraft),
    /// The script handled the response itself: terminal, no message.
    Handled,
    /// No opinion; fall through to default HTTP-status handling.
    Default,
}

/// The pluggable transform hooks a webhook author can attach to an
/// integration.
///
/// Implementations run author-provided scripts (or nothing at all; see
/// `DefaultScriptEngine`). Every internal failure mode must surface as
/// [`ScriptError`] so the executor sees one error shape regardless of the
/// engine.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Build (and optionally transform) the request for one URL. A `None`
    /// result means "do not call the URL": the attempt ends without error.
    async fn prepare_outgoing_request(
        &self,
        integration: &OutgoingIntegration,
        data: &OutgoingPayload,
        url: &str,
        history_id: &str,
    ) -> Result<Option<OutgoingRequest>, ScriptError>;

    /// Interpret the webhook's response. `content` is the raw body text.
    async fn process_outgoing_response(
        &self,
        integration: &OutgoingIntegration,
        request: &OutgoingRequest,
        response: &HttpCallResponse,
        content: &str,
        history_id: &str,
    ) -> Result<ResponseOutcome, ScriptError>;
}

// ---------------------------------------------------------------------------
// ChatDirectory
// ---------------------------------------------------------------------------

/// Narrow read/write window onto the chat system: user/room/message
/// lookup plus the message-posting capability.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn find_user_by_id(&self, id: &str) -> Option<User>;

    async fn find_user_by_username_ignoring_case(&self, username: &str) -> Option<User>;

    async fn find_room_by_id(&self, id: &str) -> Option<Room>;

    async fn find_message_by_id(&self, id: &str) -> Option<Message>;

    /// Resolve a room by name or id on behalf of `user`, joining them to
    /// it when the room allows. Returns `None` for unresolvable
    /// identifiers instead of erroring.
    async fn find_room_by_name_or_id_joining(&self, user: &User, name_or_id: &str) -> Option<Room>;

    /// Post a message as `user`, applying `defaults` for unset draft
    /// fields. A `None` result is treated by callers as failure.
    async fn post_message(
        &self,
        user: &User,
        draft: MessageDraft,
        defaults: PostDefaults,
    ) -> Option<Vec<PostedMessage>>;
}

// ---------------------------------------------------------------------------
// HistorySink
// ---------------------------------------------------------------------------

/// Append-only audit log of execution steps. Write-only to the engine;
/// `replay` consumes stored entries supplied by the caller.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Record one step. An empty/absent `history_id` allocates a new entry
    /// id, which is returned and threaded through subsequent updates.
    async fn record(&self, update: HistoryUpdate) -> Result<String, HistoryError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Generic fetch capability. Rejects (errors) on network failure; HTTP
/// error statuses are returned as responses, not errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn call(
        &self,
        request: HttpCallRequest,
        allow_invalid_certs: bool,
    ) -> Result<HttpCallResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// SettingsProvider
// ---------------------------------------------------------------------------

/// Site URL setting key.
pub const SETTING_SITE_URL: &str = "site_url";
/// TLS policy setting key: accept invalid self-signed certificates.
pub const SETTING_ALLOW_INVALID_CERTS: &str = "allow_invalid_self_signed_certs";

/// Key-value settings lookups. Read at use time, never cached by the
/// engine, so retried attempts observe current values.
pub trait SettingsProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn site_url(&self) -> Option<String> {
        self.get(SETTING_SITE_URL)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn allow_invalid_certs(&self) -> bool {
        self.get(SETTING_ALLOW_INVALID_CERTS)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// ChangeNotifier
// ---------------------------------------------------------------------------

/// Fire-and-forget notifications about engine-initiated integration
/// changes (currently only disable-on-410).
pub trait ChangeNotifier: Send + Sync {
    fn integration_disabled(&self, id: &str);
}

/// No-op change notifier (useful for tests and embedders without a
/// listener bus).
pub struct NoopChangeNotifier;

impl ChangeNotifier for NoopChangeNotifier {
    fn integration_disabled(&self, _id: &str) {}
}
