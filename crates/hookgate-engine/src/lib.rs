//! Hookgate, the outgoing integration trigger engine.
//!
//! Matches chat events (messages, room lifecycle, file uploads, user
//! creation) against configured outgoing webhooks, builds the payload,
//! lets a pluggable script engine transform request and response, performs
//! the HTTP call, and classifies the result into message posting, trigger
//! disabling, or retry with configurable backoff.
//!
//! The engine is designed to be embedded: persistence, authentication, and
//! transport policy live behind the collaborator traits in [`traits`],
//! with in-crate defaults in [`defaults`].

pub mod defaults;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod events;
pub(crate) mod executor;
pub mod history;
pub mod payload;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export public types at the crate level.

// defaults
pub use defaults::{
    DefaultScriptEngine, InMemoryChatDirectory, InMemoryHistorySink, ReqwestTransport,
    StaticSettings,
};

// dispatcher
pub use dispatcher::MessageDispatcher;

// engine
pub use engine::{TriggerEngine, TriggerEngineBuilder};

// errors
pub use errors::{ExecuteError, HistoryError, ScriptError, TransportError};

// events
pub use events::{normalize_event, EventArgs, EventKind, NormalizedEvent};

// history
pub use history::{HistoryEntry, HistoryStep, HistoryUpdate};

// payload
pub use payload::{map_event_to_payload, OutgoingPayload};

// registry
pub use registry::{
    TriggerRegistry, KEY_ALL_DIRECT_MESSAGES, KEY_ALL_PRIVATE_GROUPS, KEY_ALL_PUBLIC_CHANNELS,
    KEY_ANY,
};

// traits
pub use traits::{
    ChangeNotifier, ChatDirectory, HistorySink, HttpTransport, NoopChangeNotifier,
    ResponseOutcome, ScriptEngine, SettingsProvider, SETTING_ALLOW_INVALID_CERTS,
    SETTING_SITE_URL,
};

// types
pub use types::{
    HttpCallRequest, HttpCallResponse, Message, MessageAuthor, MessageDraft, OutgoingIntegration,
    OutgoingRequest, PostDefaults, PostedMessage, RetryDelay, Room, RoomKind, User,
};
