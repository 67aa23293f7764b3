//! Audit records for trigger executions.
//!
//! Every step of an attempt's lifecycle is appended to the history sink.
//! The engine writes these records but never reads them back, except for
//! `replay`, which re-derives an event from a stored entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EventKind;
use crate::payload::OutgoingPayload;
use crate::types::{OutgoingIntegration, PostedMessage};

/// Lifecycle steps of a single trigger-URL attempt. One terminal step is
/// recorded per attempt (plus the intermediate steps leading to it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum HistoryStep {
    TriggerDisabled,
    TriggerWordNotMatched,
    NotRunningOnEdit,
    StartExecuteTriggerUrl,
    PrepareScriptFailed,
    ProcessScriptFailed,
    MappedArgsToData,
    AfterMaybeRanPrepare,
    AfterPrepareNoOpts,
    AfterPrepareSendMessage,
    AfterPrepareSendMessageFailed,
    AfterPrepareNoUrlOrMethod,
    PreHttpCall,
    AfterHttpCall,
    AfterProcessSendMessage,
    AfterProcessSendMessageFailed,
    AfterProcessFalseResult,
    #[serde(rename = "after-http-status-410")]
    AfterHttpStatus410,
    #[serde(rename = "after-http-status-500")]
    AfterHttpStatus500,
    GoingToRetry,
    TooManyRetries,
    FailedAndNotConfiguredToRetry,
    FailedAndRetryDelayIsInvalid,
    UrlResponseSentMessage,
    AfterHttpCallSendMessageFailed,
}

/// One write against the history sink. An empty `history_id` on the first
/// write allocates a new entry; subsequent writes reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,
    pub integration_id: String,
    pub step: HistoryStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_word: Option<String>,
    /// Snapshot of the mapped payload at this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OutgoingPayload>,
    /// Body handed to the HTTP call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_call_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_message: Option<Vec<PostedMessage>>,
    /// Which retry is about to be scheduled (1-based), on `GoingToRetry`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub finished: bool,
}

impl HistoryUpdate {
    /// A minimal update for `integration` at `step`; callers fill in the
    /// step-specific fields.
    pub fn new(integration: &OutgoingIntegration, step: HistoryStep) -> Self {
        Self {
            history_id: None,
            integration_id: integration.id.clone(),
            step,
            event: None,
            url: None,
            trigger_word: None,
            data: None,
            http_call_data: None,
            http_result: None,
            http_error: None,
            sent_message: None,
            retry: None,
            error: false,
            finished: false,
        }
    }
}

/// A stored audit entry, accumulated from the updates that referenced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoryEntry {
    pub id: String,
    pub integration_id: String,
    /// Latest recorded step.
    pub step: HistoryStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OutgoingPayload>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub finished: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
