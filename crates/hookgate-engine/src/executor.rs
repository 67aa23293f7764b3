//! The per-URL attempt state machine.
//!
//! One attempt walks: enablement gate → trigger-word match → edit policy →
//! payload mapping → script prepare → optional pre-send → HTTP dispatch →
//! script process → status classification → message post or retry. The
//! HTTP call and everything after it run in a spawned task, so
//! [`execute_trigger_url`](crate::engine::TriggerEngine::execute_trigger_url)
//! returns once the request is on the wire. Retries are fresh attempts
//! scheduled with `tokio::time::sleep`: no queue, no durability.

use std::sync::Arc;

use serde_json::Value;

use crate::engine::TriggerEngine;
use crate::errors::ExecuteError;
use crate::events::NormalizedEvent;
use crate::history::{HistoryStep, HistoryUpdate};
use crate::payload::{map_event_to_payload, OutgoingPayload};
use crate::traits::ResponseOutcome;
use crate::types::{
    value_is_truthy, HttpCallRequest, MessageDraft, OutgoingIntegration, OutgoingRequest,
};

/// HTTP statuses treated as application-level success.
const SUCCESS_RESULTS: [u16; 3] = [200, 201, 202];

/// Content types whose response bodies are eligible for JSON parsing.
const JSON_CONTENT_TYPES: [&str; 4] = [
    "application/json",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
];

impl TriggerEngine {
    /// Execute one integration against every configured URL, sequentially.
    /// Failures are isolated per URL: an error on one URL is logged and the
    /// next URL still runs.
    pub(crate) async fn execute_trigger(
        &self,
        trigger: Arc<OutgoingIntegration>,
        event: &NormalizedEvent,
    ) {
        for url in &trigger.urls {
            if let Err(e) = self
                .execute_trigger_url(url.clone(), Arc::clone(&trigger), event.clone(), 0)
                .await
            {
                tracing::error!(
                    integration = %trigger.name,
                    url = %url,
                    error = %e,
                    "trigger url execution failed"
                );
            }
        }
    }

    /// One attempt of `trigger` against `url`. `tries` counts attempts that
    /// have already failed; retries re-enter here with `tries + 1`.
    pub(crate) fn execute_trigger_url(
        &self,
        url: String,
        trigger: Arc<OutgoingIntegration>,
        event: NormalizedEvent,
        tries: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ExecuteError>> + Send + '_>>
    {
        Box::pin(async move {
        // Enablement is re-checked on every attempt: it is the only
        // cancellation mechanism for retries scheduled before a disable.
        if !self.inner.registry.is_enabled(&trigger.id) {
            tracing::warn!(
                integration = %trigger.name,
                tries,
                "the trigger is no longer enabled, stopping execution"
            );
            self.record_terminal(&trigger, HistoryStep::TriggerDisabled, false)
                .await;
            return Ok(());
        }

        tracing::debug!(
            integration = %trigger.name,
            id = %trigger.id,
            "starting to execute trigger"
        );

        // Trigger-word matching, first declared match wins. Only some
        // event kinds support words at all.
        let mut word = None;
        if event.kind.is_some_and(|k| k.uses_trigger_words()) && !trigger.trigger_words.is_empty() {
            let text = event.message.as_ref().map(|m| m.text.as_str());
            word = trigger
                .trigger_words
                .iter()
                .find(|w| {
                    text.is_some_and(|t| {
                        if trigger.trigger_word_anywhere {
                            t.contains(w.as_str())
                        } else {
                            t.starts_with(w.as_str())
                        }
                    })
                })
                .cloned();

            if word.is_none() {
                tracing::debug!(
                    integration = %trigger.name,
                    "the trigger word could not be found, not executing"
                );
                self.record_terminal(&trigger, HistoryStep::TriggerWordNotMatched, false)
                    .await;
                return Ok(());
            }
        }

        if event.message.as_ref().is_some_and(|m| m.edited_at.is_some()) && !trigger.run_on_edits {
            tracing::debug!(
                integration = %trigger.name,
                "run on edits is disabled and the message was edited"
            );
            self.record_terminal(&trigger, HistoryStep::NotRunningOnEdit, false)
                .await;
            return Ok(());
        }

        let mut start = HistoryUpdate::new(&trigger, HistoryStep::StartExecuteTriggerUrl);
        start.event = event.kind;
        start.url = Some(url.clone());
        let history_id = self.record(start).await;

        // The payload is rebuilt on every attempt so retries observe
        // current settings.
        let mut payload = OutgoingPayload::new(trigger.token.clone());
        payload.trigger_word = word.clone();
        map_event_to_payload(&mut payload, &event, self.inner.settings.site_url());

        let mut mapped = HistoryUpdate::new(&trigger, HistoryStep::MappedArgsToData);
        mapped.history_id = Some(history_id.clone());
        mapped.data = Some(payload.clone());
        mapped.trigger_word = word;
        self.record(mapped).await;

        tracing::info!(
            integration = %trigger.name,
            url = %url,
            "will be executing the integration"
        );

        let opts = match self
            .inner
            .script_engine
            .prepare_outgoing_request(&trigger, &payload, &url, &history_id)
            .await
        {
            Ok(opts) => opts,
            Err(e) => {
                let mut failed = HistoryUpdate::new(&trigger, HistoryStep::PrepareScriptFailed);
                failed.history_id = Some(history_id);
                failed.error = true;
                failed.finished = true;
                self.record(failed).await;
                return Err(e.into());
            }
        };

        let mut ran = HistoryUpdate::new(&trigger, HistoryStep::AfterMaybeRanPrepare);
        ran.history_id = Some(history_id.clone());
        self.record(ran).await;

        let Some(opts) = opts else {
            let mut update = HistoryUpdate::new(&trigger, HistoryStep::AfterPrepareNoOpts);
            update.history_id = Some(history_id);
            update.finished = true;
            self.record(update).await;
            return Ok(());
        };

        if let Some(draft) = opts.message.clone() {
            let sent = self
                .inner
                .dispatcher
                .send(&trigger, None, event.room.as_ref(), draft, &payload)
                .await;

            let Some(sent) = sent else {
                let mut update =
                    HistoryUpdate::new(&trigger, HistoryStep::AfterPrepareSendMessageFailed);
                update.history_id = Some(history_id);
                update.finished = true;
                self.record(update).await;
                return Ok(());
            };

            let mut update = HistoryUpdate::new(&trigger, HistoryStep::AfterPrepareSendMessage);
            update.history_id = Some(history_id.clone());
            update.sent_message = Some(sent);
            self.record(update).await;
        }

        let (Some(call_url), Some(method)) = (opts.url.clone(), opts.method.clone()) else {
            let mut update = HistoryUpdate::new(&trigger, HistoryStep::AfterPrepareNoUrlOrMethod);
            update.history_id = Some(history_id);
            update.finished = true;
            self.record(update).await;
            return Ok(());
        };

        let mut headers = opts.headers.clone();

        if let Some(auth) = &opts.auth {
            if !auth.contains(':') {
                return Err(ExecuteError::InvalidAuth);
            }
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(auth.as_bytes());
            headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        }

        if opts.data.is_some() {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }

        let mut pre = HistoryUpdate::new(&trigger, HistoryStep::PreHttpCall);
        pre.history_id = Some(history_id.clone());
        pre.url = Some(call_url.clone());
        pre.http_call_data = opts.data.clone();
        self.record(pre).await;

        let request = HttpCallRequest {
            url: call_url,
            method,
            headers,
            timeout_ms: opts.timeout_ms,
            body: opts.data.as_ref().and_then(|v| serde_json::to_string(v).ok()),
        };

        // The call and its continuation must not block the caller: spawn
        // and return immediately.
        let engine = self.clone();
        tokio::spawn(async move {
            engine
                .handle_response(url, trigger, event, opts, request, history_id, tries)
                .await;
        });

        Ok(())
        })
    }

    /// Everything after the request hits the wire: response parsing, the
    /// process hook, status classification, and retry scheduling.
    #[allow(clippy::too_many_arguments)]
    async fn handle_response(
        &self,
        url: String,
        trigger: Arc<OutgoingIntegration>,
        event: NormalizedEvent,
        opts: OutgoingRequest,
        request: HttpCallRequest,
        history_id: String,
        tries: u32,
    ) {
        let allow_invalid_certs = self.inner.settings.allow_invalid_certs();
        let response = match self.inner.transport.call(request, allow_invalid_certs).await {
            Ok(response) => response,
            Err(e) => {
                // Transport-level failures are terminal for this attempt
                // and never retried by this layer.
                tracing::error!(integration = %trigger.name, url = %url, error = %e, "http call failed");
                let mut update = HistoryUpdate::new(&trigger, HistoryStep::AfterHttpCall);
                update.history_id = Some(history_id);
                update.http_error = Some(e.to_string());
                update.error = true;
                self.record(update).await;
                return;
            }
        };

        let content = response.body.clone();
        if content.is_empty() {
            tracing::warn!(integration = %trigger.name, url = %url, "result for the integration is empty");
        } else {
            tracing::info!(
                integration = %trigger.name,
                url = %url,
                status = response.status,
                "status code for the integration"
            );
        }

        // Parse the body only for whitelisted content types; parse
        // failures degrade to "no parsed content".
        let parsed: Option<Value> = response
            .content_type()
            .filter(|ct| JSON_CONTENT_TYPES.contains(&ct.as_str()))
            .and_then(|_| serde_json::from_str(&content).ok());

        let mut after = HistoryUpdate::new(&trigger, HistoryStep::AfterHttpCall);
        after.history_id = Some(history_id.clone());
        after.http_result = Some(content.clone());
        self.record(after).await;

        let outcome = match self
            .inner
            .script_engine
            .process_outgoing_response(&trigger, &opts, &response, &content, &history_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(integration = %trigger.name, error = %e, "process hook failed");
                let mut update = HistoryUpdate::new(&trigger, HistoryStep::ProcessScriptFailed);
                update.history_id = Some(history_id);
                update.error = true;
                update.finished = true;
                self.record(update).await;
                return;
            }
        };

        match outcome {
            ResponseOutcome::Message(draft) => {
                let response_payload = payload_from_response(parsed.as_ref());
                let sent = self
                    .inner
                    .dispatcher
                    .send(&trigger, None, event.room.as_ref(), draft, &response_payload)
                    .await;

                let mut update = match sent {
                    Some(sent) => {
                        let mut update =
                            HistoryUpdate::new(&trigger, HistoryStep::AfterProcessSendMessage);
                        update.sent_message = Some(sent);
                        update
                    }
                    None => HistoryUpdate::new(&trigger, HistoryStep::AfterProcessSendMessageFailed),
                };
                update.history_id = Some(history_id);
                update.finished = true;
                self.record(update).await;
                return;
            }
            ResponseOutcome::Handled => {
                let mut update = HistoryUpdate::new(&trigger, HistoryStep::AfterProcessFalseResult);
                update.history_id = Some(history_id);
                update.finished = true;
                self.record(update).await;
                return;
            }
            ResponseOutcome::Default => {}
        }

        // Empty body or non-success status: classify and maybe retry.
        if content.is_empty() || !SUCCESS_RESULTS.contains(&response.status) {
            if !content.is_empty() {
                tracing::error!(
                    integration = %trigger.name,
                    url = %url,
                    result = %content,
                    "error for the integration"
                );

                if response.status == 410 {
                    let mut update = HistoryUpdate::new(&trigger, HistoryStep::AfterHttpStatus410);
                    update.history_id = Some(history_id);
                    update.error = true;
                    self.record(update).await;
                    tracing::error!(
                        integration = %trigger.name,
                        "disabling the integration because the status code was 410 (Gone)"
                    );
                    self.inner.registry.disable(&trigger.id);
                    self.inner.notifier.integration_disabled(&trigger.id);
                    return;
                }

                if response.status == 500 {
                    let mut update = HistoryUpdate::new(&trigger, HistoryStep::AfterHttpStatus500);
                    update.history_id = Some(history_id);
                    update.error = true;
                    self.record(update).await;
                    tracing::error!(
                        integration = %trigger.name,
                        url = %url,
                        content = %content,
                        "error 500 for the integration"
                    );
                    return;
                }
            }

            if trigger.retry_failed_calls && trigger.retry_count > 0 {
                if tries < trigger.retry_count {
                    let mut update = HistoryUpdate::new(&trigger, HistoryStep::GoingToRetry);
                    update.history_id = Some(history_id.clone());
                    update.retry = Some(tries + 1);
                    update.error = true;
                    self.record(update).await;

                    let Some(wait_ms) = trigger.retry_delay.delay_ms(tries) else {
                        let mut update =
                            HistoryUpdate::new(&trigger, HistoryStep::FailedAndRetryDelayIsInvalid);
                        update.history_id = Some(history_id);
                        update.error = true;
                        self.record(update).await;
                        return;
                    };

                    tracing::info!(
                        integration = %trigger.name,
                        url = %url,
                        wait_ms,
                        "trying the integration again"
                    );

                    let engine = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(wait_ms)).await;
                        if let Err(e) = engine
                            .execute_trigger_url(url.clone(), Arc::clone(&trigger), event, tries + 1)
                            .await
                        {
                            tracing::error!(
                                integration = %trigger.name,
                                url = %url,
                                error = %e,
                                "retried trigger url execution failed"
                            );
                        }
                    });
                } else {
                    let mut update = HistoryUpdate::new(&trigger, HistoryStep::TooManyRetries);
                    update.history_id = Some(history_id);
                    update.error = true;
                    self.record(update).await;
                }
            } else {
                let mut update =
                    HistoryUpdate::new(&trigger, HistoryStep::FailedAndNotConfiguredToRetry);
                update.history_id = Some(history_id);
                update.error = true;
                self.record(update).await;
            }

            return;
        }

        // Success with content: a response body carrying text/attachments
        // is posted back as a new message.
        if let Some(parsed) = parsed {
            let postable = parsed.get("text").is_some_and(value_is_truthy)
                || parsed.get("attachments").is_some_and(value_is_truthy);
            if !postable {
                return;
            }

            let draft: MessageDraft = serde_json::from_value(parsed.clone()).unwrap_or_default();
            let response_payload = payload_from_response(Some(&parsed));

            let sent = self
                .inner
                .dispatcher
                .send(&trigger, None, event.room.as_ref(), draft, &response_payload)
                .await;

            let mut update = match sent {
                Some(sent) => {
                    let mut update = HistoryUpdate::new(&trigger, HistoryStep::UrlResponseSentMessage);
                    update.sent_message = Some(sent);
                    update
                }
                None => HistoryUpdate::new(&trigger, HistoryStep::AfterHttpCallSendMessageFailed),
            };
            update.history_id = Some(history_id);
            update.finished = true;
            self.record(update).await;
        }
    }

    /// Record an audit update; audit loss never aborts an attempt.
    pub(crate) async fn record(&self, update: HistoryUpdate) -> String {
        match self.inner.history.record(update).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "failed to record integration history");
                String::new()
            }
        }
    }

    /// One-shot audit record for terminal states reached before the
    /// history correlation id exists.
    async fn record_terminal(&self, trigger: &OutgoingIntegration, step: HistoryStep, error: bool) {
        let mut update = HistoryUpdate::new(trigger, step);
        update.error = error;
        update.finished = true;
        self.record(update).await;
    }
}

/// Impersonation context derived from a parsed webhook response: the
/// post-HTTP sends look up the acting user by the response's `user_name`.
fn payload_from_response(parsed: Option<&Value>) -> OutgoingPayload {
    let mut payload = OutgoingPayload::default();
    if let Some(user_name) = parsed
        .and_then(|p| p.get("user_name"))
        .and_then(|v| v.as_str())
    {
        payload.user_name = Some(user_name.to_string());
    }
    payload
}
