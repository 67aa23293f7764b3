//! Script engine used when an integration carries no transform scripts.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::ScriptError;
use crate::payload::OutgoingPayload;
use crate::traits::{ResponseOutcome, ScriptEngine};
use crate::types::{HttpCallResponse, OutgoingIntegration, OutgoingRequest};

/// The no-scripting engine: prepares the standard POST request carrying
/// the mapped payload as its body, and leaves response handling to the
/// executor's default status classification.
pub struct DefaultScriptEngine;

#[async_trait]
impl ScriptEngine for DefaultScriptEngine {
    async fn prepare_outgoing_request(
        &self,
        _integration: &OutgoingIntegration,
        data: &OutgoingPayload,
        url: &str,
        _history_id: &str,
    ) -> Result<Option<OutgoingRequest>, ScriptError> {
        let body = serde_json::to_value(data)
            .map_err(|e| ScriptError::new(format!("failed to serialize payload: {e}")))?;

        Ok(Some(OutgoingRequest {
            url: Some(url.to_string()),
            method: Some("POST".to_string()),
            headers: BTreeMap::from([("User-Agent".to_string(), "Hookgate".to_string())]),
            data: Some(body),
            auth: None,
            timeout_ms: None,
            message: None,
        }))
    }

    async fn process_outgoing_response(
        &self,
        _integration: &OutgoingIntegration,
        _request: &OutgoingRequest,
        _response: &HttpCallResponse,
        _content: &str,
        _history_id: &str,
    ) -> Result<ResponseOutcome, ScriptError> {
        Ok(ResponseOutcome::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::types::RetryDelay;

    fn integration() -> OutgoingIntegration {
        OutgoingIntegration {
            id: "i1".into(),
            name: "test".into(),
            enabled: true,
            event: EventKind::SendMessage,
            channel: vec![],
            urls: vec![],
            username: "bot".into(),
            token: "tok".into(),
            alias: None,
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

    #[tokio::test]
    async fn prepare_builds_standard_post() {
        let engine = DefaultScriptEngine;
        let payload = OutgoingPayload::new("tok");

        let prepared = engine
            .prepare_outgoing_request(&integration(), &payload, "https://example.test/hook", "h1")
            .await
            .expect("prepare")
            .expect("some request");

        assert_eq!(prepared.url.as_deref(), Some("https://example.test/hook"));
        assert_eq!(prepared.method.as_deref(), Some("POST"));
        assert_eq!(prepared.headers.get("User-Agent").map(String::as_str), Some("Hookgate"));
        let body = prepared.data.expect("body");
        assert_eq!(body["token"], "tok");
    }

    #[tokio::test]
    async fn process_defers_to_default_handling() {
        let engine = DefaultScriptEngine;
        let response = HttpCallResponse {
            status: 200,
            headers: Default::default(),
            body: "{}".into(),
        };
        let outcome = engine
            .process_outgoing_response(
                &integration(),
                &OutgoingRequest::default(),
                &response,
                "{}",
                "h1",
            )
            .await
            .expect("process");
        assert!(matches!(outcome, ResponseOutcome::Default));
    }
}
