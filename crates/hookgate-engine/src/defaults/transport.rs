//! `reqwest`-backed HTTP transport.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::traits::HttpTransport;
use crate::types::{HttpCallRequest, HttpCallResponse};

/// Default transport. The client is built per call because the
/// invalid-cert policy is a per-call argument that may change between an
/// initial attempt and a delayed retry.
pub struct ReqwestTransport;

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn call(
        &self,
        request: HttpCallRequest,
        allow_invalid_certs: bool,
    ) -> Result<HttpCallResponse, TransportError> {
        let mut builder = reqwest::Client::builder();
        if allow_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout_ms) = request.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder.build().map_err(|e| TransportError::Network {
            message: format!("failed to build http client: {e}"),
        })?;

        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            TransportError::Network {
                message: format!("invalid http method {:?}: {e}", request.method),
            }
        })?;

        let mut req = client.request(method, &request.url);
        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    elapsed_ms: request.timeout_ms.unwrap_or_default(),
                }
            } else {
                TransportError::Network {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|value| (k.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| TransportError::Network {
            message: format!("failed to read response body: {e}"),
        })?;

        Ok(HttpCallResponse {
            status,
            headers,
            body,
        })
    }
}
