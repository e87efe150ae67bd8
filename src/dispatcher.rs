//! Performs one request/response cycle and classifies its outcome.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Request};
use std::error::Error;

use crate::config::LoadTestConfig;
use crate::outcome::{OutcomeCategory, OutcomeCounter, OutcomeEvent};
use crate::run_state::RunState;
use crate::util;
use crate::LoadTestError;

/// Sends the configured request, sharing one client and its connection pool across
/// all workers.
#[derive(Debug)]
pub struct RequestDispatcher {
    client: Client,
    method: reqwest::Method,
    url: String,
    headers: Vec<String>,
    body: Vec<u8>,
}
impl RequestDispatcher {
    /// Build the shared client.
    ///
    /// The connect timeout bounds both establishing the connection and the request as a
    /// whole. Certificate verification is only disabled for HTTPS URLs with `insecure`
    /// set.
    pub fn new(configuration: &LoadTestConfig) -> Result<Self, LoadTestError> {
        let mut builder = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(configuration.connect_timeout)
            .timeout(configuration.connect_timeout);
        if configuration.skips_certificate_verification() {
            info!("skipping certificate verification");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(RequestDispatcher {
            client: builder.build()?,
            method: configuration.method.into(),
            url: configuration.url.clone(),
            headers: configuration.headers.clone(),
            body: configuration.body.clone(),
        })
    }

    /// Build a fresh request from the configuration.
    fn build_request(&self) -> Result<Request, LoadTestError> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = util::split_header(header).ok_or_else(|| {
                LoadTestError::InvalidRequest {
                    detail: format!("invalid header {}, expected key:value", header),
                }
            })?;
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                LoadTestError::InvalidRequest {
                    detail: format!("invalid header name {}: {}", key, e),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| LoadTestError::InvalidRequest {
                detail: format!("invalid value for header {}: {}", key, e),
            })?;
            // Replaces any earlier value, the last one configured wins.
            headers.insert(name, value);
        }

        let mut request_builder = self
            .client
            .request(self.method.clone(), self.url.as_str())
            .headers(headers);
        if !self.body.is_empty() {
            request_builder = request_builder.body(self.body.clone());
        }
        request_builder
            .build()
            .map_err(|e| LoadTestError::InvalidRequest {
                detail: error_message(&e),
            })
    }

    /// Make one request, record its outcome, and return it.
    ///
    /// Transport failures and non-200 responses are outcomes, not errors. The only
    /// error is a request that can't be built, in which case nothing is recorded.
    pub async fn dispatch(
        &self,
        run_state: &RunState,
        outcomes: &OutcomeCounter,
    ) -> Result<OutcomeEvent, LoadTestError> {
        let request = self.build_request()?;

        let event = match self.client.execute(request).await {
            Ok(response) => {
                let event = OutcomeEvent::from_status(response.status());
                // Read the whole body so the connection can be reused.
                if let Err(e) = response.bytes().await {
                    debug!("failed to read response body: {}", e);
                }
                event
            }
            Err(e) => OutcomeEvent::new(error_message(&e), OutcomeCategory::Transport),
        };

        if event.category.is_error() {
            run_state.increment_errors();
        }
        outcomes.record_outcome(&event.label, event.category);
        trace!("{} {}: {}", self.method, self.url, event.label);

        Ok(event)
    }
}

/// Flatten an error and its sources into one line, reqwest's own message alone rarely
/// says what went wrong.
fn error_message(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        // Some layers repeat the message of the error they wrap.
        if !message.ends_with(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
