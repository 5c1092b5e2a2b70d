//! HTTP generation client
//!
//! Speaks the GenerateContent wire protocol: one POST per buffered attempt,
//! one SSE response per streaming attempt. This is the only module that
//! knows the provider's JSON shapes; everything above it sees
//! [`Completion`]s and [`Fragment`]s.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::provider::sse::SseDecoder;
use crate::provider::{
    Completion, FinishReason, Fragment, FragmentStream, GenerationClient, GenerationRequest,
    ProviderError,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the upstream GenerateContent API.
///
/// Owns its `reqwest::Client` (connection pool) and credential; shared
/// across requests behind an `Arc`. No ambient/global state.
pub struct HttpGenerationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
}

impl HttpGenerationClient {
    /// Build a client for the given provider endpoint.
    ///
    /// `request_timeout` bounds buffered calls only; streaming responses are
    /// open-ended by nature and bounded by the connect timeout plus caller
    /// cancellation.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout,
        })
    }

    fn endpoint(&self, model: &str, streaming: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        let verb = if streaming {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        if base.ends_with("/v1beta") {
            format!("{base}/{model_path}:{verb}")
        } else {
            format!("{base}/v1beta/{model_path}:{verb}")
        }
    }

    fn build_body<'a>(request: &'a GenerationRequest) -> GenerateBody<'a> {
        GenerateBody {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: request.prompt(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature(),
                max_output_tokens: request.max_output_tokens(),
            },
        }
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn call_buffered(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<Completion, ProviderError> {
        let url = self.endpoint(model, false);
        tracing::debug!(model = %model, prompt_length = request.prompt().len(), "Starting buffered call");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport {
                message: err.to_string(),
            })?;

        if !(200..300).contains(&status) {
            return Err(map_error(status, &text));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|err| ProviderError::Decode {
                message: format!("unexpected completion payload: {err}"),
            })?;

        let (text, finish_reason) = extract_completion(parsed)?;
        tracing::debug!(model = %model, response_length = text.len(), "Buffered call completed");
        Ok(Completion {
            text,
            finish_reason,
        })
    }

    async fn call_streaming(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<FragmentStream, ProviderError> {
        let url = self.endpoint(model, true);
        tracing::debug!(model = %model, prompt_length = request.prompt().len(), "Starting streaming call");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            return Err(map_error(status, &text));
        }

        let body = Box::pin(response.bytes_stream());
        Ok(Box::pin(decode_fragments(body)))
    }
}

/// Decode a raw SSE body into [`Fragment`]s.
///
/// The sequence ends after the first `Finished` fragment. A body that ends
/// without one is reported as [`ProviderError::StreamClosed`]: the provider
/// never told us whether the answer was complete.
fn decode_fragments<S, B, E>(body: S) -> impl Stream<Item = Result<Fragment, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct DecodeState<S> {
        body: S,
        decoder: SseDecoder,
        pending: VecDeque<Fragment>,
        eof: bool,
        flushed: bool,
        terminated: bool,
    }

    let state = DecodeState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        eof: false,
        flushed: false,
        terminated: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.pending.pop_front() {
                if matches!(fragment, Fragment::Finished(_)) {
                    st.terminated = true;
                }
                return Some((Ok(fragment), st));
            }
            if st.terminated {
                return None;
            }
            if st.eof {
                if !st.flushed {
                    st.flushed = true;
                    match st.decoder.finish() {
                        Ok(Some(payload)) => {
                            if let Err(err) = enqueue_payload(&payload, &mut st.pending) {
                                st.terminated = true;
                                return Some((Err(err), st));
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            st.terminated = true;
                            return Some((Err(err), st));
                        }
                    }
                    continue;
                }
                // Body ended, everything drained, no finish signal seen.
                st.terminated = true;
                return Some((Err(ProviderError::StreamClosed), st));
            }
            match st.body.next().await {
                Some(Ok(chunk)) => match st.decoder.push(chunk.as_ref()) {
                    Ok(payloads) => {
                        for payload in payloads {
                            if let Err(err) = enqueue_payload(&payload, &mut st.pending) {
                                st.terminated = true;
                                return Some((Err(err), st));
                            }
                        }
                    }
                    Err(err) => {
                        st.terminated = true;
                        return Some((Err(err), st));
                    }
                },
                Some(Err(err)) => {
                    st.terminated = true;
                    return Some((
                        Err(ProviderError::Transport {
                            message: err.to_string(),
                        }),
                        st,
                    ));
                }
                None => st.eof = true,
            }
        }
    })
}

/// Parse one SSE event payload into text/finish fragments.
fn enqueue_payload(
    payload: &str,
    pending: &mut VecDeque<Fragment>,
) -> Result<(), ProviderError> {
    if payload.trim() == "[DONE]" {
        return Ok(());
    }

    let parsed: GenerateResponse =
        serde_json::from_str(payload).map_err(|err| ProviderError::Decode {
            message: format!("unexpected stream payload: {err}"),
        })?;

    for candidate in parsed.candidates {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        pending.push_back(Fragment::Text(text));
                    }
                }
            }
        }
        if let Some(raw) = candidate.finish_reason {
            pending.push_back(Fragment::Finished(map_finish_reason(&raw)));
        }
    }
    Ok(())
}

fn map_finish_reason(raw: &str) -> FinishReason {
    match raw {
        "STOP" => FinishReason::NaturalStop,
        "MAX_TOKENS" => FinishReason::LengthCapped,
        other => {
            tracing::warn!(finish_reason = %other, "Unexpected provider finish reason, treating as natural stop");
            FinishReason::NaturalStop
        }
    }
}

fn extract_completion(response: GenerateResponse) -> Result<(String, FinishReason), ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::EmptyCompletion);
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyCompletion);
    }

    let finish_reason = candidate
        .finish_reason
        .as_deref()
        .map(map_finish_reason)
        .unwrap_or(FinishReason::NaturalStop);

    Ok((text, finish_reason))
}

/// Map a non-2xx provider response to a [`ProviderError`].
///
/// The status string inside the error payload (`RESOURCE_EXHAUSTED`,
/// `UNAVAILABLE`) is honored alongside the HTTP status code because some
/// proxies rewrite one but not the other.
fn map_error(status: u16, body: &str) -> ProviderError {
    let detail: Option<ErrorDetail> = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error);
    let api_status = detail
        .as_ref()
        .and_then(|d| d.status.clone())
        .unwrap_or_default();
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| truncate_body(body));

    if status == 429 || api_status == "RESOURCE_EXHAUSTED" {
        ProviderError::RateLimited { message }
    } else if status == 503 || status == 529 || api_status == "UNAVAILABLE" {
        ProviderError::Overloaded { message }
    } else {
        ProviderError::Api { status, message }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

// Wire shapes. Request and response are deliberately minimal: text in,
// text plus finish reason out.

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    status: Option<String>,
}
