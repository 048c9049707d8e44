//! HTTP client for an OpenAI-compatible model endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use storycut_models::{Frame, RawPlan, TokenUsage, Transcript, TranscriptSegment, Word};

use crate::config::MlConfig;
use crate::error::{MlError, MlResult};
use crate::traits::{DescribeFrames, GeneratePlan, Transcribe};

/// Client implementing all three capability traits against one endpoint.
/// Concurrency to the endpoint is bounded by a shared semaphore so a busy
/// worker pool respects the provider's rate limits.
#[derive(Clone)]
pub struct HttpModelClient {
    config: MlConfig,
    client: Client,
    permits: Arc<Semaphore>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f64,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    words: Vec<VerboseWord>,
}

#[derive(Debug, Deserialize)]
struct VerboseWord {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    probability: Option<f64>,
}

// ---------------------------------------------------------------------------

impl HttpModelClient {
    pub fn new(config: MlConfig) -> MlResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()?;
        let permits = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
        Ok(Self {
            config,
            client,
            permits,
        })
    }

    pub fn from_env() -> MlResult<Self> {
        Self::new(MlConfig::from_env())
    }

    async fn post_chat(&self, request: &ChatRequest) -> MlResult<ChatResponse> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MlError::config("model client shut down"))?;

        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(MlError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await.map_err(map_transport_error)?)
    }
}

fn map_transport_error(e: reqwest::Error) -> MlError {
    if e.is_timeout() {
        MlError::Timeout
    } else {
        MlError::Http(e)
    }
}

/// Strip an optional markdown code fence around a JSON payload.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[async_trait]
impl GeneratePlan for HttpModelClient {
    async fn generate_plan(&self, prompt: &str) -> MlResult<(RawPlan, TokenUsage)> {
        let request = ChatRequest {
            model: self.config.plan_model.clone(),
            temperature: self.config.plan_temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: serde_json::Value::String(prompt.to_string()),
            }],
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
            max_tokens: None,
        };

        let response = self.post_chat(&request).await?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| MlError::PlanParse("no choices in response".to_string()))?;

        let raw: RawPlan = serde_json::from_str(strip_fences(content))
            .map_err(|e| MlError::PlanParse(e.to_string()))?;

        let usage = response.usage.unwrap_or_default();
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            edl_len = raw.edl.len(),
            "plan generated"
        );

        Ok((
            raw,
            TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
        ))
    }
}

#[async_trait]
impl Transcribe for HttpModelClient {
    async fn transcribe(&self, audio_wav: Vec<u8>) -> MlResult<Transcript> {
        if audio_wav.is_empty() {
            return Ok(Transcript::empty());
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MlError::config("model client shut down"))?;

        let part = reqwest::multipart::Part::bytes(audio_wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| MlError::config(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcribe_model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");

        let url = format!("{}/v1/audio/transcriptions", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(MlError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let verbose: VerboseTranscription = response.json().await.map_err(map_transport_error)?;
        Ok(into_transcript(verbose))
    }
}

/// Convert the wire transcription into the domain transcript, enforcing
/// segment ordering and dropping degenerate entries.
fn into_transcript(verbose: VerboseTranscription) -> Transcript {
    let mut segments: Vec<TranscriptSegment> = verbose
        .segments
        .into_iter()
        .filter(|s| s.end > s.start)
        .map(|s| TranscriptSegment {
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
            confidence: s.confidence,
            words: s
                .words
                .into_iter()
                .filter(|w| w.end > w.start)
                .map(|w| Word {
                    word: w.word,
                    start: w.start,
                    end: w.end,
                    probability: w.probability,
                })
                .collect(),
        })
        .collect();

    segments.sort_by(|a, b| a.start.partial_cmp(&b.start).expect("finite timestamps"));

    // Adjacent segments may touch but not overlap
    let mut prev_end = 0.0f64;
    for seg in &mut segments {
        if seg.start < prev_end {
            seg.start = prev_end;
        }
        prev_end = seg.end.max(prev_end);
    }
    segments.retain(|s| s.end > s.start);

    Transcript {
        segments,
        language: verbose.language,
    }
}

#[async_trait]
impl DescribeFrames for HttpModelClient {
    async fn describe_frames(&self, frames: &[(f64, Vec<u8>)]) -> MlResult<Vec<Frame>> {
        let mut described = Vec::with_capacity(frames.len());

        for (t, jpeg) in frames {
            let data_url = format!(
                "data:image/jpeg;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(jpeg)
            );
            let request = ChatRequest {
                model: self.config.vision_model.clone(),
                temperature: 0.2,
                messages: vec![ChatMessage {
                    role: "user".to_string(),
                    content: serde_json::json!([
                        {
                            "type": "text",
                            "text": "Describe this video frame in one short sentence. \
                                     Mention people, actions and setting."
                        },
                        {"type": "image_url", "image_url": {"url": data_url}}
                    ]),
                }],
                response_format: None,
                max_tokens: Some(80),
            };

            match self.post_chat(&request).await {
                Ok(response) => {
                    let description = response
                        .choices
                        .first()
                        .map(|c| c.message.content.trim().to_string())
                        .unwrap_or_default();
                    described.push(Frame {
                        t: *t,
                        description,
                        confidence: None,
                    });
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    // A single bad frame should not sink the batch
                    warn!(t = t, error = %e, "frame description failed, skipping");
                }
            }
        }

        Ok(described)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(endpoint: &str) -> HttpModelClient {
        HttpModelClient::new(MlConfig {
            endpoint: endpoint.to_string(),
            api_key: "test-key".to_string(),
            request_timeout_s: 5,
            ..MlConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn strip_fences_variants() {
        assert_eq!(strip_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn into_transcript_sorts_and_clips_overlap() {
        let verbose = VerboseTranscription {
            language: "en".to_string(),
            segments: vec![
                VerboseSegment {
                    start: 5.0,
                    end: 8.0,
                    text: "second".to_string(),
                    confidence: None,
                    words: vec![],
                },
                VerboseSegment {
                    start: 0.0,
                    end: 5.5,
                    text: "first".to_string(),
                    confidence: None,
                    words: vec![],
                },
                VerboseSegment {
                    start: 9.0,
                    end: 9.0,
                    text: "degenerate".to_string(),
                    confidence: None,
                    words: vec![],
                },
            ],
        };
        let transcript = into_transcript(verbose);
        assert_eq!(transcript.segments.len(), 2);
        assert!(transcript.check_invariants(100.0).is_ok());
        assert_eq!(transcript.segments[1].start, 5.5);
    }

    #[tokio::test]
    async fn generate_plan_parses_fenced_json_and_usage() {
        let server = MockServer::start().await;
        let content = "```json\n{\"edl\":[{\"start\":0.0,\"end\":10.0,\"kind\":\"keep\"}]}\n```";
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}],
                "usage": {"prompt_tokens": 1200, "completion_tokens": 80}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let (raw, usage) = client.generate_plan("plan it").await.unwrap();
        assert_eq!(raw.edl.len(), 1);
        assert_eq!(raw.edl[0].kind, "keep");
        assert_eq!(usage.prompt_tokens, 1200);
        assert_eq!(usage.completion_tokens, 80);
    }

    #[tokio::test]
    async fn generate_plan_surfaces_parse_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "not json at all"}}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.generate_plan("plan it").await.unwrap_err();
        assert!(matches!(err, MlError::PlanParse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_is_typed_and_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.generate_plan("plan it").await.unwrap_err();
        assert!(matches!(err, MlError::RateLimited));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn transcribe_parses_verbose_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "language": "en",
                "segments": [
                    {"start": 0.0, "end": 2.5, "text": " hello world ",
                     "words": [{"word": "hello", "start": 0.0, "end": 1.0},
                               {"word": "world", "start": 1.0, "end": 2.5}]}
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let transcript = client.transcribe(vec![0u8; 64]).await.unwrap();
        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].text, "hello world");
        assert_eq!(transcript.segments[0].words.len(), 2);
    }

    #[tokio::test]
    async fn empty_audio_short_circuits_to_empty_transcript() {
        let client = test_client("http://localhost:1");
        let transcript = client.transcribe(Vec::new()).await.unwrap();
        assert!(transcript.is_empty());
    }
}
