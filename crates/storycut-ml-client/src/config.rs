//! Model client configuration.

/// Configuration for the HTTP model client.
#[derive(Debug, Clone)]
pub struct MlConfig {
    /// Base URL of the OpenAI-compatible endpoint
    pub endpoint: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Model used for story planning
    pub plan_model: String,
    /// Model used for frame description
    pub vision_model: String,
    /// Model used for transcription
    pub transcribe_model: String,
    /// Sampling temperature for plan generation
    pub plan_temperature: f64,
    /// Per-request timeout in seconds
    pub request_timeout_s: u64,
    /// Concurrent in-flight requests to the endpoint
    pub concurrency_limit: usize,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            api_key: String::new(),
            plan_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            transcribe_model: "whisper-1".to_string(),
            plan_temperature: 0.3,
            request_timeout_s: 120,
            concurrency_limit: 4,
        }
    }
}

impl MlConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("MODEL_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: std::env::var("MODEL_API_KEY").unwrap_or_default(),
            plan_model: std::env::var("MODEL_PLAN").unwrap_or(defaults.plan_model),
            vision_model: std::env::var("MODEL_VISION").unwrap_or(defaults.vision_model),
            transcribe_model: std::env::var("MODEL_TRANSCRIBE")
                .unwrap_or(defaults.transcribe_model),
            plan_temperature: std::env::var("MODEL_PLAN_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.plan_temperature),
            request_timeout_s: std::env::var("MODEL_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_timeout_s),
            concurrency_limit: std::env::var("MODEL_CONCURRENCY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.concurrency_limit),
        }
    }
}
