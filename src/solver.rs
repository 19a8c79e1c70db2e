// Gemini `generateContent` client for solving the drawn expression.
//
// One POST per solve, authenticated with an API key in the query string.
// The image travels inline as base64 PNG next to a fixed instruction prompt.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SolveError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub const SOLVE_PROMPT: &str = "You are given a handwritten mathematical expression as an image.
1. First, transcribe the handwritten expression into clear mathematical notation.
2. Then solve it step by step, showing only the essential calculations.
3. Finally, provide the final numeric answer in a separate line prefixed with \"Final Answer:\".
Do not add explanations, context, or commentary. Only output math steps and the final result.";

/// Anything that can turn a PNG of the drawing into solution text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, api_key: &str, image_png: &[u8]) -> Result<String, SolveError>;
}

pub struct GeminiClient {
    pub base_url: String,
    pub model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: Option<&str>, model: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, api_key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        )
    }
}

// --- request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Image { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

impl GenerateRequest {
    /// Prompt text plus the inline PNG, with low-temperature sampling.
    pub fn for_image(image_png: &[u8]) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: SOLVE_PROMPT.to_string() },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: STANDARD.encode(image_png),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                top_k: 32,
                top_p: 1.0,
                max_output_tokens: 2048,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
/// Any other shape, or an empty text, means no solution.
pub fn extract_solution(body: &str) -> Result<String, SolveError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|_| SolveError::NoSolution)?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.is_empty())
        .ok_or(SolveError::NoSolution)
}

/// Map a non-success response onto an error, keeping `error.message` if the
/// body has one.
pub fn status_error(status: u16, body: &str) -> SolveError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message);
    SolveError::Http { status, message }
}

/// The request URL carries the API key; drop it before the text is shown anywhere.
fn transport_error(e: reqwest::Error) -> SolveError {
    SolveError::Transport(e.without_url().to_string())
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn generate(&self, api_key: &str, image_png: &[u8]) -> Result<String, SolveError> {
        let body = GenerateRequest::for_image(image_png);
        debug!(model = %self.model, image_bytes = image_png.len(), "Calling Gemini generateContent");

        let response = self
            .client
            .post(self.endpoint(api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(transport_error)?;

        if !status.is_success() {
            warn!(%status, "Gemini API error");
            return Err(status_error(status.as_u16(), &text));
        }

        extract_solution(&text)
    }
}
