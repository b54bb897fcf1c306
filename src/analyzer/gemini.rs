//! Google Gemini analyzer (Files API upload + generateContent).

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::{DocumentAnalyzer, GenerationOptions};
use crate::error::PipelineError;

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Gemini client. Holds only the HTTP client and static settings, so one
/// instance is shared by every request.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiClient {
    /// Validate the credential and base URL and build the HTTP client.
    pub fn initialize(api_key: &str, model: &str, api_base: &str) -> Result<Self, PipelineError> {
        if api_key.trim().is_empty() {
            return Err(PipelineError::configuration("Gemini API key is empty"));
        }
        if model.trim().is_empty() {
            return Err(PipelineError::configuration("Gemini model name is empty"));
        }
        reqwest::Url::parse(api_base).map_err(|e| {
            PipelineError::configuration(format!("Invalid Gemini API base {:?}: {}", api_base, e))
        })?;

        let client = Client::builder().build().map_err(|e| {
            PipelineError::configuration(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Upload a local file through the resumable Files API protocol.
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read staged file {:?}", path))?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        info!(
            "Gemini: uploading {} ({} bytes) to Files API",
            display_name,
            data.len()
        );

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.api_base))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&StartUploadRequest {
                file: FileMetadata {
                    display_name: &display_name,
                },
            })
            .send()
            .await
            .context("Failed to start upload to Gemini")?;

        if !start.status().is_success() {
            return Err(api_error(start).await);
        }

        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Gemini upload response is missing {}", UPLOAD_URL_HEADER))?;

        let resp = self
            .client
            .post(&upload_url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await
            .context("Failed to upload file bytes to Gemini")?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let upload: UploadResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini upload response")?;

        if upload.file.state.as_deref() == Some("FAILED") {
            anyhow::bail!("Gemini could not process file {}", upload.file.name);
        }

        info!("Gemini: uploaded {} ({})", upload.file.name, upload.file.uri);
        Ok(upload.file)
    }

    async fn generate(
        &self,
        file: &RemoteFile,
        fallback_mime: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::FileData {
                        file_data: FileData {
                            mime_type: file
                                .mime_type
                                .clone()
                                .unwrap_or_else(|| fallback_mime.to_string()),
                            file_uri: file.uri.clone(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
            },
        };

        debug!(
            "Sending generateContent: model={}, prompt={} chars",
            self.model,
            prompt.len()
        );

        let resp = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.api_base, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let response: GenerateContentResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        if let Some(usage) = &response.usage_metadata {
            info!(
                "Gemini response: {} tokens (prompt: {}, completion: {})",
                usage.total_token_count, usage.prompt_token_count, usage.candidates_token_count
            );
        }

        response.into_text()
    }
}

#[async_trait::async_trait]
impl DocumentAnalyzer for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn analyze(
        &self,
        file: &Path,
        mime_type: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, PipelineError> {
        let run = async {
            let remote = self.upload_file(file, mime_type).await?;
            self.generate(&remote, mime_type, prompt, options).await
        };
        run.await
            .map_err(|e| PipelineError::analysis(format!("{:#}", e)))
    }
}

async fn api_error(resp: Response) -> anyhow::Error {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|b| b.error.message)
        .unwrap_or(text);
    anyhow!("Gemini API error ({}): {}", status, message)
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct StartUploadRequest<'a> {
    file: FileMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    FileData { file_data: FileData },
}

#[derive(Debug, Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    /// Join the text parts of the first candidate. No text at all means the
    /// response is unusable.
    fn into_text(self) -> Result<String> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(match block_reason {
                Some(reason) => anyhow!("Gemini blocked the prompt: {}", reason),
                None => anyhow!("Gemini returned no candidates"),
            });
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            anyhow::bail!(
                "Gemini returned no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            );
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
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
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
