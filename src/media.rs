use crate::config::Config;
use crate::retry::{is_rate_limited, retry_with_backoff, RetryPolicy};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Produces one image artifact for a prompt. The returned path is where the
/// bytes actually landed; the extension may differ from the requested target
/// when the backend picks a different MIME type.
#[async_trait]
pub trait ImageGenerator: Send + Sync + Debug {
    async fn generate(&self, prompt_text: &str, target: &Path) -> Result<PathBuf>;
}

/// Same contract for narration audio chunks.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + Debug {
    async fn synthesize(&self, text: &str, target: &Path) -> Result<PathBuf>;
}

pub fn create_image_generator(config: &Config) -> Result<Box<dyn ImageGenerator>> {
    if config.runtime.mock_mode {
        return Ok(Box::new(MockImageGenerator));
    }

    let api_key = config
        .google
        .api_key
        .as_deref()
        .context("google.api_key missing in settings (required unless runtime.mock_mode is set)")?;

    Ok(Box::new(GeminiImageClient {
        api_key: api_key.to_string(),
        model: config.models.image_main.clone(),
        retry: RetryPolicy::from_config(&config.retry),
        client: reqwest::Client::new(),
    }))
}

pub fn create_speech_synthesizer(config: &Config) -> Result<Box<dyn SpeechSynthesizer>> {
    if config.runtime.mock_mode {
        return Ok(Box::new(MockSpeechSynthesizer));
    }

    let api_key = config
        .google
        .api_key
        .as_deref()
        .context("google.api_key missing in settings (required unless runtime.mock_mode is set)")?;

    Ok(Box::new(GeminiTtsClient {
        api_key: api_key.to_string(),
        model: config.models.tts_model.clone(),
        voice_name: config.tts.voice_name.clone(),
        retry: RetryPolicy::from_config(&config.retry),
        client: reqwest::Client::new(),
    }))
}

/// Maps a backend MIME type to the extension the artifact should carry.
fn extension_for_mime(mime_type: &str, fallback: &str) -> String {
    let essence = mime_type.split(';').next().unwrap_or(mime_type).trim();
    match essence {
        "image/png" => "png".to_string(),
        "image/jpeg" => "jpg".to_string(),
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav".to_string(),
        "audio/mpeg" | "audio/mp3" => "mp3".to_string(),
        _ => fallback.to_string(),
    }
}

/// Swaps the target's extension when the backend returned a different format.
fn resolve_output_path(target: &Path, mime_type: &str, fallback_ext: &str) -> PathBuf {
    let ext = extension_for_mime(mime_type, fallback_ext);
    let current = target
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    if current.as_deref() == Some(ext.as_str()) {
        target.to_path_buf()
    } else {
        target.with_extension(ext)
    }
}

// --- Gemini inline-data plumbing ---

#[derive(Deserialize)]
struct MediaResponse {
    candidates: Option<Vec<MediaCandidate>>,
    error: Option<MediaError>,
}

#[derive(Deserialize)]
struct MediaCandidate {
    content: Option<MediaContent>,
}

#[derive(Deserialize)]
struct MediaContent {
    #[serde(default)]
    parts: Vec<MediaPart>,
}

#[derive(Deserialize)]
struct MediaPart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct MediaError {
    message: String,
}

async fn fetch_inline_data(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<(Vec<u8>, String)> {
    let resp = client.post(url).json(body).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let error_text = resp.text().await?;
        return Err(anyhow!("Gemini API error ({}): {}", status, error_text));
    }

    let result: MediaResponse = resp.json().await?;

    if let Some(err) = result.error {
        return Err(anyhow!("Gemini API returned error: {}", err.message));
    }

    let inline = result
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or_else(|| anyhow!("No media bytes found in response."))?;

    let bytes = BASE64
        .decode(inline.data.as_bytes())
        .context("Failed to decode inline media data")?;
    Ok((bytes, inline.mime_type))
}

// --- Gemini image generation ---

#[derive(Debug)]
pub struct GeminiImageClient {
    api_key: String,
    model: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiImageClient {
    async fn call_once(&self, prompt_text: &str, target: &Path) -> Result<PathBuf> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt_text}]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {"imageSize": "1K"}
            }
        });

        let (bytes, mime_type) = fetch_inline_data(&self.client, &url, &body).await?;
        let out_path = resolve_output_path(target, &mime_type, "png");
        fs::write(&out_path, &bytes)
            .with_context(|| format!("Failed to write image {}", out_path.display()))?;
        Ok(out_path)
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    async fn generate(&self, prompt_text: &str, target: &Path) -> Result<PathBuf> {
        retry_with_backoff(self.retry, "generate_image", is_rate_limited, || {
            self.call_once(prompt_text, target)
        })
        .await
    }
}

// --- Gemini speech synthesis ---

#[derive(Debug)]
pub struct GeminiTtsClient {
    api_key: String,
    model: String,
    voice_name: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiTtsClient {
    async fn call_once(&self, text: &str, target: &Path) -> Result<PathBuf> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": text}]
            }],
            "generationConfig": {
                "temperature": 1,
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": {"voiceName": self.voice_name}
                    }
                }
            }
        });

        let (bytes, mime_type) = fetch_inline_data(&self.client, &url, &body).await?;
        let out_path = resolve_output_path(target, &mime_type, "wav");
        fs::write(&out_path, &bytes)
            .with_context(|| format!("Failed to write audio {}", out_path.display()))?;
        Ok(out_path)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiTtsClient {
    async fn synthesize(&self, text: &str, target: &Path) -> Result<PathBuf> {
        retry_with_backoff(self.retry, "synthesize_speech", is_rate_limited, || {
            self.call_once(text, target)
        })
        .await
    }
}

// --- Mocks ---

/// Placeholder artifacts are padded past the cache guard's validity threshold
/// so mock runs exercise the reuse path instead of regenerating every time.
const MOCK_ARTIFACT_BYTES: usize = 2048;

#[derive(Debug)]
pub struct MockImageGenerator;

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, _prompt_text: &str, target: &Path) -> Result<PathBuf> {
        let mut data = b"Mock Image Data\n".repeat(MOCK_ARTIFACT_BYTES / 16);
        data.resize(MOCK_ARTIFACT_BYTES, b'\n');
        fs::write(target, data)
            .with_context(|| format!("Failed to write mock image {}", target.display()))?;
        Ok(target.to_path_buf())
    }
}

#[derive(Debug)]
pub struct MockSpeechSynthesizer;

#[async_trait]
impl SpeechSynthesizer for MockSpeechSynthesizer {
    async fn synthesize(&self, _text: &str, target: &Path) -> Result<PathBuf> {
        let mut data = b"Mock Audio Data\n".repeat(MOCK_ARTIFACT_BYTES / 16);
        data.resize(MOCK_ARTIFACT_BYTES, b'\n');
        fs::write(target, data)
            .with_context(|| format!("Failed to write mock audio {}", target.display()))?;
        Ok(target.to_path_buf())
    }
}
