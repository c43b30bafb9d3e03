use crate::config::Config;
use crate::retry::{is_rate_limited, retry_with_backoff, RetryPolicy};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[async_trait]
pub trait TextGenerator: Send + Sync + Debug {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

pub fn create_text_generator(config: &Config) -> Result<Box<dyn TextGenerator>> {
    if config.runtime.mock_mode {
        return Ok(Box::new(MockTextGenerator));
    }

    let api_key = config
        .google
        .api_key
        .as_deref()
        .context("google.api_key missing in settings (required unless runtime.mock_mode is set)")?;

    Ok(Box::new(GeminiTextClient::new(
        api_key,
        &config.models.text_main,
        RetryPolicy::from_config(&config.retry),
    )))
}

// --- Gemini ---

#[derive(Debug)]
pub struct GeminiTextClient {
    api_key: String,
    model: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiTextClient {
    pub fn new(api_key: &str, model: &str, retry: RetryPolicy) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            retry,
            client: reqwest::Client::new(),
        }
    }

    async fn call_once(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: user.to_string(),
                }],
            }],
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: system.to_string(),
                }],
            }),
            generation_config: Some(GeminiGenerationConfig { temperature: 0.7 }),
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error ({}): {}", status, error_text));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = serde_json::from_str(&response_text).map_err(|e| {
            anyhow!(
                "Failed to parse Gemini response: {}. Body: {}",
                e,
                response_text
            )
        })?;

        if let Some(err) = result.error {
            return Err(anyhow!("Gemini API returned error: {}", err.message));
        }

        if let Some(candidates) = result.candidates {
            if let Some(first) = candidates.first() {
                if let Some(content) = &first.content {
                    if let Some(part) = content.parts.first() {
                        return Ok(part.text.clone());
                    }
                }

                let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
                return Err(anyhow!("Gemini response empty. Finish reason: {}", reason));
            }
        }

        Err(anyhow!(
            "Gemini response format unexpected or empty. Body: {}",
            response_text
        ))
    }
}

#[async_trait]
impl TextGenerator for GeminiTextClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        retry_with_backoff(self.retry, "generate_text", is_rate_limited, || {
            self.call_once(system_prompt, user_prompt)
        })
        .await
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f64,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

// --- Mock ---

/// Deterministic stand-in used when `runtime.mock_mode` is set, so the whole
/// pipeline can run offline. Responses are keyed off markers in the system
/// prompt, the same way the prompt files identify their stage.
#[derive(Debug)]
pub struct MockTextGenerator;

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, system_prompt: &str, _user_prompt: &str) -> Result<String> {
        if system_prompt.contains("Structure & Timing") {
            return Ok(serde_json::json!({
                "episode_id": "mock_id",
                "target_duration_minutes": 15,
                "total_estimated_minutes": 14.5,
                "segments": [{
                    "id": "seg_01",
                    "type": "hook",
                    "start_time_sec": 0.0,
                    "end_time_sec": 10.0,
                    "narration_ref": {"from_paragraph_index": 0, "to_paragraph_index": 1},
                    "visual_slots": [{
                        "slot_id": "seg_01_shot_01",
                        "start_time_sec": 0.0,
                        "end_time_sec": 10.0,
                        "visual_concept": "Wide shot",
                        "priority": "must_have"
                    }]
                }],
                "ad_break_suggestions": [],
                "notes_for_next_agents": ["Mock structure"]
            })
            .to_string());
        }
        if system_prompt.contains("Image Prompt") {
            return Ok(serde_json::json!({
                "episode_id": "mock_id",
                "image_prompts": [{
                    "slot_id": "seg_01_shot_01",
                    "segment_id": "seg_01",
                    "start_time_sec": 0.0,
                    "end_time_sec": 10.0,
                    "prompt_text": "A wide shot of Uruk.",
                    "safety_notes": "None"
                }]
            })
            .to_string());
        }
        if system_prompt.contains("Voice-Over") {
            return Ok(serde_json::json!({
                "episode_id": "mock_id",
                "voice_profile": {"engine": "google-tts", "default_voice": "Charon"},
                "audio_chunks": [{
                    "chunk_id": "aud_seg_01",
                    "segment_id": "seg_01",
                    "text": "This is Uruk.",
                    "output_file": "audio/seg_01.wav"
                }]
            })
            .to_string());
        }
        if system_prompt.contains("Video Assembly") {
            return Ok(serde_json::json!({
                "episode_id": "mock_id",
                "frame_rate": 30,
                "tracks": {
                    "video": [{
                        "slot_id": "seg_01_shot_01",
                        "image_file": "assets/images/seg_01_shot_01.png",
                        "start_time_sec": 0.0,
                        "end_time_sec": 10.0,
                        "transition_in": "fade",
                        "transition_out": "cut"
                    }],
                    "audio": [{
                        "chunk_id": "aud_seg_01",
                        "audio_file": "assets/audio/seg_01.wav",
                        "start_time_sec": 0.0,
                        "end_time_sec": 10.0
                    }]
                }
            })
            .to_string());
        }
        if system_prompt.contains("QA") {
            return Ok("# QA Report\nMock report.".to_string());
        }

        Ok("[1] EPISODE METADATA\n- Title: Mock Episode\n\n[3] FULL VOICE-OVER SCRIPT\nThis is a mock script.\n".to_string())
    }
}
