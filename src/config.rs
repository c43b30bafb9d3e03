use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub google: GoogleConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProjectConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_prompts_dir")]
    pub prompts: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GoogleConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_text_model")]
    pub text_main: String,

    #[serde(default = "default_image_model")]
    pub image_main: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TtsConfig {
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub mock_mode: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_retry_base_delay")]
    pub base_delay_seconds: f64,

    #[serde(default = "default_retry_jitter")]
    pub jitter: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_output_dir() -> String {
    "episodes".to_string()
}
fn default_prompts_dir() -> String {
    "prompts".to_string()
}
fn default_text_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}
fn default_image_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}
fn default_tts_model() -> String {
    "gemini-2.5-pro-preview-tts".to_string()
}
fn default_voice_name() -> String {
    "Charon".to_string()
}
fn default_retry_attempts() -> usize {
    5
}
fn default_retry_base_delay() -> f64 {
    1.0
}
fn default_retry_jitter() -> f64 {
    0.5
}
fn default_frame_rate() -> u32 {
    30
}
fn default_pixel_format() -> String {
    "yuv420p".to_string()
}
fn default_audio_bitrate() -> String {
    "192k".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            prompts: default_prompts_dir(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            text_main: default_text_model(),
            image_main: default_image_model(),
            tts_model: default_tts_model(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice_name: default_voice_name(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_seconds: default_retry_base_delay(),
            jitter: default_retry_jitter(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            pixel_format: default_pixel_format(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}
