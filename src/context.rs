use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Episode brief as authored by the operator. Only the fields the pipeline
/// itself inspects are typed; everything else is carried through verbatim so
/// the full brief reaches the prompts.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Brief {
    pub title: Option<String>,
    pub series: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml_ng::Value>,
}

impl Brief {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read brief {}", path.display()))?;
        let brief: Brief = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse brief {}", path.display()))?;
        Ok(brief)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Structure {
    #[serde(default)]
    pub episode_id: String,
    pub target_duration_minutes: Option<f64>,
    pub total_estimated_minutes: Option<f64>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub ad_break_suggestions: Vec<serde_json::Value>,
    #[serde(default)]
    pub notes_for_next_agents: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Segment {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub segment_type: String,
    #[serde(default)]
    pub start_time_sec: f64,
    #[serde(default)]
    pub end_time_sec: f64,
    pub narration_ref: Option<serde_json::Value>,
    #[serde(default)]
    pub visual_slots: Vec<VisualSlot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct VisualSlot {
    #[serde(default)]
    pub slot_id: String,
    #[serde(default)]
    pub start_time_sec: f64,
    #[serde(default)]
    pub end_time_sec: f64,
    #[serde(default)]
    pub visual_concept: String,
    #[serde(default)]
    pub priority: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ImagePromptSet {
    #[serde(default)]
    pub episode_id: String,
    #[serde(default)]
    pub image_prompts: Vec<ImagePromptSlot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ImagePromptSlot {
    #[serde(default)]
    pub slot_id: String,
    #[serde(default)]
    pub segment_id: String,
    #[serde(default)]
    pub start_time_sec: f64,
    #[serde(default)]
    pub end_time_sec: f64,
    pub prompt_text: Option<String>,
    pub safety_notes: Option<String>,

    /// Filled by the Production stage once the artifact exists on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TtsPlan {
    #[serde(default)]
    pub episode_id: String,
    pub voice_profile: Option<VoiceProfile>,
    #[serde(default)]
    pub audio_chunks: Vec<AudioChunk>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct VoiceProfile {
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub default_voice: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AudioChunk {
    #[serde(default)]
    pub chunk_id: String,
    #[serde(default)]
    pub segment_id: String,
    pub text: Option<String>,
    pub output_file: Option<String>,

    /// Filled by the Voice-Over execution phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Timeline {
    #[serde(default)]
    pub episode_id: String,
    pub frame_rate: Option<u32>,
    #[serde(default)]
    pub tracks: Tracks,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Tracks {
    #[serde(default)]
    pub video: Vec<VideoClip>,
    #[serde(default)]
    pub audio: Vec<AudioClip>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct VideoClip {
    #[serde(default)]
    pub slot_id: String,
    #[serde(default)]
    pub image_file: String,
    #[serde(default)]
    pub start_time_sec: f64,
    #[serde(default)]
    pub end_time_sec: f64,
    pub transition_in: Option<String>,
    pub transition_out: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AudioClip {
    #[serde(default)]
    pub chunk_id: String,
    #[serde(default)]
    pub audio_file: String,
    #[serde(default)]
    pub start_time_sec: f64,
    #[serde(default)]
    pub end_time_sec: f64,
}

/// The single mutable record threaded through the pipeline. Each optional
/// field is populated by exactly one stage; absence of a required upstream
/// field is a precondition failure, never default-filled (the brief's
/// `series` is the one sanctioned exception).
#[derive(Debug, Clone)]
pub struct EpisodeContext {
    pub name: String,
    pub root: PathBuf,
    pub brief: Brief,

    pub script: Option<String>,
    pub structure: Option<Structure>,
    pub image_prompts: Option<ImagePromptSet>,
    pub tts_plan: Option<TtsPlan>,
    pub timeline: Option<Timeline>,
    pub qa_report: Option<String>,
}

impl EpisodeContext {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, brief: Brief) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            brief,
            script: None,
            structure: None,
            image_prompts: None,
            tts_plan: None,
            timeline: None,
            qa_report: None,
        }
    }

    pub fn script_path(&self) -> PathBuf {
        self.root.join("script.md")
    }

    pub fn structure_path(&self) -> PathBuf {
        self.root.join("structure.json")
    }

    pub fn image_prompts_path(&self) -> PathBuf {
        self.root.join("image_prompts.json")
    }

    pub fn tts_plan_path(&self) -> PathBuf {
        self.root.join("tts_plan.json")
    }

    pub fn timeline_path(&self) -> PathBuf {
        self.root.join("timeline.json")
    }

    pub fn qa_report_path(&self) -> PathBuf {
        self.root.join("qa_report.md")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("assets").join("images")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("assets").join("audio")
    }
}
