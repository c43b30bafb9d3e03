//! The fixed pipeline stages. Each one reads its required fields from the
//! episode context, talks to a generation collaborator, and writes results
//! back into the context and onto disk.

mod assembly;
mod image_prompt;
mod production;
mod qa;
mod script;
mod structure;
mod voice_over;

pub use assembly::AssemblyStage;
pub use image_prompt::ImagePromptStage;
pub use production::ProductionStage;
pub use qa::QaStage;
pub use script::ScriptStage;
pub use structure::StructureStage;
pub use voice_over::VoiceOverStage;

use crate::config::Config;
use crate::extract::parse_json_payload;
use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Reads a stage's system prompt template from the configured prompt
/// directory. A missing template is an unrecoverable fault, not a skipped
/// stage.
pub(crate) fn load_prompt(config: &Config, name: &str) -> Result<String> {
    let path = Path::new(&config.paths.prompts).join(name);
    fs::read_to_string(&path).with_context(|| format!("Failed to read prompt {}", path.display()))
}

/// Payload-level resume: a readable, well-formed persisted payload is loaded
/// instead of re-invoking generation. Anything unreadable or malformed is
/// ignored and regenerated (the file is overwritten on success).
pub(crate) fn reuse_cached_payload<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<T>(&content) {
        Ok(value) => {
            info!("Reusing existing {}", path.display());
            Some(value)
        }
        Err(e) => {
            warn!("Ignoring unreadable cached payload {}: {}", path.display(), e);
            None
        }
    }
}

/// The extraction/validation protocol shared by every JSON-producing stage:
/// extract and parse the payload, convert it to the stage's record type, and
/// persist the parsed document before anything downstream can observe it.
///
/// Returns `Ok(None)` on a malformed payload: the raw text is saved to
/// `error_path` for offline inspection and the context field stays unset.
/// Only file-write failures escalate as `Err`.
pub(crate) fn parse_and_persist<T: DeserializeOwned>(
    stage_name: &str,
    raw: &str,
    payload_path: &Path,
    error_path: &Path,
) -> Result<Option<T>> {
    let value = match parse_json_payload(raw) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to parse JSON from {}: {:#}", stage_name, e);
            fs::write(error_path, raw)
                .with_context(|| format!("Failed to write {}", error_path.display()))?;
            return Ok(None);
        }
    };

    let typed: T = match serde_json::from_value(value.clone()) {
        Ok(t) => t,
        Err(e) => {
            error!("Unusable payload shape from {}: {}", stage_name, e);
            fs::write(error_path, raw)
                .with_context(|| format!("Failed to write {}", error_path.display()))?;
            return Ok(None);
        }
    };

    let pretty = serde_json::to_string_pretty(&value)?;
    fs::write(payload_path, pretty)
        .with_context(|| format!("Failed to write {}", payload_path.display()))?;

    Ok(Some(typed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Structure;

    #[test]
    fn test_parse_and_persist_success_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("structure.json");
        let error = dir.path().join("structure_error.txt");

        let raw = "```json\n{\"episode_id\": \"ep\", \"segments\": []}\n```";
        let parsed: Option<Structure> =
            parse_and_persist("Structure Stage", raw, &payload, &error).unwrap();

        assert_eq!(parsed.unwrap().episode_id, "ep");
        assert!(payload.exists());
        assert!(!error.exists());

        // The persisted document is the parsed JSON, not the fenced raw text.
        let on_disk = fs::read_to_string(&payload).unwrap();
        assert!(on_disk.trim_start().starts_with('{'));
    }

    #[test]
    fn test_parse_and_persist_failure_saves_raw() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("structure.json");
        let error = dir.path().join("structure_error.txt");

        let parsed: Option<Structure> =
            parse_and_persist("Structure Stage", "not json at all", &payload, &error).unwrap();

        assert!(parsed.is_none());
        assert!(!payload.exists());
        assert_eq!(fs::read_to_string(&error).unwrap(), "not json at all");
    }

    #[test]
    fn test_reuse_cached_payload_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("structure.json");

        assert!(reuse_cached_payload::<Structure>(&path).is_none());

        fs::write(&path, "{broken").unwrap();
        assert!(reuse_cached_payload::<Structure>(&path).is_none());

        fs::write(&path, r#"{"episode_id": "ep"}"#).unwrap();
        assert!(reuse_cached_payload::<Structure>(&path).is_some());
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::context::{Brief, EpisodeContext};
    use crate::llm::{MockTextGenerator, TextGenerator};
    use crate::media::{MockImageGenerator, MockSpeechSynthesizer};
    use crate::stage::Pipeline;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Delegates to the mock backend while counting calls, so resume runs can
    /// assert how much generation actually happened.
    #[derive(Debug)]
    struct CountingText {
        inner: MockTextGenerator,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for CountingText {
        async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.generate(system_prompt, user_prompt).await
        }
    }

    fn write_prompts(dir: &Path) -> Arc<Config> {
        let prompts = dir.join("prompts");
        fs::create_dir_all(&prompts).unwrap();
        fs::write(prompts.join("script_writer_global.md"), "You write scripts.").unwrap();
        fs::write(
            prompts.join("structure_timing_agent.md"),
            "You are the Structure & Timing planner.",
        )
        .unwrap();
        fs::write(prompts.join("image_prompt_agent.md"), "You are the Image Prompt writer.")
            .unwrap();
        fs::write(prompts.join("voice_over_agent.md"), "You are the Voice-Over planner.").unwrap();
        fs::write(
            prompts.join("video_assembly_agent.md"),
            "You are the Video Assembly planner.",
        )
        .unwrap();
        fs::write(prompts.join("qa_agent.md"), "You are the QA reviewer.").unwrap();

        Arc::new(Config {
            paths: crate::config::PathsConfig {
                prompts: prompts.to_string_lossy().to_string(),
            },
            ..Default::default()
        })
    }

    fn full_pipeline(config: Arc<Config>, text: Arc<dyn TextGenerator>) -> Pipeline {
        let images = Arc::new(MockImageGenerator);
        let speech = Arc::new(MockSpeechSynthesizer);
        Pipeline::new(vec![
            Box::new(ScriptStage::new(config.clone(), text.clone())),
            Box::new(StructureStage::new(config.clone(), text.clone())),
            Box::new(ImagePromptStage::new(config.clone(), text.clone())),
            Box::new(ProductionStage::new(images)),
            Box::new(VoiceOverStage::new(config.clone(), text.clone(), speech)),
            Box::new(AssemblyStage::new(config.clone(), text.clone())),
            Box::new(QaStage::new(config, text)),
        ])
    }

    #[tokio::test]
    async fn test_full_pipeline_produces_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ep");
        fs::create_dir_all(&root).unwrap();
        let config = write_prompts(dir.path());

        let text = Arc::new(CountingText {
            inner: MockTextGenerator,
            calls: AtomicUsize::new(0),
        });

        let mut pipeline = full_pipeline(config.clone(), text.clone());
        let ctx = pipeline
            .run(EpisodeContext::new("ep", &root, Brief::default()))
            .await
            .unwrap();

        assert!(pipeline.is_completed());
        assert!(ctx.script.is_some());
        assert!(ctx.structure.is_some());
        assert!(ctx.timeline.is_some());
        assert!(ctx.qa_report.is_some());

        for file in [
            "script.md",
            "structure.json",
            "image_prompts.json",
            "tts_plan.json",
            "timeline.json",
            "qa_report.md",
        ] {
            assert!(root.join(file).exists(), "missing {file}");
        }
        assert!(root.join("assets/images/seg_01_shot_01.png").exists());
        assert!(root.join("assets/audio/seg_01.wav").exists());

        // Script, structure, image prompts, TTS plan, timeline, QA report.
        assert_eq!(text.calls.load(Ordering::SeqCst), 6);

        // Second run over the same root: every persisted payload and artifact
        // is reused; only the QA report is produced fresh.
        let text2 = Arc::new(CountingText {
            inner: MockTextGenerator,
            calls: AtomicUsize::new(0),
        });
        let mut pipeline = full_pipeline(config, text2.clone());
        let ctx = pipeline
            .run(EpisodeContext::new("ep", &root, Brief::default()))
            .await
            .unwrap();

        assert!(pipeline.is_completed());
        assert!(ctx.timeline.is_some());
        assert_eq!(text2.calls.load(Ordering::SeqCst), 1);
    }
}
