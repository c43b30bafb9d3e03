use super::{load_prompt, parse_and_persist, reuse_cached_payload};
use crate::cache::{find_valid_artifact, AUDIO_EXTENSIONS};
use crate::config::Config;
use crate::context::{EpisodeContext, TtsPlan};
use crate::llm::TextGenerator;
use crate::media::SpeechSynthesizer;
use crate::stage::Stage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Plans the narration chunks (`tts_plan.json`), then synthesizes any chunk
/// whose audio artifact is not already valid on disk.
pub struct VoiceOverStage {
    config: Arc<Config>,
    text: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
}

impl VoiceOverStage {
    pub fn new(
        config: Arc<Config>,
        text: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            config,
            text,
            speech,
        }
    }

    async fn plan(&self, ctx: &EpisodeContext, script: &str) -> Result<Option<TtsPlan>> {
        if let Some(plan) = reuse_cached_payload::<TtsPlan>(&ctx.tts_plan_path()) {
            return Ok(Some(plan));
        }

        let system_prompt = load_prompt(&self.config, "voice_over_agent.md")?;

        let input = serde_json::json!({
            "metadata": {
                "title": ctx.brief.title,
                "series": ctx.brief.series,
            },
            "script_full_text": script,
            "structure": serde_json::to_value(&ctx.structure)?,
        });
        let input_str = serde_json::to_string_pretty(&input)?;

        let response = self
            .text
            .generate(
                &system_prompt,
                &format!("Create a TTS plan based on this script and structure:\n{input_str}"),
            )
            .await?;

        parse_and_persist(
            self.name(),
            &response,
            &ctx.tts_plan_path(),
            &ctx.root.join("tts_plan_error.txt"),
        )
    }
}

#[async_trait]
impl Stage for VoiceOverStage {
    fn name(&self) -> &'static str {
        "Voice-Over Stage"
    }

    async fn run(&self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        let script = match (&ctx.script, &ctx.structure) {
            (Some(script), Some(_)) => script.clone(),
            _ => {
                warn!("Missing script or structure for Voice-Over stage");
                return Ok(ctx);
            }
        };

        let Some(mut plan) = self.plan(&ctx, &script).await? else {
            return Ok(ctx);
        };

        // Execution phase: every chunk gets a real file, reusing whatever the
        // cache guard accepts.
        let audio_dir = ctx.audio_dir();
        fs::create_dir_all(&audio_dir)
            .with_context(|| format!("Failed to create {}", audio_dir.display()))?;

        let pb = ProgressBar::new(plan.audio_chunks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        for chunk in plan.audio_chunks.iter_mut() {
            let (Some(text), Some(output_file)) = (chunk.text.clone(), chunk.output_file.clone())
            else {
                pb.inc(1);
                continue;
            };

            // The plan may carry paths like "audio/seg_01.wav"; only the file
            // name is trusted.
            let filename = match Path::new(&output_file).file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => output_file.clone(),
            };

            let out_path = audio_dir.join(&filename);
            let base = out_path.with_extension("");

            let final_path = match find_valid_artifact(&base, AUDIO_EXTENSIONS) {
                Some(existing) => existing,
                None => self.speech.synthesize(&text, &out_path).await?,
            };

            chunk.absolute_path = Some(final_path);
            pb.inc(1);
        }
        pb.finish_and_clear();

        ctx.tts_plan = Some(plan);
        Ok(ctx)
    }
}
