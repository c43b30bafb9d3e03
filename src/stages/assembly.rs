use super::{load_prompt, parse_and_persist, reuse_cached_payload};
use crate::config::Config;
use crate::context::{EpisodeContext, Timeline};
use crate::llm::TextGenerator;
use crate::stage::Stage;
use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// Folds structure, image prompts and the TTS plan into the render-ready
/// timeline (`timeline.json`). Whether the timeline actually has a video
/// track is checked by the renderer, not here.
pub struct AssemblyStage {
    config: Arc<Config>,
    text: Arc<dyn TextGenerator>,
}

impl AssemblyStage {
    pub fn new(config: Arc<Config>, text: Arc<dyn TextGenerator>) -> Self {
        Self { config, text }
    }
}

#[async_trait]
impl Stage for AssemblyStage {
    fn name(&self) -> &'static str {
        "Video Assembly Stage"
    }

    async fn run(&self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        let (structure, image_prompts, tts_plan) =
            match (&ctx.structure, &ctx.image_prompts, &ctx.tts_plan) {
                (Some(s), Some(i), Some(t)) => (s.clone(), i.clone(), t.clone()),
                _ => {
                    warn!("Missing upstream data for Assembly stage");
                    return Ok(ctx);
                }
            };

        if let Some(timeline) = reuse_cached_payload::<Timeline>(&ctx.timeline_path()) {
            ctx.timeline = Some(timeline);
            return Ok(ctx);
        }

        let system_prompt = load_prompt(&self.config, "video_assembly_agent.md")?;

        let input = serde_json::json!({
            "structure": structure,
            "image_prompts": image_prompts,
            "tts_plan": tts_plan,
        });
        let input_str = serde_json::to_string_pretty(&input)?;

        let response = self
            .text
            .generate(
                &system_prompt,
                &format!("Create a video timeline plan:\n{input_str}"),
            )
            .await?;

        ctx.timeline = parse_and_persist(
            self.name(),
            &response,
            &ctx.timeline_path(),
            &ctx.root.join("timeline_error.txt"),
        )?;

        Ok(ctx)
    }
}
