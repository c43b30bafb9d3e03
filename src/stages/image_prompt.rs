use super::{load_prompt, parse_and_persist, reuse_cached_payload};
use crate::config::Config;
use crate::context::{EpisodeContext, ImagePromptSet};
use crate::llm::TextGenerator;
use crate::stage::Stage;
use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// Expands every visual slot in the structure into a concrete image prompt
/// (`image_prompts.json`).
pub struct ImagePromptStage {
    config: Arc<Config>,
    text: Arc<dyn TextGenerator>,
}

impl ImagePromptStage {
    pub fn new(config: Arc<Config>, text: Arc<dyn TextGenerator>) -> Self {
        Self { config, text }
    }
}

#[async_trait]
impl Stage for ImagePromptStage {
    fn name(&self) -> &'static str {
        "Image Prompt Stage"
    }

    async fn run(&self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        let Some(structure) = ctx.structure.clone() else {
            warn!("No structure found for Image Prompt stage");
            return Ok(ctx);
        };

        if let Some(prompts) = reuse_cached_payload::<ImagePromptSet>(&ctx.image_prompts_path()) {
            ctx.image_prompts = Some(prompts);
            return Ok(ctx);
        }

        let system_prompt = load_prompt(&self.config, "image_prompt_agent.md")?;
        let input_str = serde_json::to_string_pretty(&structure)?;

        let response = self
            .text
            .generate(
                &system_prompt,
                &format!("Generate image prompts for this structure:\n{input_str}"),
            )
            .await?;

        ctx.image_prompts = parse_and_persist(
            self.name(),
            &response,
            &ctx.image_prompts_path(),
            &ctx.root.join("image_prompts_error.txt"),
        )?;

        Ok(ctx)
    }
}
