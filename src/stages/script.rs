use super::load_prompt;
use crate::config::Config;
use crate::context::EpisodeContext;
use crate::llm::TextGenerator;
use crate::stage::Stage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::fs;
use std::sync::Arc;

/// The one sanctioned default in the whole context model.
const DEFAULT_SERIES: &str = "Power, Empires & Diplomacy";

/// Turns the episode brief into the full voice-over script (`script.md`).
pub struct ScriptStage {
    config: Arc<Config>,
    text: Arc<dyn TextGenerator>,
}

impl ScriptStage {
    pub fn new(config: Arc<Config>, text: Arc<dyn TextGenerator>) -> Self {
        Self { config, text }
    }
}

#[async_trait]
impl Stage for ScriptStage {
    fn name(&self) -> &'static str {
        "Script Stage"
    }

    async fn run(&self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        if ctx.brief.series.is_none() {
            warn!("No 'series' found in brief. Defaulting to '{DEFAULT_SERIES}'");
            ctx.brief.series = Some(DEFAULT_SERIES.to_string());
        }

        let script_path = ctx.script_path();
        if let Ok(existing) = fs::read_to_string(&script_path) {
            if !existing.trim().is_empty() {
                info!("Reusing existing {}", script_path.display());
                ctx.script = Some(existing);
                return Ok(ctx);
            }
        }

        let system_prompt = load_prompt(&self.config, "script_writer_global.md")?;
        let brief_str = ctx.brief.to_yaml()?;

        let script = self
            .text
            .generate(
                &system_prompt,
                &format!("Here is the episode brief:\n{brief_str}"),
            )
            .await?;

        fs::write(&script_path, &script)
            .with_context(|| format!("Failed to write {}", script_path.display()))?;
        ctx.script = Some(script);

        Ok(ctx)
    }
}
