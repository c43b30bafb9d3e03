use super::load_prompt;
use crate::config::Config;
use crate::context::EpisodeContext;
use crate::llm::TextGenerator;
use crate::stage::Stage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::warn;
use std::fs;
use std::sync::Arc;

/// Reviews the finished episode data and writes a free-text report
/// (`qa_report.md`). Terminal: nothing downstream consumes the report.
pub struct QaStage {
    config: Arc<Config>,
    text: Arc<dyn TextGenerator>,
}

impl QaStage {
    pub fn new(config: Arc<Config>, text: Arc<dyn TextGenerator>) -> Self {
        Self { config, text }
    }
}

#[async_trait]
impl Stage for QaStage {
    fn name(&self) -> &'static str {
        "QA Stage"
    }

    async fn run(&self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        let (script, structure) = match (&ctx.script, &ctx.structure) {
            (Some(s), Some(st)) => (s.clone(), st.clone()),
            _ => {
                warn!("Missing script or structure for QA stage");
                return Ok(ctx);
            }
        };

        let system_prompt = load_prompt(&self.config, "qa_agent.md")?;

        let input = serde_json::json!({
            "brief": serde_json::to_value(&ctx.brief)?,
            "script": script,
            "structure": structure,
        });
        let input_str = serde_json::to_string_pretty(&input)?;

        let response = self
            .text
            .generate(
                &system_prompt,
                &format!("Review this episode data and produce a QA report:\n{input_str}"),
            )
            .await?;

        let report_path = ctx.qa_report_path();
        fs::write(&report_path, &response)
            .with_context(|| format!("Failed to write {}", report_path.display()))?;
        ctx.qa_report = Some(response);

        Ok(ctx)
    }
}
