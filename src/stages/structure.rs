use super::{load_prompt, parse_and_persist, reuse_cached_payload};
use crate::config::Config;
use crate::context::{EpisodeContext, Structure};
use crate::llm::TextGenerator;
use crate::stage::Stage;
use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// Breaks the script into timed segments and visual slots
/// (`structure.json`).
pub struct StructureStage {
    config: Arc<Config>,
    text: Arc<dyn TextGenerator>,
}

impl StructureStage {
    pub fn new(config: Arc<Config>, text: Arc<dyn TextGenerator>) -> Self {
        Self { config, text }
    }
}

#[async_trait]
impl Stage for StructureStage {
    fn name(&self) -> &'static str {
        "Structure & Timing Stage"
    }

    async fn run(&self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        let Some(script) = ctx.script.clone() else {
            warn!("Missing script for Structure stage");
            return Ok(ctx);
        };

        if let Some(structure) = reuse_cached_payload::<Structure>(&ctx.structure_path()) {
            ctx.structure = Some(structure);
            return Ok(ctx);
        }

        let system_prompt = load_prompt(&self.config, "structure_timing_agent.md")?;

        let input = serde_json::json!({
            "brief": serde_json::to_value(&ctx.brief)?,
            "script_content": script,
        });
        let input_str = serde_json::to_string_pretty(&input)?;

        let response = self
            .text
            .generate(
                &system_prompt,
                &format!("Here is the episode data. Produce the STRUCTURE OBJECT JSON:\n{input_str}"),
            )
            .await?;

        ctx.structure = parse_and_persist(
            self.name(),
            &response,
            &ctx.structure_path(),
            &ctx.root.join("structure_error.txt"),
        )?;

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Brief;
    use anyhow::anyhow;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct ScriptedText {
        response: Mutex<String>,
        calls: AtomicUsize,
    }

    impl ScriptedText {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(response.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedText {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.lock().unwrap().clone())
        }
    }

    #[derive(Debug)]
    struct ExplodingText;

    #[async_trait]
    impl TextGenerator for ExplodingText {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            Err(anyhow!("should not be called"))
        }
    }

    fn config_with_prompt(dir: &std::path::Path) -> Arc<Config> {
        let prompts = dir.join("prompts");
        fs::create_dir_all(&prompts).unwrap();
        fs::write(prompts.join("structure_timing_agent.md"), "Structure & Timing").unwrap();
        Arc::new(Config {
            paths: crate::config::PathsConfig {
                prompts: prompts.to_string_lossy().to_string(),
            },
            ..Default::default()
        })
    }

    fn ctx_with_script(dir: &std::path::Path) -> EpisodeContext {
        let mut ctx = EpisodeContext::new("ep", dir, Brief::default());
        ctx.script = Some("script body".to_string());
        ctx
    }

    #[tokio::test]
    async fn test_missing_script_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let stage = StructureStage::new(config_with_prompt(dir.path()), ScriptedText::new("{}"));

        let ctx = EpisodeContext::new("ep", dir.path(), Brief::default());
        let ctx = stage.run(ctx).await.unwrap();
        assert!(ctx.structure.is_none());
        assert!(!dir.path().join("structure.json").exists());
    }

    #[tokio::test]
    async fn test_valid_response_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let gen = ScriptedText::new(
            "```json\n{\"episode_id\": \"ep\", \"segments\": [{\"id\": \"seg_01\"}]}\n```",
        );
        let stage = StructureStage::new(config_with_prompt(dir.path()), gen.clone());

        let ctx = stage.run(ctx_with_script(dir.path())).await.unwrap();

        let structure = ctx.structure.unwrap();
        assert_eq!(structure.segments.len(), 1);
        assert!(dir.path().join("structure.json").exists());
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_leaves_field_unset() {
        let dir = tempfile::tempdir().unwrap();
        let gen = ScriptedText::new("I refuse to emit JSON");
        let stage = StructureStage::new(config_with_prompt(dir.path()), gen);

        let ctx = stage.run(ctx_with_script(dir.path())).await.unwrap();

        assert!(ctx.structure.is_none());
        assert!(!dir.path().join("structure.json").exists());
        assert!(dir.path().join("structure_error.txt").exists());
    }

    #[tokio::test]
    async fn test_cached_structure_skips_generation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("structure.json"),
            r#"{"episode_id": "cached", "segments": []}"#,
        )
        .unwrap();

        let stage = StructureStage::new(config_with_prompt(dir.path()), Arc::new(ExplodingText));
        let ctx = stage.run(ctx_with_script(dir.path())).await.unwrap();

        assert_eq!(ctx.structure.unwrap().episode_id, "cached");
    }
}
