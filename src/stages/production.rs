use crate::cache::{find_valid_artifact, IMAGE_EXTENSIONS};
use crate::context::EpisodeContext;
use crate::media::ImageGenerator;
use crate::stage::Stage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::fs;
use std::sync::Arc;

/// Materializes one image artifact per prompt slot. The filesystem decides
/// what still needs generating: a valid file under `assets/images/` is reused
/// as-is, everything else goes back to the image collaborator.
pub struct ProductionStage {
    images: Arc<dyn ImageGenerator>,
}

impl ProductionStage {
    pub fn new(images: Arc<dyn ImageGenerator>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl Stage for ProductionStage {
    fn name(&self) -> &'static str {
        "Production Stage"
    }

    async fn run(&self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        let Some(mut prompts) = ctx.image_prompts.clone() else {
            warn!("No image prompts found for Production stage");
            return Ok(ctx);
        };

        let img_dir = ctx.images_dir();
        fs::create_dir_all(&img_dir)
            .with_context(|| format!("Failed to create {}", img_dir.display()))?;

        let pb = ProgressBar::new(prompts.image_prompts.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        for (i, slot) in prompts.image_prompts.iter_mut().enumerate() {
            let Some(prompt_text) = slot.prompt_text.clone() else {
                pb.inc(1);
                continue;
            };

            let slot_id = if slot.slot_id.is_empty() {
                i.to_string()
            } else {
                slot.slot_id.clone()
            };

            let base = img_dir.join(&slot_id);
            let final_path = match find_valid_artifact(&base, IMAGE_EXTENSIONS) {
                Some(existing) => existing,
                None => {
                    let target = img_dir.join(format!("{slot_id}.png"));
                    self.images.generate(&prompt_text, &target).await?
                }
            };

            slot.image_path = Some(final_path);
            pb.inc(1);
        }
        pb.finish_and_clear();

        ctx.image_prompts = Some(prompts);
        Ok(ctx)
    }
}
