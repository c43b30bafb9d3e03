use anyhow::Result;
use brief2video::config::Config;
use brief2video::context::{Brief, EpisodeContext};
use brief2video::llm::{create_text_generator, TextGenerator};
use brief2video::media::{
    create_image_generator, create_speech_synthesizer, ImageGenerator, SpeechSynthesizer,
};
use brief2video::render::render_episode;
use brief2video::stage::Pipeline;
use brief2video::stages::{
    AssemblyStage, ImagePromptStage, ProductionStage, QaStage, ScriptStage, StructureStage,
    VoiceOverStage,
};
use clap::Parser;
use log::{error, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "brief2video")]
#[command(about = "Episode brief to rendered video pipeline")]
struct Args {
    /// Path to the episode brief YAML
    #[arg(long)]
    brief: PathBuf,

    /// Internal name for the episode (no spaces)
    #[arg(long)]
    name: String,

    /// Render final video (requires FFmpeg and real assets)
    #[arg(long)]
    render: bool,

    /// Path to the settings file
    #[arg(long, default_value = "config/settings.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = Arc::new(Config::load(&args.config)?);

    let episode_root = Path::new(&config.project.output_dir).join(&args.name);
    fs::create_dir_all(&episode_root)?;

    println!("Initializing Episode: {}", args.name);
    println!("Output Directory: {}", episode_root.display());

    let brief = Brief::load(&args.brief)?;
    let ctx = EpisodeContext::new(args.name.clone(), episode_root.clone(), brief);

    // Collaborators are built once here and injected; stages never look
    // anything up globally.
    let text: Arc<dyn TextGenerator> = Arc::from(create_text_generator(&config)?);
    let images: Arc<dyn ImageGenerator> = Arc::from(create_image_generator(&config)?);
    let speech: Arc<dyn SpeechSynthesizer> = Arc::from(create_speech_synthesizer(&config)?);

    let mut pipeline = Pipeline::new(vec![
        Box::new(ScriptStage::new(config.clone(), text.clone())),
        Box::new(StructureStage::new(config.clone(), text.clone())),
        Box::new(ImagePromptStage::new(config.clone(), text.clone())),
        Box::new(ProductionStage::new(images)),
        Box::new(VoiceOverStage::new(config.clone(), text.clone(), speech)),
        Box::new(AssemblyStage::new(config.clone(), text.clone())),
        Box::new(QaStage::new(config.clone(), text)),
    ]);

    pipeline.run(ctx).await?;

    if args.render {
        if config.runtime.mock_mode {
            warn!("Render requested but mock_mode is TRUE. Assets will be placeholders.");
        }

        println!("\n--- Starting Video Render ---");
        let episodes_dir = Path::new(&config.project.output_dir);
        if let Err(e) = render_episode(&args.name, episodes_dir, &config.render).await {
            // The render phase is optional; its failure never changes the
            // pipeline's exit status.
            error!("Render failed: {:#}", e);
        }
    }

    println!("\n========================================");
    println!("Pipeline Complete!");
    println!("Check {} for results.", episode_root.display());
    println!("========================================");

    Ok(())
}
