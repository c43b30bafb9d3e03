use crate::context::EpisodeContext;
use anyhow::Result;
use async_trait::async_trait;
use log::error;

/// One ordered step of the pipeline. A stage that finds its required upstream
/// fields missing logs a warning and returns the context unchanged; an `Err`
/// is reserved for unexpected faults (I/O, exhausted retry budgets) and stops
/// the whole run.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: EpisodeContext) -> Result<EpisodeContext>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Runs stages in order, threading each stage's returned context into the
/// next. No rollback on failure: whatever completed stages persisted stays on
/// disk, which is what makes re-runs resumable.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    statuses: Vec<StageStatus>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let statuses = vec![StageStatus::Pending; stages.len()];
        Self { stages, statuses }
    }

    pub async fn run(&mut self, mut ctx: EpisodeContext) -> Result<EpisodeContext> {
        for (i, stage) in self.stages.iter().enumerate() {
            self.statuses[i] = StageStatus::Running;
            println!("--- Starting {} ---", stage.name());

            match stage.run(ctx).await {
                Ok(next) => {
                    self.statuses[i] = StageStatus::Completed;
                    ctx = next;
                }
                Err(e) => {
                    self.statuses[i] = StageStatus::Failed;
                    error!("CRITICAL ERROR in {}: {:#}", stage.name(), e);
                    return Err(e.context(format!("stage {} failed", stage.name())));
                }
            }
        }
        Ok(ctx)
    }

    pub fn statuses(&self) -> Vec<(&'static str, StageStatus)> {
        self.stages
            .iter()
            .map(|s| s.name())
            .zip(self.statuses.iter().copied())
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.statuses
            .iter()
            .all(|s| *s == StageStatus::Completed)
    }
}
