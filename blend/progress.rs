use std::fmt;

/// Stages reported during a quiz blending run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendStage {
    LoadPredictions,
    Solve,
    WriteOutput,
}

impl BlendStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::LoadPredictions => "prediction file loading",
            Self::Solve => "ridge regression solve",
            Self::WriteOutput => "blended prediction output",
        }
    }
}

impl fmt::Display for BlendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress while blending. `total` and
/// `processed` count predictors for [`BlendStage::LoadPredictions`] and are zero
/// for the other stages.
pub trait BlendProgressObserver {
    fn on_stage_start(&mut self, stage: BlendStage, total: usize) {
        let _ = (stage, total);
    }
    fn on_stage_advance(&mut self, stage: BlendStage, processed: usize, label: &str) {
        let _ = (stage, processed, label);
    }
    fn on_stage_finish(&mut self, stage: BlendStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopBlendProgress;

impl BlendProgressObserver for NoopBlendProgress {}
