use pathtracer_render::SubmissionId;

/// Where accumulation stands for the current scene version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationState {
    /// No committed scene to trace yet.
    #[default]
    Idle,
    Accumulating,
    /// Reached the target sample count.
    Converged,
}

/// CPU-side record of the device accumulation target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    scene_version: Option<u64>,
    samples: u32,
    last_write: SubmissionId,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version the accumulated samples belong to.
    pub fn scene_version(&self) -> Option<u64> {
        self.scene_version
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Last submission that wrote the target.
    pub fn last_write(&self) -> SubmissionId {
        self.last_write
    }

    pub fn is_stale(&self, version: u64) -> bool {
        self.scene_version != Some(version)
    }

    /// Forget every sample and re-key the buffer to `version`.
    pub fn reset(&mut self, version: u64) {
        self.scene_version = Some(version);
        self.samples = 0;
    }

    pub fn record(&mut self, write: SubmissionId) {
        self.samples += 1;
        self.last_write = write;
    }
}
