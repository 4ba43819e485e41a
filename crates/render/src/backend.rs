use std::time::Duration;

use crate::scene_data::SceneData;

/// Fence value for one GPU submission. `SubmissionId::NONE` is always complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SubmissionId(pub u64);

impl SubmissionId {
    pub const NONE: SubmissionId = SubmissionId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// One progressive sample dispatched against a committed scene version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracePass {
    pub scene_version: u64,
    /// Samples already in the accumulation target before this pass.
    pub sample_index: u32,
    /// Clear the accumulation target before writing this sample.
    pub reset: bool,
    pub seed: u32,
}

/// Errors reported by a render backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("scene version {0} is not resident on the device")]
    UnknownScene(u64),
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("timed out waiting for the device")]
    Timeout,
    #[error("device lost: {0}")]
    DeviceLost(String),
    #[error("out of device memory")]
    OutOfMemory,
}

impl BackendError {
    /// Whether the engine can keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SurfaceLost | Self::Timeout | Self::UnknownScene(_))
    }
}

/// Device-side interface used by the GPU scene and pathtracing systems.
///
/// Submissions are asynchronous: a returned [`SubmissionId`] is only a promise.
/// Callers must observe completion through [`is_complete`](Self::is_complete)
/// or [`wait`](Self::wait) before overwriting anything the device may read.
pub trait RenderBackend {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Create a new, version-scoped scene allocation and upload `scene` into it.
    fn upload_scene(&mut self, scene: &SceneData) -> Result<SubmissionId, BackendError>;

    /// Mark a scene allocation as superseded. It is freed once every submission
    /// that read it has completed.
    fn retire_scene(&mut self, version: u64);

    /// Dispatch one sample into the accumulation target.
    fn trace(&mut self, pass: &TracePass) -> Result<SubmissionId, BackendError>;

    /// Resolve the accumulation target to the display image and present it.
    fn present(&mut self) -> Result<(), BackendError>;

    /// Resize the accumulation target and display surface.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError>;

    /// Non-blocking completion check.
    fn is_complete(&mut self, id: SubmissionId) -> bool;

    /// Block for at most `timeout`. Returns whether `id` completed.
    fn wait(&mut self, id: SubmissionId, timeout: Duration) -> Result<bool, BackendError>;

    /// Block until every submission has completed.
    fn wait_idle(&mut self) -> Result<(), BackendError>;

    /// Submissions not yet observed complete.
    fn in_flight(&self) -> usize;

    /// Scene allocations currently held, including retired ones awaiting reclamation.
    fn resident_scenes(&self) -> usize;
}
