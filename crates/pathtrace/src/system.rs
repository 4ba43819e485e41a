use pathtracer_engine::{FrameContext, RenderContext, System, SystemError, SystemId};
use pathtracer_render::{RenderBackend, TracePass};
use pathtracer_scene::GpuSceneSystem;

use crate::sample::{AccumulationState, SampleBuffer};

/// Accumulates one sample per frame against the committed scene version.
#[derive(Debug, Default)]
pub struct PathtracingSystem {
    buffer: SampleBuffer,
    state: AccumulationState,
    reset_pending: bool,
    resets: u64,
    skipped: u64,
}

impl PathtracingSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AccumulationState {
        self.state
    }

    pub fn samples(&self) -> u32 {
        self.buffer.samples()
    }

    pub fn scene_version(&self) -> Option<u64> {
        self.buffer.scene_version()
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Times the accumulation target was cleared.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    /// Frames that submitted nothing because the previous trace was still
    /// running after the wait budget.
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    /// Clear accumulation before the next sample even if the scene is unchanged.
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    fn seed(version: u64, sample: u32) -> u32 {
        (version as u32).wrapping_mul(0x9E37_79B9) ^ sample.wrapping_mul(0x85EB_CA6B)
    }

    /// Whether the previous trace has finished writing the target, waiting at
    /// most the configured budget.
    fn target_free(&mut self, ctx: &mut RenderContext<'_>) -> Result<bool, SystemError> {
        let last = self.buffer.last_write();
        if ctx.gpu.is_complete(last) {
            return Ok(true);
        }
        Ok(ctx.gpu.wait(last, ctx.config.gpu_wait_budget())?)
    }
}

impl System for PathtracingSystem {
    fn dependencies(&self) -> Vec<SystemId> {
        vec![SystemId::of::<GpuSceneSystem>()]
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        if let Some((width, height)) = ctx.input.resized() {
            tracing::debug!(width, height, "accumulation reset for resize");
            self.reset_pending = true;
        }
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), SystemError> {
        let Some(scene) = ctx.systems.require::<GpuSceneSystem>()?.current().copied() else {
            self.state = AccumulationState::Idle;
            return Ok(());
        };
        let reset = self.reset_pending || self.buffer.is_stale(scene.version);
        if !reset && self.state == AccumulationState::Converged && !ctx.config.keep_accumulating {
            return Ok(());
        }

        if !self.target_free(ctx)? {
            self.skipped += 1;
            tracing::debug!(
                version = scene.version,
                skipped = self.skipped,
                "previous trace still running; skipping frame"
            );
            return Ok(());
        }

        if reset {
            self.buffer.reset(scene.version);
            self.reset_pending = false;
            self.resets += 1;
            self.state = AccumulationState::Accumulating;
            tracing::debug!(version = scene.version, "accumulation reset");
        }

        let pass = TracePass {
            scene_version: scene.version,
            sample_index: self.buffer.samples(),
            reset,
            seed: Self::seed(scene.version, self.buffer.samples()),
        };
        let write = ctx.gpu.trace(&pass)?;
        self.buffer.record(write);

        if self.buffer.samples() >= ctx.config.target_samples
            && self.state != AccumulationState::Converged
        {
            self.state = AccumulationState::Converged;
            tracing::info!(
                version = scene.version,
                samples = self.buffer.samples(),
                "accumulation converged"
            );
        }
        Ok(())
    }

    fn shutdown(&mut self, _gpu: &mut dyn RenderBackend) {
        tracing::debug!(
            samples = self.buffer.samples(),
            resets = self.resets,
            skipped = self.skipped,
            "pathtracer stopped"
        );
    }
}
