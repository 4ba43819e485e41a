use pathtracer_assets::AssetSystem;
use pathtracer_engine::{FrameContext, System, SystemError, SystemId};
use pathtracer_motion::{DemoSystem, MovementSystem};
use pathtracer_render::{RenderBackend, SubmissionId};

use crate::build::{derive_scene, SceneError};

/// Summary of the scene version readers may trace against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedScene {
    pub version: u64,
    pub triangles: usize,
    pub nodes: usize,
    pub materials: usize,
}

#[derive(Debug, Clone, Copy)]
struct PendingScene {
    scene: CommittedScene,
    upload: SubmissionId,
}

/// Keeps the device-resident scene in step with assets and transforms.
///
/// Every update compares the asset store revision and the world revision
/// with the pair the current build was derived from. When either moved, the
/// complete scene is derived again and uploaded into a fresh allocation
/// under the next version. That version becomes visible through
/// [`current`](Self::current) only once its upload has completed; until then
/// readers keep using the previous committed version.
#[derive(Debug, Default)]
pub struct GpuSceneSystem {
    observed: Option<(u64, u64)>,
    version: u64,
    pending: Option<PendingScene>,
    committed: Option<CommittedScene>,
    last_problems: Vec<SceneError>,
    rebuilds: u64,
}

impl GpuSceneSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest version built, committed or not.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Scene readers may use this frame.
    pub fn current(&self) -> Option<&CommittedScene> {
        self.committed.as_ref()
    }

    pub fn committed_version(&self) -> Option<u64> {
        self.committed.map(|c| c.version)
    }

    pub fn pending_version(&self) -> Option<u64> {
        self.pending.map(|p| p.scene.version)
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    fn commit(&mut self, gpu: &mut dyn RenderBackend, pending: PendingScene) {
        if let Some(old) = self.committed.replace(pending.scene) {
            gpu.retire_scene(old.version);
        }
        self.pending = None;
        tracing::debug!(version = pending.scene.version, "scene committed");
    }

    fn try_commit(&mut self, ctx: &mut FrameContext<'_>, wait: bool) -> Result<(), SystemError> {
        let Some(pending) = self.pending else {
            return Ok(());
        };
        let done = if wait {
            ctx.gpu.wait(pending.upload, ctx.config.gpu_wait_budget())?
        } else {
            ctx.gpu.is_complete(pending.upload)
        };
        if done {
            self.commit(ctx.gpu, pending);
        }
        Ok(())
    }

    fn rebuild(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        let store = ctx.systems.get::<AssetSystem>().map(|a| a.store());
        let version = self.version + 1;
        let _span = tracing::info_span!("scene_rebuild", version).entered();

        let build = derive_scene(store, ctx.world, version);
        if build.problems != self.last_problems {
            for problem in &build.problems {
                ctx.warn(problem.to_string());
            }
            self.last_problems = build.problems.clone();
        }

        let upload = ctx.gpu.upload_scene(&build.data)?;
        self.version = version;
        self.rebuilds += 1;

        let scene = CommittedScene {
            version,
            triangles: build.data.triangles.len(),
            nodes: build.data.nodes.len(),
            materials: build.data.materials.len(),
        };
        // A build that never got committed is superseded outright.
        if let Some(stale) = self.pending.replace(PendingScene { scene, upload }) {
            ctx.gpu.retire_scene(stale.scene.version);
        }
        tracing::info!(
            version,
            triangles = scene.triangles,
            nodes = scene.nodes,
            max_depth = build.stats.max_depth,
            bytes = build.data.byte_size(),
            "scene uploaded"
        );
        Ok(())
    }
}

impl System for GpuSceneSystem {
    fn dependencies(&self) -> Vec<SystemId> {
        vec![
            SystemId::of::<AssetSystem>(),
            SystemId::of::<DemoSystem>(),
            SystemId::of::<MovementSystem>(),
        ]
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        self.try_commit(ctx, false)?;

        let asset_revision = ctx
            .systems
            .get::<AssetSystem>()
            .map(|a| a.store().revision())
            .unwrap_or(0);
        let inputs = (asset_revision, ctx.world.revision());
        if self.observed != Some(inputs) {
            self.rebuild(ctx)?;
            self.observed = Some(inputs);
        }

        // Bounded wait so a fresh upload is usually visible this frame.
        self.try_commit(ctx, true)
    }

    fn shutdown(&mut self, gpu: &mut dyn RenderBackend) {
        if let Some(pending) = self.pending.take() {
            gpu.retire_scene(pending.scene.version);
        }
        if let Some(committed) = self.committed.take() {
            gpu.retire_scene(committed.version);
        }
    }
}
