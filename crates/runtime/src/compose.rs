use std::path::Path;

use pathtracer_assets::AssetSystem;
use pathtracer_engine::{Engine, EngineBuilder, EngineConfig};
use pathtracer_motion::{DemoScript, DemoSystem, MovementSystem};
use pathtracer_pathtrace::PathtracingSystem;
use pathtracer_scene::GpuSceneSystem;

use crate::bootstrap::SceneBootstrap;

fn asset_system(assets: Option<&Path>) -> AssetSystem {
    match assets {
        Some(dir) => AssetSystem::with_root(dir),
        None => AssetSystem::new(),
    }
}

/// Every system, declared in the order they initialize.
///
/// The bootstrap runs before anything that reads entities by name, so a demo
/// script can drive the camera it spawns in the same frame.
pub fn full_engine(config: EngineConfig, assets: Option<&Path>, demo: Option<DemoScript>) -> EngineBuilder {
    EngineBuilder::new()
        .with_config(config)
        .with_system(asset_system(assets))
        .with_system(SceneBootstrap::new())
        .with_system(DemoSystem::new(demo.unwrap_or_default()))
        .with_system(MovementSystem::new())
        .with_system(GpuSceneSystem::new())
        .with_system(PathtracingSystem::new())
        .order::<SceneBootstrap, DemoSystem>()
        .order::<SceneBootstrap, GpuSceneSystem>()
}

/// Assets, GPU scene and pathtracer only. Entities come from the caller or
/// from [`bootstrap`](crate::bootstrap).
pub fn minimal_engine(config: EngineConfig, assets: Option<&Path>) -> EngineBuilder {
    EngineBuilder::new()
        .with_config(config)
        .with_system(asset_system(assets))
        .with_system(GpuSceneSystem::new())
        .with_system(PathtracingSystem::new())
}

/// One-line summary of accumulation progress, for window titles and logs.
pub fn status_line(engine: &Engine) -> String {
    let version = engine
        .system::<GpuSceneSystem>()
        .and_then(|scene| scene.committed_version());
    let tracer = engine.system::<PathtracingSystem>();
    match (version, tracer) {
        (Some(version), Some(tracer)) => format!(
            "scene v{version} | {} spp | {:?}",
            tracer.samples(),
            tracer.state()
        ),
        (Some(version), None) => format!("scene v{version}"),
        _ => "no scene".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pathtracer_render::HeadlessBackend;

    use super::*;

    #[test]
    fn full_schedule_commits_scene_before_tracing() {
        let engine = full_engine(EngineConfig::default(), None, None)
            .build(Box::new(HeadlessBackend::new(8, 8)))
            .unwrap();
        assert_eq!(
            engine.schedule_names(),
            [
                "AssetSystem",
                "SceneBootstrap",
                "DemoSystem",
                "MovementSystem",
                "GpuSceneSystem",
                "PathtracingSystem",
            ]
        );
    }

    #[test]
    fn minimal_schedule() {
        let engine = minimal_engine(EngineConfig::default(), None)
            .build(Box::new(HeadlessBackend::new(8, 8)))
            .unwrap();
        assert_eq!(
            engine.schedule_names(),
            ["AssetSystem", "GpuSceneSystem", "PathtracingSystem"]
        );
    }

    #[test]
    fn status_reports_samples() {
        let mut engine = minimal_engine(EngineConfig::default(), None)
            .build(Box::new(HeadlessBackend::new(8, 8)))
            .unwrap();
        assert_eq!(status_line(&engine), "no scene");
        engine.frame_step(0.016).unwrap();
        assert_eq!(status_line(&engine), "scene v1 | 1 spp | Accumulating");
    }
}
