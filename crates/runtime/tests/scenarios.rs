//! End-to-end runs of the composed engine on the headless backend.

use std::fs;
use std::path::Path;

use glam::Vec3;
use pathtracer_assets::AssetSystem;
use pathtracer_engine::{EngineBuilder, EngineConfig, ScriptedEvents, Window, WindowConfig};
use pathtracer_motion::{DemoScript, Keyframe, Track};
use pathtracer_pathtrace::PathtracingSystem;
use pathtracer_render::{BackendEvent, HeadlessBackend, RenderBackend};
use pathtracer_runtime::{full_engine, minimal_engine, status_line, SceneBootstrap, CAMERA_NAME};
use pathtracer_scene::GpuSceneSystem;

const DT: f32 = 1.0 / 60.0;

fn write_mesh(dir: &Path, name: &str, offset: f32) {
    let mesh = serde_json::json!({
        "positions": [[offset, 0.0, 0.0], [offset + 1.0, 0.0, 0.0], [offset, 1.0, 0.0]],
        "indices": [0, 1, 2],
    });
    fs::write(dir.join(name), mesh.to_string()).unwrap();
}

fn position_of(events: &[BackendEvent], pred: impl Fn(&BackendEvent) -> bool) -> usize {
    events.iter().position(pred).expect("event not journaled")
}

#[test]
fn zero_systems_start_and_quit() {
    let engine = EngineBuilder::new()
        .build(Box::new(HeadlessBackend::new(64, 64)))
        .unwrap();
    let mut window = Window::new(
        WindowConfig::new("empty", 64, 64),
        ScriptedEvents::idle(3),
        engine,
    );
    window.start().unwrap();
    assert!(window.engine().is_shut_down());
    assert_eq!(window.engine().frame(), 3);
}

#[test]
fn partial_asset_failure_advances_scene_once() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..9 {
        write_mesh(dir.path(), &format!("mesh_{i}.mesh.json"), i as f32 * 2.0);
    }
    fs::write(dir.path().join("broken.mesh.json"), "{ not json").unwrap();

    let mut engine = full_engine(EngineConfig::default(), None, None)
        .build(Box::new(HeadlessBackend::new(32, 32)))
        .unwrap();
    engine.frame_step(DT).unwrap();
    let before = engine.system::<GpuSceneSystem>().unwrap().version();

    let report = engine
        .system_mut::<AssetSystem>()
        .unwrap()
        .load_from(dir.path())
        .unwrap();
    assert_eq!(report.added.len(), 9);
    assert_eq!(report.failures.len(), 1);

    for _ in 0..5 {
        engine.frame_step(DT).unwrap();
    }

    let store = engine.system::<AssetSystem>().unwrap().store();
    let handles: Vec<_> = store.mesh_names().filter_map(|n| store.lookup(n)).collect();
    assert_eq!(handles.len(), 9);
    assert!(handles.iter().all(|h| store.get_mesh(*h).is_some()));
    assert_eq!(store.failures().count(), 1);

    let scene = engine.system::<GpuSceneSystem>().unwrap();
    assert_eq!(scene.version(), before + 1);
    assert_eq!(scene.current().unwrap().triangles, 9);
    assert_eq!(engine.diagnostics().from_system("AssetSystem").count(), 1);
    assert!(engine.world().find(CAMERA_NAME).is_some());
}

#[test]
fn close_waits_for_in_flight_trace() {
    let dir = tempfile::tempdir().unwrap();
    write_mesh(dir.path(), "tri.mesh.json", 0.0);

    let backend = HeadlessBackend::new(32, 32).with_latency(3);
    let journal = backend.journal();
    let engine = minimal_engine(EngineConfig::default(), Some(dir.path()))
        .with_system(SceneBootstrap::new())
        .order::<SceneBootstrap, GpuSceneSystem>()
        .build(Box::new(backend))
        .unwrap();

    let mut window = Window::new(WindowConfig::default(), ScriptedEvents::idle(1), engine);
    window.start().unwrap();

    let events = journal.events();
    let traced = events
        .iter()
        .find_map(|e| match e {
            BackendEvent::Traced { id, .. } => Some(*id),
            _ => None,
        })
        .expect("one trace submitted");
    let completed = position_of(&events, |e| *e == BackendEvent::Completed { id: traced });
    let idle = position_of(&events, |e| *e == BackendEvent::Idle);
    let retired = position_of(&events, |e| matches!(e, BackendEvent::SceneRetired { .. }));
    assert!(completed < idle);
    assert!(idle < retired);
    assert_eq!(window.engine().backend().in_flight(), 0);
    assert_eq!(window.engine().backend().resident_scenes(), 0);
}

#[test]
fn stalled_device_still_tears_down() {
    let backend = HeadlessBackend::new(16, 16).with_latency(2);
    let journal = backend.journal();
    let control = backend.control();
    let mut engine = minimal_engine(EngineConfig::default(), None)
        .build(Box::new(backend))
        .unwrap();
    engine.frame_step(DT).unwrap();

    control.stall();
    engine.shutdown();
    assert!(engine.is_shut_down());
    assert_eq!(journal.count(|e| *e == BackendEvent::Idle), 0);
    assert!(engine.frame_step(DT).is_err());
}

#[test]
fn demo_camera_resets_accumulation_once_per_version() {
    let dir = tempfile::tempdir().unwrap();
    write_mesh(dir.path(), "tri.mesh.json", 0.0);

    let script = DemoScript {
        tracks: vec![Track {
            entity: CAMERA_NAME.into(),
            start: 0.0,
            looping: false,
            keyframes: vec![
                Keyframe {
                    time: 0.0,
                    position: Vec3::new(0.0, 1.0, 6.0),
                    rotation: None,
                    look_at: Some(Vec3::ZERO),
                },
                Keyframe {
                    time: 0.5,
                    position: Vec3::new(6.0, 1.0, 0.0),
                    rotation: None,
                    look_at: Some(Vec3::ZERO),
                },
            ],
        }],
    };
    let config = EngineConfig {
        target_samples: 1000,
        ..EngineConfig::default()
    };
    let backend = HeadlessBackend::new(16, 16);
    let journal = backend.journal();
    let mut engine = full_engine(config, Some(dir.path()), Some(script))
        .build(Box::new(backend))
        .unwrap();

    for _ in 0..60 {
        engine.frame_step(DT).unwrap();
    }

    let mut versions = Vec::new();
    let mut resets = 0;
    for event in journal.events() {
        if let BackendEvent::Traced {
            scene_version,
            reset,
            ..
        } = event
        {
            if versions.last() != Some(&scene_version) {
                assert!(reset, "first sample of version {scene_version} must reset");
                versions.push(scene_version);
            } else {
                assert!(!reset, "second reset within version {scene_version}");
            }
            resets += reset as usize;
        }
    }
    assert!(versions.len() > 2);
    assert_eq!(resets, versions.len());

    // After the track ends the scene is stable and samples accumulate.
    let tracer = engine.system::<PathtracingSystem>().unwrap();
    assert_eq!(tracer.reset_count() as usize, versions.len());
    assert!(tracer.samples() > 10);
    assert_eq!(engine.diagnostics().total(), 0);
}

#[test]
fn window_title_shows_progress() {
    let dir = tempfile::tempdir().unwrap();
    write_mesh(dir.path(), "tri.mesh.json", 0.0);
    let config = EngineConfig {
        frame_stats_window: 2,
        ..EngineConfig::default()
    };
    let engine = full_engine(config, Some(dir.path()), None)
        .build(Box::new(HeadlessBackend::new(16, 16)))
        .unwrap();
    let mut window = Window::new(
        WindowConfig::new("pathtracer", 16, 16),
        ScriptedEvents::idle(4),
        engine,
    )
    .with_status(status_line);
    window.start().unwrap();

    let titles = window.platform().titles();
    assert_eq!(titles.len(), 2);
    assert!(titles[0].starts_with("pathtracer | scene v1 | "));
    assert!(titles[1].contains("4 spp"));
}
