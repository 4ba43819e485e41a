mod platform;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pathtracer_engine::{Engine, EngineBuilder, EngineConfig, Window, WindowConfig};
use pathtracer_motion::DemoScript;
use pathtracer_render::RenderBackend;
use pathtracer_render_wgpu::{SurfaceTarget, WgpuBackend};
use pathtracer_runtime::{bootstrap, full_engine, minimal_engine, status_line};
use tracing_subscriber::EnvFilter;

use crate::platform::WinitPlatform;

#[derive(Parser)]
#[command(name = "pathtracer-desktop", about = "Progressive GPU pathtracer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Asset directory loaded at startup
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Demo script (JSON keyframe tracks)
    #[arg(long)]
    demo: Option<PathBuf>,

    /// Only the asset, scene and pathtracing systems
    #[arg(long)]
    minimal: bool,

    #[arg(long, default_value = "pathtracer")]
    title: String,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Samples per pixel before accumulation stops
    #[arg(long)]
    target_samples: Option<u32>,
}

enum Failure {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(samples) = cli.target_samples {
        config.target_samples = samples;
    }
    config.validate()?;
    Ok(config)
}

fn composition(cli: &Cli, config: EngineConfig) -> Result<EngineBuilder> {
    if cli.minimal {
        return Ok(minimal_engine(config, cli.assets.as_deref()));
    }
    let demo = match &cli.demo {
        Some(path) => Some(
            DemoScript::load(path).with_context(|| format!("loading demo {}", path.display()))?,
        ),
        None => None,
    };
    Ok(full_engine(config, cli.assets.as_deref(), demo))
}

fn create_backend(platform: &WinitPlatform) -> Result<WgpuBackend> {
    let window = platform.window()?;
    let size = window.inner_size();

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let surface = instance
        .create_surface(Arc::clone(&window))
        .context("create surface")?;

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    }))
    .context("no compatible GPU adapter")?;

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("pathtracer_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        },
        None,
    ))
    .context("create device")?;

    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .or_else(|| caps.formats.first())
        .copied()
        .context("surface reports no formats")?;
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    tracing::info!(
        backend = adapter.get_info().backend.to_str(),
        adapter = %adapter.get_info().name,
        "GPU initialized"
    );
    Ok(WgpuBackend::new(device, queue, SurfaceTarget { surface, config }))
}

/// Bring up the platform and backend with `init`, then construct the
/// engine. No system exists until `init` has succeeded.
fn assemble<P, B>(
    cli: &Cli,
    init: impl FnOnce(&WindowConfig) -> Result<(P, B)>,
) -> Result<(WindowConfig, P, Engine), Failure>
where
    B: RenderBackend + 'static,
{
    let config = engine_config(cli).map_err(Failure::Startup)?;
    let window_config = WindowConfig::new(cli.title.clone(), cli.width, cli.height);
    let (platform, backend) = init(&window_config).map_err(Failure::Startup)?;

    let builder = composition(cli, config).map_err(Failure::Startup)?;
    let mut engine = builder
        .build(Box::new(backend))
        .context("build engine")
        .map_err(Failure::Startup)?;
    if cli.minimal {
        bootstrap(&mut engine);
    }
    Ok((window_config, platform, engine))
}

fn open_desktop(config: &WindowConfig) -> Result<(WinitPlatform, WgpuBackend)> {
    let platform = WinitPlatform::open(config).context("initialize window")?;
    let backend = create_backend(&platform)?;
    Ok((platform, backend))
}

fn run(cli: Cli) -> Result<(), Failure> {
    let (window_config, platform, engine) = assemble(&cli, open_desktop)?;
    let mut window = Window::new(window_config, platform, engine).with_status(status_line);
    window
        .start()
        .context("frame loop")
        .map_err(Failure::Runtime)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    tracing::info!("pathtracer-desktop starting");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Startup(err)) => {
            tracing::error!("startup failed: {err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
        Err(Failure::Runtime(err)) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use pathtracer_engine::ScriptedEvents;
    use pathtracer_render::HeadlessBackend;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("pathtracer-desktop").chain(args.iter().copied()))
    }

    #[test]
    fn graphics_failure_reported_before_systems_are_built() {
        // The demo path is bad too; only the init failure may surface.
        let cli = cli(&["--demo", "/nonexistent/demo.json"]);
        let result = assemble::<ScriptedEvents, HeadlessBackend>(&cli, |_| {
            anyhow::bail!("no compatible GPU adapter")
        });
        match result {
            Err(Failure::Startup(err)) => {
                assert_eq!(err.to_string(), "no compatible GPU adapter")
            }
            _ => panic!("expected startup failure"),
        }
    }

    #[test]
    fn engine_built_after_backend_init() {
        let cli = cli(&["--title", "t", "--width", "32", "--height", "16"]);
        let (config, _, engine) = assemble(&cli, |config| {
            Ok((
                ScriptedEvents::idle(1),
                HeadlessBackend::new(config.width(), config.height()),
            ))
        })
        .unwrap_or_else(|_| panic!("assemble failed"));
        assert_eq!(config.title(), "t");
        assert_eq!(
            engine.schedule_names(),
            [
                "AssetSystem",
                "SceneBootstrap",
                "DemoSystem",
                "MovementSystem",
                "GpuSceneSystem",
                "PathtracingSystem"
            ]
        );
    }
}
