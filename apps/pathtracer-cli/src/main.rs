use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pathtracer_assets::{Asset, AssetStore, AssetSystem};
use pathtracer_engine::EngineConfig;
use pathtracer_motion::DemoScript;
use pathtracer_pathtrace::PathtracingSystem;
use pathtracer_render::{BackendEvent, HeadlessBackend};
use pathtracer_runtime::{bootstrap, full_engine, minimal_engine, status_line};
use pathtracer_scene::GpuSceneSystem;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pathtracer-cli", about = "Headless tools for the pathtracer engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version
    Info,
    /// Scan an asset directory and report what loads
    Inspect {
        /// Asset directory
        dir: PathBuf,
    },
    /// Run frames on the headless backend
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
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
    #[arg(short, long, default_value = "120")]
    frames: u64,
    /// Polls a submission stays in flight
    #[arg(long, default_value = "1")]
    latency: u32,
    #[arg(long)]
    target_samples: Option<u32>,
}

fn inspect(dir: &Path) -> anyhow::Result<bool> {
    let mut store = AssetStore::new();
    let report = store
        .load_from(dir)
        .with_context(|| format!("scanning {}", dir.display()))?;

    println!("Assets in {}", dir.display());
    for (name, handle) in store.names() {
        match store.get(handle) {
            Some(Asset::Mesh(mesh)) => {
                println!("  mesh      {name} ({} triangles)", mesh.triangle_count())
            }
            Some(Asset::Material(material)) => println!(
                "  material  {name}{}",
                if material.is_emissive() { " (emissive)" } else { "" }
            ),
            None => {}
        }
    }
    for failure in &report.failures {
        println!("  FAILED    {}: {}", failure.name, failure.error);
    }
    println!(
        "loaded={} failed={} revision={}",
        store.len(),
        report.failures.len(),
        store.revision()
    );
    Ok(report.failures.is_empty())
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut engine_config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(samples) = args.target_samples {
        engine_config.target_samples = samples;
    }
    engine_config.validate()?;

    let backend = HeadlessBackend::new(320, 180).with_latency(args.latency);
    let journal = backend.journal();
    let builder = if args.minimal {
        minimal_engine(engine_config, args.assets.as_deref())
    } else {
        let script = match &args.demo {
            Some(path) => Some(DemoScript::load(path).with_context(|| format!("loading demo {}", path.display()))?),
            None => None,
        };
        full_engine(engine_config, args.assets.as_deref(), script)
    };
    let mut engine = builder.build(Box::new(backend)).context("build engine")?;
    if args.minimal {
        bootstrap(&mut engine);
    }

    let dt = 1.0 / 60.0;
    for _ in 0..args.frames {
        engine.frame_step(dt).context("frame failed")?;
    }

    println!("frames={} schedule={:?}", engine.frame(), engine.schedule_names());
    println!("{}", status_line(&engine));
    if let Some(assets) = engine.system::<AssetSystem>() {
        println!(
            "assets: {} loaded, {} failed",
            assets.store().len(),
            assets.store().failures().count()
        );
    }
    if let Some(scene) = engine.system::<GpuSceneSystem>() {
        println!("scene: version={} rebuilds={}", scene.version(), scene.rebuild_count());
    }
    if let Some(tracer) = engine.system::<PathtracingSystem>() {
        println!(
            "tracer: samples={} resets={} skipped={}",
            tracer.samples(),
            tracer.reset_count(),
            tracer.skipped_frames()
        );
    }
    println!(
        "device: uploads={} traces={} overlapping={}",
        journal.count(|e| matches!(e, BackendEvent::SceneUploaded { .. })),
        journal.count(|e| matches!(e, BackendEvent::Traced { .. })),
        journal.count(|e| matches!(e, BackendEvent::OverlappingWrite { .. })),
    );
    for record in engine.diagnostics().records() {
        println!("  [{}] {}: {}", record.frame, record.system, record.message);
    }

    engine.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let result = match cli.command {
        Commands::Info => {
            println!("pathtracer-cli v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Inspect { dir } => match inspect(&dir) {
            Ok(true) => Ok(()),
            Ok(false) => return ExitCode::from(1),
            Err(err) => Err(err),
        },
        Commands::Run(args) => run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
