use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use stereo_viewer::config::{Configuration, StereoMode};
use stereo_viewer::decode::ImageDecoder;
use stereo_viewer::events::{Eye, LoadPair, PairLoaded};
use stereo_viewer::source::PickedImageRef;
use stereo_viewer::tasks;
use stereo_viewer::tasks::session::StereoSession;

#[derive(Debug, Parser)]
#[command(
    name = "stereo-viewer",
    version,
    about = "Present a left/right image pair as one stereo card"
)]
struct Cli {
    /// Path to YAML config; built-in defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Preselect the left eye image
    #[arg(long, value_name = "PATH")]
    left: Option<PathBuf>,
    /// Preselect the right eye image
    #[arg(long, value_name = "PATH")]
    right: Option<PathBuf>,
    /// Asset bundle directory holding scene.yaml
    #[arg(long, value_name = "DIR")]
    assets: Option<PathBuf>,
    /// side-by-side, anaglyph, left or right
    #[arg(long, value_name = "MODE")]
    stereo_mode: Option<StereoMode>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("stereo_viewer={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
    Ok(())
}

fn load_configuration(cli: &Cli) -> Result<Configuration> {
    let mut cfg = match cli.config.as_ref() {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(assets) = cli.assets.clone() {
        cfg.asset_bundle_path = Some(assets);
    }
    if let Some(mode) = cli.stereo_mode {
        cfg.stereo_mode = mode;
    }
    cfg.validated().context("invalid configuration values")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = load_configuration(&cli)?;
    tracing::debug!("effective configuration:\n{:#?}", cfg);

    let mut session = StereoSession::new();
    for (eye, path) in [(Eye::Left, cli.left.as_ref()), (Eye::Right, cli.right.as_ref())] {
        if let Some(path) = path {
            session.pick(eye, PickedImageRef::new(path));
        }
    }

    // Viewer -> Loader and back; one pair is in flight at a time.
    let (load_tx, load_rx) = mpsc::channel::<LoadPair>(2);
    let (loaded_tx, loaded_rx) = mpsc::channel::<PairLoaded>(2);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let cancel = cancel.clone();
        let timeout = cfg.load_timeout();
        async move {
            tasks::loader::run(load_rx, loaded_tx, cancel, Arc::new(ImageDecoder), timeout)
                .await
                .context("loader task failed")
        }
    });

    // The event loop owns the main thread until the window closes or cancellation occurs.
    if let Err(e) = tasks::viewer::run_windowed(cfg, session, load_tx, loaded_rx, cancel.clone())
        .context("viewer failed")
    {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}
