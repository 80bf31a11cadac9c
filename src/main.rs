use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use compose_sim::build_image_from_path;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vortices::{HarnessConfig, Images, REGISTRY, ScenarioContext, run_tests};

// Use mimalloc as the global allocator for the binary (non-Windows only)
#[cfg(not(windows))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "vortices",
    author,
    version,
    about = "Run NAT traversal scenarios against a control-plane image",
    override_usage = "vortices [OPTIONS] TARGET_PATH [TEST]..."
)]
struct Cli {
    /// Directory with the Dockerfile of the image under test
    #[arg(required_unless_present = "list")]
    target: Option<PathBuf>,
    /// Tests to run (all when omitted)
    tests: Vec<String>,

    /// Directory with the router image's Dockerfile
    #[arg(long = "router-path", default_value = "./router")]
    router_path: PathBuf,
    /// Parent directory for per-setup scratch state (overrides VORTICES_SCRATCH_DIR)
    #[arg(long = "scratch-dir")]
    scratch_dir: Option<PathBuf>,
    /// Capture router traffic with tcpdump into the scratch directory
    #[arg(long = "capture")]
    capture: bool,
    /// Keep scratch directories (descriptor, diagnostics, captures) after teardown
    #[arg(long = "keep-scratch")]
    keep_scratch: bool,
    /// Port of the computers' control plane
    #[arg(long = "control-port", default_value_t = vortices::config::DEFAULT_CONTROL_PORT)]
    control_port: u16,
    /// List available tests and exit
    #[arg(long = "list")]
    list: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Cli::parse();
    if args.list {
        for scenario in REGISTRY {
            println!("{:<28} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }
    let Some(target) = args.target else {
        anyhow::bail!("missing TARGET_PATH");
    };

    let mut config = HarnessConfig::from_env()?;
    if let Some(dir) = args.scratch_dir {
        config.environment.scratch_root = dir;
    }
    config.environment.capture |= args.capture;
    config.environment.keep_scratch |= args.keep_scratch;
    config.control_port = args.control_port;

    let images = build_images(&config.environment.docker, args.router_path, target).await?;
    info!(target_image = %images.target, router_image = %images.router, "images ready");

    let ctx = ScenarioContext { images, config };
    if !run_tests(ctx, &args.tests).await {
        std::process::exit(1);
    }
    Ok(())
}

/// Build the router and target images concurrently.
async fn build_images(docker: &str, router_path: PathBuf, target_path: PathBuf) -> Result<Images> {
    let (docker_router, docker_target) = (docker.to_string(), docker.to_string());
    let router = tokio::task::spawn_blocking(move || {
        build_image_from_path(&docker_router, "router", &router_path)
    });
    let target = tokio::task::spawn_blocking(move || {
        build_image_from_path(&docker_target, "target", &target_path)
    });
    let (router, target) = tokio::join!(router, target);
    Ok(Images {
        router: router.context("router image build task")??,
        target: target.context("target image build task")??,
    })
}
