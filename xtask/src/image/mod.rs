//! Container image tasks.
//!
//! # Usage
//!
//! ```bash
//! # Build the image with docker (or podman when docker is missing)
//! cargo xtask image build
//!
//! # Build with podman and a custom tag
//! cargo xtask image build --podman --tag gemproxy:dev
//!
//! # Run the image and check the container contract
//! cargo xtask image smoke --tag gemproxy:dev
//! ```

pub mod docker;
pub mod error;

use std::time::{Duration, Instant};

use clap::Subcommand;

use crate::prelude::*;
use docker::{
    build_args, capture, detect_runtime, exec_args, exit_code_args, parse_cmdline_program,
    parse_status_uid, remove_container, run_args, run_interactive, stop_args, wait_for_health,
    ContainerRuntime,
};
use error::{ImageError, Result};

const DEFAULT_TAG: &str = "gemproxy:latest";
const SMOKE_CONTAINER: &str = "gemproxy-smoke";
const SERVICE_USER: &str = "gemproxy";
const VOLUMES: [&str; 3] = ["/app/data", "/app/temp", "/app/cache"];

/// Build and verify the container image
#[derive(Debug, clap::Parser)]
pub struct ImageCommand {
    #[command(subcommand)]
    pub action: ImageAction,
}

#[derive(Debug, Subcommand)]
pub enum ImageAction {
    /// Build the image from the workspace Dockerfile
    Build(BuildOptions),

    /// Run the image and verify health, privilege drop and SIGTERM handling
    Smoke(SmokeOptions),
}

#[derive(Debug, clap::Args)]
pub struct BuildOptions {
    /// Image tag
    #[arg(long, short = 't', default_value = DEFAULT_TAG)]
    pub tag: String,

    /// Prefer podman over docker
    #[arg(long)]
    pub podman: bool,

    /// Dockerfile path, relative to the workspace root
    #[arg(long, default_value = "Dockerfile")]
    pub dockerfile: String,
}

#[derive(Debug, clap::Args)]
pub struct SmokeOptions {
    /// Image tag
    #[arg(long, short = 't', default_value = DEFAULT_TAG)]
    pub tag: String,

    /// Host port mapped to the server
    #[arg(long, short = 'p', default_value = "18000")]
    pub port: u16,

    /// Seconds the container may take to report healthy
    #[arg(long, default_value = "40")]
    pub start_period: u64,

    /// Seconds `stop` waits for SIGTERM before killing
    #[arg(long, default_value = "10")]
    pub stop_timeout: u64,

    /// Prefer podman over docker
    #[arg(long)]
    pub podman: bool,
}

pub async fn run(command: ImageCommand, global: crate::Global) -> Result<()> {
    match command.action {
        ImageAction::Build(opts) => build(opts, global).await,
        ImageAction::Smoke(opts) => smoke(opts, global).await,
    }
}

async fn build(opts: BuildOptions, global: crate::Global) -> Result<()> {
    let runtime = detect_runtime(opts.podman).await?;

    if !global.is_silent() {
        aprintln!(
            "{} Building {} with {}...",
            p_b("📦"),
            p_c(&opts.tag),
            docker::runtime_command(runtime)
        );
    }

    run_interactive(runtime, &build_args(&opts.tag, &opts.dockerfile, ".")).await?;

    if !global.is_silent() {
        aprintln!("{} Built {}", p_g("✅"), opts.tag);
    }
    Ok(())
}

async fn smoke(opts: SmokeOptions, global: crate::Global) -> Result<()> {
    let runtime = detect_runtime(opts.podman).await?;

    remove_container(runtime, SMOKE_CONTAINER).await;
    capture(runtime, &run_args(SMOKE_CONTAINER, &opts.tag, opts.port)).await?;

    let result = smoke_checks(runtime, &opts, &global).await;

    if result.is_err() && global.is_verbose() {
        if let Ok(logs) = capture(runtime, &["logs".to_string(), SMOKE_CONTAINER.to_string()]).await {
            aprintln!("{}\n{}", p_y("Container logs:"), logs);
        }
    }
    remove_container(runtime, SMOKE_CONTAINER).await;

    if result.is_ok() && !global.is_silent() {
        aprintln!("{} Smoke test passed for {}", p_g("✅"), opts.tag);
    }
    result
}

async fn smoke_checks(
    runtime: ContainerRuntime,
    opts: &SmokeOptions,
    global: &crate::Global,
) -> Result<()> {
    let say = |step: &str| {
        if !global.is_silent() {
            aprintln!("{} {}", p_b("→"), step);
        }
    };

    say("waiting for HEALTHCHECK");
    wait_for_health(
        runtime,
        SMOKE_CONTAINER,
        opts.port,
        Duration::from_secs(opts.start_period),
    )
    .await?;

    say("checking PID 1");
    let cmdline = capture(runtime, &exec_args(SMOKE_CONTAINER, &["cat", "/proc/1/cmdline"])).await?;
    let program = parse_cmdline_program(&cmdline).unwrap_or_default();
    if program != "gemproxy" {
        return Err(ImageError::SmokeFailed(format!(
            "PID 1 is '{program}', expected the server after exec"
        )));
    }

    let status = capture(runtime, &exec_args(SMOKE_CONTAINER, &["cat", "/proc/1/status"])).await?;
    match parse_status_uid(&status) {
        Some(0) => {
            return Err(ImageError::SmokeFailed("PID 1 still runs as root".to_string()));
        }
        Some(_) => {}
        None => {
            return Err(ImageError::SmokeFailed(
                "Could not read the uid of PID 1".to_string(),
            ));
        }
    }

    say("checking volume ownership");
    for volume in VOLUMES {
        let owner = capture(runtime, &exec_args(SMOKE_CONTAINER, &["stat", "-c", "%U", volume])).await?;
        if owner != SERVICE_USER {
            return Err(ImageError::SmokeFailed(format!(
                "{volume} is owned by '{owner}', expected '{SERVICE_USER}'"
            )));
        }
    }

    say("sending SIGTERM");
    let start = Instant::now();
    capture(runtime, &stop_args(SMOKE_CONTAINER, opts.stop_timeout)).await?;
    let elapsed = start.elapsed();

    let exit_code = capture(runtime, &exit_code_args(SMOKE_CONTAINER)).await?;
    if exit_code != "0" || elapsed >= Duration::from_secs(opts.stop_timeout) {
        return Err(ImageError::SmokeFailed(format!(
            "Container ignored SIGTERM (exit code {exit_code} after {:.1}s)",
            elapsed.as_secs_f32()
        )));
    }

    Ok(())
}
