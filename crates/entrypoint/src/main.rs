//! gemproxy-entrypoint - container bootstrap run as root.
//!
//! Creates the volume directories, hands them to the service account, drops
//! root and execs the command. The command keeps the PID, so it receives the
//! container's signals directly. Any failure before exec exits non-zero.

mod error;
mod identity;
mod ownership;
mod plan;
mod privileges;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nix::unistd::geteuid;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    identity::resolve_identity,
    ownership::{chown_recursive, ensure_dir},
    plan::{describe, plan, Step, DEFAULT_DIRS},
    privileges::{command, drop_privileges, exec},
};

/// Fix volume ownership, drop root, then exec CMD
#[derive(Parser, Debug)]
#[command(name = "gemproxy-entrypoint")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Account to run CMD as (name or uid)
    #[arg(long, short, env = "ENTRYPOINT_USER", default_value = "gemproxy")]
    user: String,

    /// Group to run CMD as (name or gid), defaults to the user's primary group
    #[arg(long, short, env = "ENTRYPOINT_GROUP")]
    group: Option<String>,

    /// Directory to create and chown, repeatable
    #[arg(
        long = "dir",
        short = 'd',
        env = "ENTRYPOINT_DIRS",
        value_delimiter = ':',
        default_values = DEFAULT_DIRS
    )]
    dirs: Vec<PathBuf>,

    /// Command to exec
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemproxy_entrypoint=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let identity = resolve_identity(&cli.user, cli.group.as_deref())
        .with_context(|| format!("Cannot run as '{}'", cli.user))?;

    // An empty ENTRYPOINT_DIRS entry ("a::b") is not a directory.
    let dirs: Vec<PathBuf> = cli
        .dirs
        .into_iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .collect();

    let mut switched = false;
    for step in plan(geteuid(), &dirs, &identity) {
        tracing::info!("{}", describe(&step, &identity));

        match step {
            Step::EnsureDir(dir) => ensure_dir(&dir)?,
            Step::Chown(dir) => {
                let entries = chown_recursive(&dir, identity.uid, identity.gid)?;
                tracing::debug!(dir = %dir.display(), entries, "Ownership fixed");
            }
            Step::DropPrivileges => {
                drop_privileges(&identity)?;
                switched = true;
            }
            Step::Exec => {
                let cmd = command(&cli.command, switched.then_some(&identity))?;
                return Err(exec(cmd).into());
            }
        }
    }

    anyhow::bail!("Plan ended without exec")
}
