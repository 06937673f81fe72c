//! Docker/Podman invocations for the image commands.
//!
//! - **Pure functions** build argument vectors and parse command output.
//! - **I/O functions** run the container runtime.

use std::time::{Duration, Instant};

use tokio::process::Command;

use super::error::{ImageError, Result};

/// Port the server listens on inside the image.
pub const CONTAINER_PORT: u16 = 8000;

/// Container runtime (Docker or Podman).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
}

// ============================================================================
// Pure Functions (Functional Core)
// ============================================================================

pub fn runtime_command(runtime: ContainerRuntime) -> &'static str {
    match runtime {
        ContainerRuntime::Docker => "docker",
        ContainerRuntime::Podman => "podman",
    }
}

/// Arguments for `docker build`.
pub fn build_args(tag: &str, dockerfile: &str, context: &str) -> Vec<String> {
    vec![
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        "-f".to_string(),
        dockerfile.to_string(),
        context.to_string(),
    ]
}

/// Arguments for a detached `docker run` publishing the server port.
pub fn run_args(name: &str, tag: &str, host_port: u16) -> Vec<String> {
    vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.to_string(),
        "-p".to_string(),
        format!("{host_port}:{CONTAINER_PORT}"),
        tag.to_string(),
    ]
}

/// Arguments reading the HEALTHCHECK status. Prints nothing when the image
/// has no HEALTHCHECK.
pub fn health_status_args(name: &str) -> Vec<String> {
    vec![
        "inspect".to_string(),
        "--format".to_string(),
        "{{if .State.Health}}{{.State.Health.Status}}{{end}}".to_string(),
        name.to_string(),
    ]
}

pub fn exit_code_args(name: &str) -> Vec<String> {
    vec![
        "inspect".to_string(),
        "--format".to_string(),
        "{{.State.ExitCode}}".to_string(),
        name.to_string(),
    ]
}

pub fn exec_args(name: &str, command: &[&str]) -> Vec<String> {
    let mut args = vec!["exec".to_string(), name.to_string()];
    args.extend(command.iter().map(|s| s.to_string()));
    args
}

pub fn stop_args(name: &str, timeout_secs: u64) -> Vec<String> {
    vec![
        "stop".to_string(),
        "-t".to_string(),
        timeout_secs.to_string(),
        name.to_string(),
    ]
}

pub fn remove_args(name: &str) -> Vec<String> {
    vec!["rm".to_string(), "-f".to_string(), name.to_string()]
}

/// Real uid from the `Uid:` line of `/proc/<pid>/status`.
pub fn parse_status_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// Program name from a NUL separated `/proc/<pid>/cmdline`.
pub fn parse_cmdline_program(cmdline: &str) -> Option<&str> {
    cmdline
        .split('\0')
        .next()
        .filter(|program| !program.is_empty())
        .map(|program| program.rsplit('/').next().unwrap_or(program))
}

// ============================================================================
// I/O Functions (Imperative Shell)
// ============================================================================

/// Detects which container runtime is available.
///
/// If `prefer_podman` is true, checks Podman first, then Docker.
pub async fn detect_runtime(prefer_podman: bool) -> Result<ContainerRuntime> {
    let check_order = if prefer_podman {
        [ContainerRuntime::Podman, ContainerRuntime::Docker]
    } else {
        [ContainerRuntime::Docker, ContainerRuntime::Podman]
    };

    for runtime in check_order {
        let output = Command::new(runtime_command(runtime))
            .arg("--version")
            .output()
            .await;

        if let Ok(output) = output {
            if output.status.success() {
                return Ok(runtime);
            }
        }
    }

    Err(ImageError::RuntimeNotFound(
        "Neither docker nor podman found in PATH".to_string(),
    ))
}

/// Runs the runtime with `args` and returns trimmed stdout.
pub async fn capture(runtime: ContainerRuntime, args: &[String]) -> Result<String> {
    let cmd = runtime_command(runtime);
    let output = Command::new(cmd).args(args).output().await?;

    if !output.status.success() {
        return Err(ImageError::CommandFailed {
            command: format!("{cmd} {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs the runtime with inherited stdio, for long builds.
pub async fn run_interactive(runtime: ContainerRuntime, args: &[String]) -> Result<()> {
    let cmd = runtime_command(runtime);
    let status = Command::new(cmd)
        .args(args)
        .stdin(std::process::Stdio::inherit())
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .status()
        .await?;

    if !status.success() {
        return Err(ImageError::CommandFailed {
            command: format!("{cmd} {}", args.join(" ")),
            stderr: format!("exited with {status}"),
        });
    }

    Ok(())
}

/// Removes a container, ignoring errors since it might not exist.
pub async fn remove_container(runtime: ContainerRuntime, name: &str) {
    let _ = Command::new(runtime_command(runtime))
        .args(remove_args(name))
        .output()
        .await;
}

/// Polls the image HEALTHCHECK until it reports `healthy`.
///
/// Images without a HEALTHCHECK are checked over HTTP on `host_port` instead.
pub async fn wait_for_health(
    runtime: ContainerRuntime,
    name: &str,
    host_port: u16,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    let poll_interval = Duration::from_secs(1);
    let mut status = String::new();

    while start.elapsed() < timeout {
        status = capture(runtime, &health_status_args(name)).await?;

        let healthy = match status.as_str() {
            "healthy" => true,
            "" => check_http_health(host_port).await,
            _ => false,
        };
        if healthy {
            return Ok(());
        }

        tokio::time::sleep(poll_interval).await;
    }

    Err(ImageError::NotHealthy {
        name: name.to_string(),
        timeout_secs: timeout.as_secs(),
        status,
    })
}

/// `GET /health` from the host side of the port mapping.
pub async fn check_http_health(host_port: u16) -> bool {
    let url = format!("http://127.0.0.1:{host_port}/health");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build();

    let Ok(client) = client else {
        return false;
    };

    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        assert_eq!(
            build_args("gemproxy:dev", "Dockerfile", "."),
            vec!["build", "-t", "gemproxy:dev", "-f", "Dockerfile", "."]
        );
    }

    #[test]
    fn test_run_args_maps_server_port() {
        let args = run_args("gemproxy-smoke", "gemproxy:latest", 18000);

        assert_eq!(args[0], "run");
        assert!(args.contains(&"-d".to_string()));
        assert!(args.contains(&"18000:8000".to_string()));
        assert_eq!(args.last().unwrap(), "gemproxy:latest");
    }

    #[test]
    fn test_exec_and_stop_args() {
        assert_eq!(
            exec_args("box", &["cat", "/proc/1/status"]),
            vec!["exec", "box", "cat", "/proc/1/status"]
        );
        assert_eq!(stop_args("box", 10), vec!["stop", "-t", "10", "box"]);
        assert_eq!(remove_args("box"), vec!["rm", "-f", "box"]);
    }

    #[test]
    fn test_health_status_args_tolerate_missing_healthcheck() {
        let args = health_status_args("box");
        assert!(args[2].starts_with("{{if .State.Health}}"));
    }

    #[test]
    fn test_parse_status_uid() {
        let status = "Name:\tgemproxy\nState:\tS (sleeping)\nUid:\t1000\t1000\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n";
        assert_eq!(parse_status_uid(status), Some(1000));
        assert_eq!(parse_status_uid("Name:\tx\n"), None);
    }

    #[test]
    fn test_parse_cmdline_program() {
        assert_eq!(
            parse_cmdline_program("/usr/local/bin/gemproxy\0serve\0"),
            Some("gemproxy")
        );
        assert_eq!(parse_cmdline_program("gemproxy\0serve"), Some("gemproxy"));
        assert_eq!(parse_cmdline_program(""), None);
    }

    #[test]
    fn test_runtime_command() {
        assert_eq!(runtime_command(ContainerRuntime::Docker), "docker");
        assert_eq!(runtime_command(ContainerRuntime::Podman), "podman");
    }
}
