//! What the entrypoint does, decided without touching the system.

use std::path::{Path, PathBuf};

use nix::unistd::Uid;

use crate::identity::Identity;

pub const DEFAULT_DIRS: [&str; 3] = ["/app/data", "/app/temp", "/app/cache"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    EnsureDir(PathBuf),
    Chown(PathBuf),
    DropPrivileges,
    Exec,
}

/// Steps for a process running with effective uid `euid`.
///
/// Only root can fix ownership or switch users; anyone else runs the command
/// as they are. Root targeting root keeps its privileges.
pub fn plan(euid: Uid, dirs: &[PathBuf], identity: &Identity) -> Vec<Step> {
    if !euid.is_root() {
        return vec![Step::Exec];
    }

    let mut steps = Vec::with_capacity(dirs.len() * 2 + 2);
    for dir in dirs {
        steps.push(Step::EnsureDir(dir.clone()));
        steps.push(Step::Chown(dir.clone()));
    }
    if !identity.uid.is_root() {
        steps.push(Step::DropPrivileges);
    }
    steps.push(Step::Exec);
    steps
}

/// Renders a step for the startup log.
pub fn describe(step: &Step, identity: &Identity) -> String {
    let display = |path: &Path| path.display().to_string();
    match step {
        Step::EnsureDir(dir) => format!("mkdir -p {}", display(dir)),
        Step::Chown(dir) => format!(
            "chown -R {}:{} {}",
            identity.uid,
            identity.gid,
            display(dir)
        ),
        Step::DropPrivileges => format!("switch to {} ({}:{})", identity.name, identity.uid, identity.gid),
        Step::Exec => "exec".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use nix::unistd::Gid;

    use super::*;

    fn service_account() -> Identity {
        Identity {
            name: "gemproxy".to_string(),
            uid: Uid::from_raw(1000),
            gid: Gid::from_raw(1000),
            home: PathBuf::from("/home/gemproxy"),
            in_passwd: true,
        }
    }

    fn default_dirs() -> Vec<PathBuf> {
        DEFAULT_DIRS.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_root_fixes_every_dir_then_drops() {
        let steps = plan(Uid::from_raw(0), &default_dirs(), &service_account());

        assert_eq!(
            steps,
            vec![
                Step::EnsureDir(PathBuf::from("/app/data")),
                Step::Chown(PathBuf::from("/app/data")),
                Step::EnsureDir(PathBuf::from("/app/temp")),
                Step::Chown(PathBuf::from("/app/temp")),
                Step::EnsureDir(PathBuf::from("/app/cache")),
                Step::Chown(PathBuf::from("/app/cache")),
                Step::DropPrivileges,
                Step::Exec,
            ]
        );
    }

    #[test]
    fn test_non_root_only_execs() {
        let steps = plan(Uid::from_raw(1000), &default_dirs(), &service_account());
        assert_eq!(steps, vec![Step::Exec]);
    }

    #[test]
    fn test_root_target_keeps_privileges() {
        let root = Identity {
            name: "root".to_string(),
            uid: Uid::from_raw(0),
            gid: Gid::from_raw(0),
            home: PathBuf::from("/root"),
            in_passwd: true,
        };
        let steps = plan(Uid::from_raw(0), &[], &root);
        assert_eq!(steps, vec![Step::Exec]);
    }

    #[test]
    fn test_describe() {
        let account = service_account();
        assert_eq!(
            describe(&Step::Chown(PathBuf::from("/app/data")), &account),
            "chown -R 1000:1000 /app/data"
        );
        assert_eq!(
            describe(&Step::DropPrivileges, &account),
            "switch to gemproxy (1000:1000)"
        );
    }
}
