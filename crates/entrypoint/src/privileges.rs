//! Switching to the service account and replacing the process.

use std::ffi::CString;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::unistd::{initgroups, setgid, setgroups, setuid, Uid};

use crate::error::{EntrypointError, Result};
use crate::identity::Identity;

/// Sets supplementary groups, gid and uid, in that order.
///
/// Fails if root can be regained afterwards.
pub fn drop_privileges(identity: &Identity) -> Result<()> {
    set_groups(identity)?;

    setgid(identity.gid).map_err(|source| EntrypointError::DropPrivileges {
        step: "setgid",
        source,
    })?;
    setuid(identity.uid).map_err(|source| EntrypointError::DropPrivileges {
        step: "setuid",
        source,
    })?;

    if setuid(Uid::from_raw(0)).is_ok() {
        return Err(EntrypointError::RootRegained(identity.uid.as_raw()));
    }

    Ok(())
}

fn set_groups(identity: &Identity) -> Result<()> {
    if identity.in_passwd {
        if let Ok(name) = CString::new(identity.name.as_str()) {
            match initgroups(&name, identity.gid) {
                Ok(()) => return Ok(()),
                Err(e) => tracing::debug!(error = %e, "initgroups failed, using the primary group only"),
            }
        }
    }

    setgroups(&[identity.gid]).map_err(|source| EntrypointError::DropPrivileges {
        step: "setgroups",
        source,
    })
}

/// Builds the command to exec. `HOME` and `USER` follow the new account
/// when privileges were dropped.
pub fn command(argv: &[String], switched_to: Option<&Identity>) -> Result<Command> {
    let (program, args) = argv.split_first().ok_or(EntrypointError::NoCommand)?;

    let mut command = Command::new(program);
    command.args(args);
    if let Some(identity) = switched_to {
        command.env("HOME", &identity.home).env("USER", &identity.name);
    }
    Ok(command)
}

/// Replaces the current process. Only returns on failure.
pub fn exec(mut command: Command) -> EntrypointError {
    let program = command.get_program().to_string_lossy().into_owned();
    let source = command.exec();
    EntrypointError::Exec { program, source }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use nix::unistd::Gid;

    use super::*;

    fn account() -> Identity {
        Identity {
            name: "gemproxy".to_string(),
            uid: Uid::from_raw(1000),
            gid: Gid::from_raw(1000),
            home: PathBuf::from("/home/gemproxy"),
            in_passwd: true,
        }
    }

    #[test]
    fn test_command_splits_program_and_args() {
        let argv = vec!["gemproxy".to_string(), "serve".to_string()];
        let command = command(&argv, None).unwrap();

        assert_eq!(command.get_program(), "gemproxy");
        assert_eq!(command.get_args().collect::<Vec<_>>(), vec!["serve"]);
        assert_eq!(command.get_envs().count(), 0);
    }

    #[test]
    fn test_command_sets_account_env_after_switch() {
        let argv = vec!["gemproxy".to_string()];
        let account = account();
        let command = command(&argv, Some(&account)).unwrap();

        let envs: Vec<_> = command
            .get_envs()
            .map(|(k, v)| (k.to_owned(), v.map(|v| v.to_owned())))
            .collect();
        assert!(envs.contains(&("HOME".into(), Some("/home/gemproxy".into()))));
        assert!(envs.contains(&("USER".into(), Some("gemproxy".into()))));
    }

    #[test]
    fn test_empty_command_is_an_error() {
        assert!(matches!(command(&[], None), Err(EntrypointError::NoCommand)));
    }

    #[test]
    fn test_failed_exec_is_reported() {
        let argv = vec!["/nonexistent/gemproxy-test-binary".to_string()];
        let err = exec(command(&argv, None).unwrap());

        assert!(matches!(err, EntrypointError::Exec { program, .. } if program == "/nonexistent/gemproxy-test-binary"));
    }
}
