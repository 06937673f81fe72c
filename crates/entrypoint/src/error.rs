use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntrypointError {
    #[error("User '{0}' does not exist")]
    UnknownUser(String),

    #[error("Group '{0}' does not exist")]
    UnknownGroup(String),

    #[error("Failed to look up {what}: {source}")]
    Lookup { what: String, source: Errno },

    #[error("Failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("Failed to chown {path}: {source}")]
    Chown {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{step} failed: {source}")]
    DropPrivileges { step: &'static str, source: Errno },

    #[error("Root privileges could be regained after switching to uid {0}")]
    RootRegained(u32),

    #[error("Failed to exec {program}: {source}")]
    Exec {
        program: String,
        source: std::io::Error,
    },

    #[error("No command given")]
    NoCommand,
}

pub type Result<T> = std::result::Result<T, EntrypointError>;
