//! Resolution of the account the command will run as.

use std::path::PathBuf;

use nix::unistd::{Gid, Group, Uid, User};

use crate::error::{EntrypointError, Result};

/// The unprivileged account to switch to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: PathBuf,
    /// Whether the user has a passwd entry, which `initgroups` needs.
    pub in_passwd: bool,
}

/// Resolves `user` and `group`, each a name or a numeric id.
///
/// A numeric uid without a passwd entry is accepted with home `/`. Without
/// `group` the user's primary group is used (the uid itself for such ids).
pub fn resolve_identity(user: &str, group: Option<&str>) -> Result<Identity> {
    let mut identity = match user.parse::<u32>() {
        Ok(raw) => {
            let uid = Uid::from_raw(raw);
            let entry = User::from_uid(uid).map_err(|source| EntrypointError::Lookup {
                what: format!("uid {raw}"),
                source,
            })?;
            match entry {
                Some(entry) => Identity::from(entry),
                None => Identity {
                    name: user.to_string(),
                    uid,
                    gid: Gid::from_raw(raw),
                    home: PathBuf::from("/"),
                    in_passwd: false,
                },
            }
        }
        Err(_) => User::from_name(user)
            .map_err(|source| EntrypointError::Lookup {
                what: format!("user '{user}'"),
                source,
            })?
            .map(Identity::from)
            .ok_or_else(|| EntrypointError::UnknownUser(user.to_string()))?,
    };

    if let Some(group) = group {
        identity.gid = resolve_group(group)?;
    }

    Ok(identity)
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
            home: user.dir,
            in_passwd: true,
        }
    }
}

fn resolve_group(group: &str) -> Result<Gid> {
    if let Ok(raw) = group.parse::<u32>() {
        return Ok(Gid::from_raw(raw));
    }

    Group::from_name(group)
        .map_err(|source| EntrypointError::Lookup {
            what: format!("group '{group}'"),
            source,
        })?
        .map(|g| g.gid)
        .ok_or_else(|| EntrypointError::UnknownGroup(group.to_string()))
}
