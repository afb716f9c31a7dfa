//! Dropping elevated privileges to the configured service identity.

use std::ffi::CString;
use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("unknown user {0:?}")]
    UnknownUser(String),

    #[error("unknown group {0:?}")]
    UnknownGroup(String),

    #[error("invalid name: {0}")]
    Name(#[from] std::ffi::NulError),

    #[error("setgid failed: {0}")]
    Setgid(io::Error),

    #[error("setuid failed: {0}")]
    Setuid(io::Error),
}

/// Whether this process runs with elevated privileges.
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no failure modes.
    unsafe { libc::geteuid() == 0 }
}

/// Drop to the configured unprivileged identity. Group first, then
/// user: setgid is no longer permitted once the uid changes.
pub fn drop_to(user: &str, group: &str) -> Result<(), PrivilegeError> {
    let gid = lookup_group(group)?;
    let uid = lookup_user(user)?;

    // SAFETY: plain syscalls on ids resolved above.
    unsafe {
        if libc::setgid(gid) != 0 {
            return Err(PrivilegeError::Setgid(io::Error::last_os_error()));
        }
        if libc::setuid(uid) != 0 {
            return Err(PrivilegeError::Setuid(io::Error::last_os_error()));
        }
    }

    tracing::info!(user, group, "dropped privileges");
    Ok(())
}

fn lookup_user(name: &str) -> Result<libc::uid_t, PrivilegeError> {
    let cname = CString::new(name)?;
    // SAFETY: getpwnam returns a static-lifetime record or null.
    let record = unsafe { libc::getpwnam(cname.as_ptr()) };
    if record.is_null() {
        return Err(PrivilegeError::UnknownUser(name.to_string()));
    }
    Ok(unsafe { (*record).pw_uid })
}

fn lookup_group(name: &str) -> Result<libc::gid_t, PrivilegeError> {
    let cname = CString::new(name)?;
    // SAFETY: getgrnam returns a static-lifetime record or null.
    let record = unsafe { libc::getgrnam(cname.as_ptr()) };
    if record.is_null() {
        return Err(PrivilegeError::UnknownGroup(name.to_string()));
    }
    Ok(unsafe { (*record).gr_gid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resolves_to_uid_zero() {
        assert_eq!(lookup_user("root").unwrap(), 0);
        assert_eq!(lookup_group("root").unwrap(), 0);
    }

    #[test]
    fn unknown_identities_are_errors() {
        assert!(matches!(
            lookup_user("no-such-user-here"),
            Err(PrivilegeError::UnknownUser(_))
        ));
        assert!(matches!(
            lookup_group("no-such-group-here"),
            Err(PrivilegeError::UnknownGroup(_))
        ));
    }
}
