// ============================================
// File: crates/teavpn2-server/src/services/auth.rs
// ============================================
//! # Authentication Adapter
//!
//! ## Creation Reason
//! Decides whether a username/password pair is acceptable and, when it
//! is, which interface assignment to echo back in `AUTH_OK`.
//!
//! ## Main Functionality
//! - `Authenticator`: the seam the state machine calls through
//! - `AuthOutcome`: `Assigned(..)` or `Rejected`
//! - `FileAuthenticator`: per-user TOML files under `${data_dir}/users/`
//!
//! ## Credential File Format
//! `${data_dir}/users/<username>.toml`:
//! ```toml
//! password = "hunter2"
//!
//! [iface]
//! dev = "teavpn2-srv"
//! ipv4 = "10.8.8.2"
//! netmask = "255.255.255.0"
//! mtu = 1480
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Lookups are disk-bound and run synchronously on the reactor; they
//!   are expected to finish in milliseconds
//! - Usernames become file names; everything that is not a plain name is
//!   rejected before touching the filesystem
//!
//! ## Last Modified
//! v0.1.0 - Initial authenticator implementation

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, warn};

use teavpn2_proto::IfaceAssign;

// ============================================
// AuthOutcome
// ============================================

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted; the client receives this assignment.
    Assigned(IfaceAssign),
    /// Credentials refused.
    Rejected,
}

// ============================================
// Authenticator
// ============================================

/// Credential verification seam.
///
/// Implementations may block briefly (disk lookups); the reactor calls
/// this inline and relies on it returning quickly.
pub trait Authenticator: Send + Sync {
    /// Verifies `username`/`password` and returns the outcome.
    fn authenticate(&self, username: &str, password: &str) -> AuthOutcome;
}

// ============================================
// FileAuthenticator
// ============================================

/// Authenticator backed by one TOML file per user.
#[derive(Debug, Clone)]
pub struct FileAuthenticator {
    users_dir: PathBuf,
}

/// On-disk credential record.
#[derive(Debug, Deserialize)]
struct UserRecord {
    password: String,
    iface: UserIface,
}

#[derive(Debug, Deserialize)]
struct UserIface {
    dev: String,
    ipv4: String,
    netmask: String,
    mtu: u16,
}

impl FileAuthenticator {
    /// Creates an authenticator rooted at `users_dir`.
    #[must_use]
    pub fn new(users_dir: impl Into<PathBuf>) -> Self {
        Self {
            users_dir: users_dir.into(),
        }
    }

    fn load_record(&self, username: &str) -> Option<UserRecord> {
        let path = self.users_dir.join(format!("{username}.toml"));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(user = username, "No credential file");
                return None;
            }
            Err(e) => {
                warn!(user = username, path = %path.display(), "Cannot read credential file: {}", e);
                return None;
            }
        };

        match toml::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(user = username, path = %path.display(), "Malformed credential file: {}", e);
                None
            }
        }
    }
}

/// A username is usable as a file name only if it is a plain word.
fn username_is_sane(username: &str) -> bool {
    !username.is_empty()
        && username.len() < 64
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        && !username.starts_with('.')
}

impl Authenticator for FileAuthenticator {
    fn authenticate(&self, username: &str, password: &str) -> AuthOutcome {
        if !username_is_sane(username) {
            warn!(user = username, "Rejecting unusable username");
            return AuthOutcome::Rejected;
        }

        let Some(record) = self.load_record(username) else {
            return AuthOutcome::Rejected;
        };

        if record.password != password {
            debug!(user = username, "Password mismatch");
            return AuthOutcome::Rejected;
        }

        match IfaceAssign::new(
            record.iface.dev,
            record.iface.ipv4,
            record.iface.netmask,
            record.iface.mtu,
        ) {
            Ok(assign) => AuthOutcome::Assigned(assign),
            Err(e) => {
                warn!(user = username, "Credential file iface section invalid: {}", e);
                AuthOutcome::Rejected
            }
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_user(dir: &std::path::Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(format!("{name}.toml"))).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    const ALICE: &str = r#"
        password = "p"

        [iface]
        dev = "teavpn2-srv"
        ipv4 = "10.8.8.2"
        netmask = "255.255.255.0"
        mtu = 1480
    "#;

    #[test]
    fn test_accepts_known_user() {
        let dir = tempfile::tempdir().unwrap();
        write_user(dir.path(), "alice", ALICE);

        let auth = FileAuthenticator::new(dir.path());
        match auth.authenticate("alice", "p") {
            AuthOutcome::Assigned(assign) => {
                assert_eq!(assign.dev, "teavpn2-srv");
                assert_eq!(assign.ipv4, "10.8.8.2");
                assert_eq!(assign.netmask, "255.255.255.0");
                assert_eq!(assign.mtu, 1480);
            }
            AuthOutcome::Rejected => panic!("alice should authenticate"),
        }
    }

    #[test]
    fn test_rejects_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        write_user(dir.path(), "alice", ALICE);

        let auth = FileAuthenticator::new(dir.path());
        assert_eq!(auth.authenticate("alice", "wrong"), AuthOutcome::Rejected);
    }

    #[test]
    fn test_rejects_unknown_user() {
        let dir = tempfile::tempdir().unwrap();
        let auth = FileAuthenticator::new(dir.path());
        assert_eq!(auth.authenticate("mallory", "p"), AuthOutcome::Rejected);
    }

    #[test]
    fn test_rejects_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        write_user(dir.path(), "broken", "password = \"p\"\n");

        let auth = FileAuthenticator::new(dir.path());
        assert_eq!(auth.authenticate("broken", "p"), AuthOutcome::Rejected);
    }

    #[test]
    fn test_rejects_path_shaped_usernames() {
        let dir = tempfile::tempdir().unwrap();
        let auth = FileAuthenticator::new(dir.path());

        for bad in ["../alice", "a/b", "", ".hidden", "a\\b", "name with space"] {
            assert_eq!(auth.authenticate(bad, "p"), AuthOutcome::Rejected, "{bad:?}");
        }
    }

    #[test]
    fn test_rejects_oversize_assignment() {
        let dir = tempfile::tempdir().unwrap();
        write_user(
            dir.path(),
            "bigdev",
            r#"
                password = "p"

                [iface]
                dev = "this-device-name-is-too-long"
                ipv4 = "10.8.8.2"
                netmask = "255.255.255.0"
                mtu = 1480
            "#,
        );

        let auth = FileAuthenticator::new(dir.path());
        assert_eq!(auth.authenticate("bigdev", "p"), AuthOutcome::Rejected);
    }
}
