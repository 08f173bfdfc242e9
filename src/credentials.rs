//! Login credential store.
//!
//! Holds the single admin `username` / `password hash` pair backed by a
//! small `KEY="VALUE"` text file. The file is watched for external
//! edits (the login can be changed while the relay runs) and swapped in
//! as an atomic snapshot.

use crate::error::{RelayError, Result};
use crate::watch::{watch_file, WatchedFile};
use base64::Engine;
use sha2::{Digest, Sha512};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const USER_KEY: &str = "ADMIN_USER";
const PASS_KEY: &str = "ADMIN_PASS";

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(300);

/// One stored login record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password_hash: String,
}

/// Store for the single admin login.
#[derive(Clone)]
pub struct CredentialStore {
    path: PathBuf,
    current: Arc<RwLock<Option<Credentials>>>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Ensure the backing file exists and load the stored record.
    ///
    /// Fails when no valid (non-empty) pair is present; the caller must
    /// route the user to a credential-creation flow.
    pub fn init(&self) -> Result<()> {
        if !self.path.exists() {
            std::fs::write(&self.path, "")?;
        }

        match self.load_from_disk() {
            Ok(Some(creds)) => {
                *self.current.write().unwrap() = Some(creds);
                Ok(())
            }
            Ok(None) => Err(RelayError::Configuration(format!(
                "No login is configured in {} - run `notify-relay set-login <username> <password>` first",
                self.path.display()
            ))),
            Err(e) => Err(RelayError::Configuration(format!(
                "Can't read login data from {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Current `(username, password hash)` pair, reloading from disk
    /// first if nothing is loaded yet.
    pub fn local_auth(&self) -> Option<Credentials> {
        if let Some(creds) = self.current.read().unwrap().clone() {
            return Some(creds);
        }

        let loaded = self.load_from_disk().ok().flatten();
        if let Some(creds) = &loaded {
            *self.current.write().unwrap() = Some(creds.clone());
        }
        loaded
    }

    /// True when `username` matches the stored user and `password` is
    /// either the stored hash itself or hashes to it.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.local_auth() else {
            return false;
        };

        if username != stored.username {
            return false;
        }

        password == stored.password_hash || hash_password(password) == stored.password_hash
    }

    /// Replace the stored login. The password is hashed before it
    /// touches the disk.
    pub fn set_login(&self, username: &str, password: &str) -> Result<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(RelayError::Configuration(
                "Username and password must not be empty".to_string(),
            ));
        }

        let creds = Credentials {
            username: username.to_string(),
            password_hash: hash_password(password),
        };

        let content = format!(
            "{}=\"{}\"\n{}=\"{}\"\n",
            USER_KEY, creds.username, PASS_KEY, creds.password_hash
        );
        std::fs::write(&self.path, content)
            .map_err(|e| RelayError::Configuration(redact(&e.to_string(), password)))?;

        *self.current.write().unwrap() = Some(creds);
        Ok(())
    }

    /// Delete the stored login entirely.
    pub fn delete_login(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        *self.current.write().unwrap() = None;
        Ok(())
    }

    /// Re-read the backing file after an external change. Parse failure
    /// clears the snapshot so requests fail auth instead of passing on
    /// stale data.
    pub fn reload(&self) {
        match self.load_from_disk() {
            Ok(creds) => {
                *self.current.write().unwrap() = creds;
                tracing::info!("Reloaded login data from {}", self.path.display());
            }
            Err(e) => {
                tracing::warn!("Can't reload login data: {}", e);
                *self.current.write().unwrap() = None;
            }
        }
    }

    /// Start watching the backing file for external edits.
    pub fn spawn_watch(&self) -> Option<WatchedFile> {
        let handle = self.clone();
        match watch_file(&self.path, RELOAD_DEBOUNCE, move || handle.reload()) {
            Ok(watch) => Some(watch),
            Err(e) => {
                tracing::warn!("Credential watch disabled: {}", e);
                None
            }
        }
    }

    fn load_from_disk(&self) -> std::io::Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let mut username = None;
        let mut password_hash = None;

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                USER_KEY => username = Some(value),
                PASS_KEY => password_hash = Some(value),
                _ => {}
            }
        }

        match (username, password_hash) {
            (Some(user), Some(hash)) if !user.is_empty() && !hash.is_empty() => {
                Ok(Some(Credentials {
                    username: user,
                    password_hash: hash,
                }))
            }
            _ => Ok(None),
        }
    }
}

/// SHA-512 digest of the password, base64 encoded.
pub fn hash_password(password: &str) -> String {
    let digest = Sha512::digest(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Strip a plaintext password out of an error message before it can be
/// logged or shown.
fn redact(message: &str, secret: &str) -> String {
    if secret.is_empty() || !message.contains(secret) {
        return message.to_string();
    }
    message.replace(secret, "<redacted>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("credentials.env"))
    }

    #[test]
    fn hashing_is_deterministic_and_encoded() {
        let a = hash_password("hunter2");
        let b = hash_password("hunter2");
        assert_eq!(a, b);
        assert_ne!(a, hash_password("hunter3"));
        // SHA-512 digest is 64 bytes, 88 base64 characters
        assert_eq!(a.len(), 88);
    }

    #[test]
    fn verify_truth_table() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store_in(&temp);
        store.set_login("admin", "hunter2").unwrap();

        let stored_hash = hash_password("hunter2");

        // plaintext hashes to the stored hash
        assert!(store.verify("admin", "hunter2"));
        // an already-hashed value compares directly
        assert!(store.verify("admin", &stored_hash));
        // wrong user, wrong password
        assert!(!store.verify("someone", "hunter2"));
        assert!(!store.verify("admin", "wrong"));
        assert!(!store.verify("", ""));
    }

    #[test]
    fn init_fails_without_a_stored_pair() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store_in(&temp);

        let err = store.init().err().unwrap();
        assert!(matches!(err, RelayError::Configuration(_)));
        // the empty file was created so the next run can still load it
        assert!(temp.path().join("credentials.env").exists());
    }

    #[test]
    fn set_login_roundtrips_through_the_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store_in(&temp);
        store.set_login("admin", "secret").unwrap();

        // a fresh store over the same file sees the record
        let fresh = store_in(&temp);
        fresh.init().unwrap();
        let creds = fresh.local_auth().unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password_hash, hash_password("secret"));

        // the plaintext never lands on disk
        let raw = std::fs::read_to_string(temp.path().join("credentials.env")).unwrap();
        assert!(!raw.contains("secret"));
    }

    #[test]
    fn delete_login_denies_verification() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store_in(&temp);
        store.set_login("admin", "secret").unwrap();
        store.delete_login().unwrap();

        assert!(!store.verify("admin", "secret"));
        assert!(store.local_auth().is_none());
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = store_in(&temp);
        store.set_login("admin", "old").unwrap();

        // another process rewrites the file
        let other = store_in(&temp);
        other.set_login("admin", "new").unwrap();

        store.reload();
        assert!(store.verify("admin", "new"));
        assert!(!store.verify("admin", "old"));
    }

    #[test]
    fn redact_removes_the_secret() {
        assert_eq!(redact("No space left writing s3cret", "s3cret"), "No space left writing <redacted>");
        assert_eq!(redact("plain io error", "s3cret"), "plain io error");
    }
}
