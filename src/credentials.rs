//! Credential store
//!
//! Maps usernames to SHA-256 password digests. Loaded once at startup from a
//! plain text file with one `username:hex-digest` entry per line, and
//! read-only for the rest of the server's lifetime.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::AppError;

/// Account written when no credential file exists yet.
///
/// Not a hardened default: it exists so a fresh install can log in at all.
pub const DEFAULT_USERNAME: &str = "aiba";
pub const DEFAULT_PASSWORD: &str = "123";

/// Length of a hex-encoded SHA-256 digest
const DIGEST_HEX_LEN: usize = 64;

/// Immutable username → verifier mapping
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    entries: HashMap<String, String>,
}

impl Credentials {
    /// Load credentials from `path`, seeding the default account if the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let unreadable = |reason: String| AppError::StoreUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let seed = format!(
                    "{}:{}\n",
                    DEFAULT_USERNAME,
                    password_digest(DEFAULT_PASSWORD)
                );
                fs::write(path, &seed).map_err(|e| unreadable(e.to_string()))?;
                info!(
                    "Seeded credential store {} with default account '{}'",
                    path.display(),
                    DEFAULT_USERNAME
                );
                seed
            }
            Err(e) => return Err(unreadable(e.to_string())),
        };

        let credentials = Self::parse(&contents).map_err(unreadable)?;
        info!(
            "Loaded {} account(s) from {}",
            credentials.len(),
            path.display()
        );
        Ok(credentials)
    }

    /// Parse the persisted format
    ///
    /// Blank lines are skipped. Any other malformed line, or a repeated
    /// username, fails the whole parse with a reason naming the line.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let mut entries = HashMap::new();

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let Some((username, digest)) = line.split_once(':') else {
                return Err(format!("line {line_no}: missing ':' separator"));
            };
            if username.is_empty() {
                return Err(format!("line {line_no}: empty username"));
            }
            if digest.contains(':') {
                return Err(format!("line {line_no}: too many ':' separators"));
            }
            if digest.len() != DIGEST_HEX_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(format!("line {line_no}: digest is not {DIGEST_HEX_LEN} hex characters"));
            }
            if entries
                .insert(username.to_string(), digest.to_ascii_lowercase())
                .is_some()
            {
                return Err(format!("line {line_no}: duplicate username '{username}'"));
            }
        }

        Ok(Self { entries })
    }

    /// Build a store from plaintext `(username, password)` pairs
    pub fn from_entries<'a, I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let entries = accounts
            .into_iter()
            .map(|(user, password)| (user.to_string(), password_digest(password)))
            .collect();
        Self { entries }
    }

    /// Check a password against the stored verifier for `username`
    ///
    /// Returns false for unknown usernames; never errors.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.entries.get(username) else {
            return false;
        };
        constant_time_eq(password_digest(password).as_bytes(), stored.as_bytes())
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase hex SHA-256 of a password
pub fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
