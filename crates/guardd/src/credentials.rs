use std::path::Path;

use anyhow::{Context, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::GuardError;

/// Proof that a username/password pair was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    username: String,
}

impl Authenticated {
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// The stored hash for a login attempt, fetched before verification so the
/// store lock is not held across the Argon2 computation.
///
/// Unknown users get the decoy hash; they take the same verification path
/// as a wrong password and fail the same way.
pub struct CredentialLookup {
    username: String,
    password_hash: String,
    known: bool,
}

impl CredentialLookup {
    pub fn verify(self, password: &str) -> Result<Authenticated, GuardError> {
        let parsed = PasswordHash::new(&self.password_hash).map_err(|e| {
            GuardError::internal(anyhow::anyhow!("stored password hash is malformed: {e}"))
        })?;

        let matched = Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();

        if matched && self.known {
            Ok(Authenticated {
                username: self.username,
            })
        } else {
            tracing::warn!(username = ?self.username, "login rejected");
            Err(GuardError::InvalidCredentials)
        }
    }
}

/// SQLite-backed credential table. Lookups are parameterized only.
pub struct CredentialStore {
    conn: Connection,
    decoy_hash: String,
}

impl CredentialStore {
    /// Open or create the credential database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open credential database at {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to set WAL journal mode")?;

        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
            );",
        )
        .context("failed to create users table")?;

        let decoy_hash = hash_password(&random_password(32))?;
        Ok(Self { conn, decoy_hash })
    }

    pub fn is_empty(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .context("failed to count users")?;
        Ok(count == 0)
    }

    /// Insert a user with a freshly salted Argon2id hash.
    pub fn add_user(&self, username: &str, password: &str) -> Result<()> {
        let hash = hash_password(password)?;
        self.conn
            .execute(
                "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
                params![username, hash],
            )
            .with_context(|| format!("failed to insert user {username:?}"))?;
        Ok(())
    }

    /// Fetch the hash for `username`, bound as a literal parameter.
    pub fn lookup(&self, username: &str) -> Result<CredentialLookup, GuardError> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| {
                GuardError::internal(anyhow::Error::new(e).context("credential lookup failed"))
            })?;

        let known = stored.is_some();
        Ok(CredentialLookup {
            username: username.to_string(),
            password_hash: stored.unwrap_or_else(|| self.decoy_hash.clone()),
            known,
        })
    }

    /// Remove a user. Used to roll back a failed bootstrap seed.
    pub fn remove_user(&self, username: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM users WHERE username = ?1", params![username])
            .with_context(|| format!("failed to remove user {username:?}"))?;
        Ok(())
    }

    #[cfg(test)]
    fn verify_blocking(&self, username: &str, password: &str) -> Result<Authenticated, GuardError> {
        self.lookup(username)?.verify(password)
    }
}

/// Verify a username/password pair against the shared store.
///
/// The store lock covers only the lookup; Argon2 runs on the blocking pool.
pub async fn verify_credentials(
    store: &Mutex<CredentialStore>,
    username: &str,
    password: String,
) -> Result<Authenticated, GuardError> {
    let lookup = {
        let store = store.lock().await;
        store.lookup(username)?
    };

    tokio::task::spawn_blocking(move || lookup.verify(&password))
        .await
        .map_err(GuardError::internal)?
}

/// Hash a password into a PHC string with a random 16-byte salt.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; 16];
    rand::rng().fill(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| anyhow::anyhow!("failed to encode salt: {e}"))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Random alphanumeric password for bootstrap seeding.
pub fn random_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
