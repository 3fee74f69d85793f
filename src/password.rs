//! Password hashing with Argon2id.
//!
//! Hashing is CPU and memory heavy, so both operations run on the blocking pool.

use std::sync::LazyLock;

/// Treat as constant, the configuration for the Argon2 hashing algorithm.
fn hash_config() -> argon2::Config<'static> {
    argon2::Config {
        mem_cost: 8 * 1024, // 8 MiB
        variant: argon2::Variant::Argon2id,
        lanes: 1,
        time_cost: 3,
        hash_length: 32,
        ..argon2::Config::default()
    }
}

static HASH_CONFIG: LazyLock<argon2::Config<'static>> = LazyLock::new(hash_config);

/// Hash a password into an encoded Argon2 string (salt included).
pub async fn hash_password(password: &str) -> Result<String, PasswordError> {
    let password = password.to_owned();

    tokio::task::spawn_blocking(move || {
        let mut salt = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut salt);
        argon2::hash_encoded(password.as_bytes(), &salt, &HASH_CONFIG)
    })
    .await
    .map_err(|_| PasswordError::TaskFailed)?
    .map_err(PasswordError::Hash)
}

/// Check a password against an encoded hash.
pub async fn verify_password(encoded: &str, password: &str) -> Result<bool, PasswordError> {
    let encoded = encoded.to_owned();
    let password = password.to_owned();

    tokio::task::spawn_blocking(move || argon2::verify_encoded(&encoded, password.as_bytes()))
        .await
        .map_err(|_| PasswordError::TaskFailed)?
        .map_err(PasswordError::Hash)
}

#[derive(Debug)]
pub enum PasswordError {
    /// Argon2 rejected the input or the stored hash is malformed
    Hash(argon2::Error),
    /// The blocking task panicked or was cancelled
    TaskFailed,
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Hash(e) => write!(f, "Password hashing failed: {}", e),
            PasswordError::TaskFailed => write!(f, "Password hashing task failed"),
        }
    }
}

impl std::error::Error for PasswordError {}
