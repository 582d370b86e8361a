//! Subsonic token authentication.
//!
//! Every request carries `u` (user), `t = md5(password + salt)` and `s`
//! (salt). A fresh salt is generated per request so tokens are not
//! replayable across calls.

use md5::{Digest, Md5};
use rand::Rng;
use rand::distr::Alphanumeric;

/// Salt length used for each request.
pub const SALT_LEN: usize = 12;

/// Lowercase hex md5 of `password + salt`.
pub fn token(password: &str, salt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Random alphanumeric salt.
pub fn salt() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}
