//! Password hashing: PBKDF2-HMAC-SHA256 with a random per-user salt.
//!
//! Stored format: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;

pub const PBKDF2_ITERATIONS: u32 = if cfg!(test) { 1_000 } else { 600_000 };

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt, PBKDF2_ITERATIONS);
    format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    )
}

/// Constant-time check of `password` against a stored hash.
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((iterations, salt, expected)) = parse(stored) else {
        return false;
    };
    let actual = derive(password, &salt, iterations);
    actual.ct_eq(&expected).into()
}

/// Spend the same work as a real verification, for unknown accounts.
pub fn burn_verification(password: &str) {
    let _ = derive(password, &[0u8; SALT_LENGTH], PBKDF2_ITERATIONS);
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn parse(stored: &str) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    let mut parts = stored.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let iterations: u32 = parts.next()?.parse().ok().filter(|n| *n > 0)?;
    let salt = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
    let hash = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
    if parts.next().is_some() || hash.len() != HASH_LENGTH {
        return None;
    }
    Some((iterations, salt, hash))
}
