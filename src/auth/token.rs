//! Opaque session tokens and the cookie that carries them.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// 256 bits from the OS-seeded thread RNG, base64url without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Only the digest is persisted, so a leaked sessions table holds no usable tokens.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn session_cookie(name: &str, token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(name.to_string(), token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(max_age_secs))
        .secure(secure)
        .finish()
}
