// ABOUTME: Shared-secret comparison and random handshake token generation.
// ABOUTME: Used by the webhook gate and the OAuth connect flow.

use rand::Rng;

/// Length of generated handshake tokens (lowercase hex chars)
pub const TOKEN_HEX_LEN: usize = 32;

/// Generate a random lowercase hex token
pub fn generate_state_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_HEX_LEN)
        .map(|_| format!("{:x}", rng.gen::<u8>() & 0xf))
        .collect()
}

/// Constant-time byte comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// True only when a secret is configured and the provided one matches it
pub fn secret_matches(configured: &str, provided: &str) -> bool {
    !configured.is_empty() && constant_time_eq(configured.as_bytes(), provided.as_bytes())
}
