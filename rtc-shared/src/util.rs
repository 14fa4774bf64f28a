use rand::{Rng, rng};

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RUNES_ALPHA_NUMBER: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RUNES_ICE_CHAR: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789+/";

/// math_rand_alpha generates a mathematical random alphabet sequence of the requested length.
pub fn math_rand_alpha(n: usize) -> String {
    generate_crypto_random_string(n, RUNES_ALPHA)
}

/// math_rand_alpha_number generates a mathematical random alphabet and number sequence of the requested length.
pub fn math_rand_alpha_number(n: usize) -> String {
    generate_crypto_random_string(n, RUNES_ALPHA_NUMBER)
}

/// rand_ice_chars generates a sequence drawn from the ice-char alphabet of RFC 8839.
pub fn rand_ice_chars(n: usize) -> String {
    generate_crypto_random_string(n, RUNES_ICE_CHAR)
}

pub fn generate_crypto_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = rng();

    let rand_string: String = (0..n)
        .map(|_| {
            let idx = rng.random_range(0..runes.len());
            runes[idx] as char
        })
        .collect();

    rand_string
}

/// random_session_id returns a session id in [0, 2^63 - 1] as required by RFC 3264 section 5.
pub fn random_session_id() -> u64 {
    rng().random::<u64>() & (i64::MAX as u64)
}

/// random_ssrc returns a non-zero random 32 bit value.
pub fn random_ssrc() -> u32 {
    let mut rng = rng();
    loop {
        let v: u32 = rng.random();
        if v != 0 {
            return v;
        }
    }
}
