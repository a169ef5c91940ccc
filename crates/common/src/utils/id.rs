use rand::{Rng, thread_rng};

use crate::constants::SUBDOMAIN_SLUG_LENGTH;

const SLUG_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random, URL-safe subdomain slug
/// Format: 5 characters drawn from lowercase letters and digits
pub fn generate_subdomain() -> String {
    let mut rng = thread_rng();
    (0..SUBDOMAIN_SLUG_LENGTH)
        .map(|_| char::from(SLUG_CHARSET[rng.gen_range(0..SLUG_CHARSET.len())]))
        .collect()
}
