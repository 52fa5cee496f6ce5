//! # Password Generation

use rand::Rng;

/// Letters and digits without look-alikes (no I, O, i, o, 0, 1)
pub const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjklmnpqrstuvwxyz23456789";

pub const PASSWORD_LENGTH: usize = 15;

/// Random password of [`PASSWORD_LENGTH`] characters from [`PASSWORD_ALPHABET`]
pub fn generate_password() -> String {
    generate_password_with_length(PASSWORD_LENGTH)
}

pub fn generate_password_with_length(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(PASSWORD_ALPHABET[rng.random_range(0..PASSWORD_ALPHABET.len())]))
        .collect()
}
