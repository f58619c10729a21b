//! Short identifier generation.
//!
//! Organization and webhook ids are 12-character strings over a lowercase
//! alphanumeric alphabet; webhook secrets use 24 characters. Uniqueness is
//! probabilistic (birthday bound of the alphabet/length pair) and collisions
//! are not checked.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of organization and webhook ids.
pub const ID_LEN: usize = 12;

/// Length of webhook secret keys.
pub const SECRET_LEN: usize = 24;

/// Generate a random id of `len` characters over `0-9a-z`.
pub fn short_id(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        assert_eq!(short_id(ID_LEN).len(), 12);
        assert_eq!(short_id(SECRET_LEN).len(), 24);
    }

    #[test]
    fn stays_within_alphabet() {
        let id = short_id(200);
        assert!(id
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn ids_differ_between_calls() {
        // Not a uniqueness guarantee, just a sanity check that the generator
        // is not returning a constant.
        assert_ne!(short_id(ID_LEN), short_id(ID_LEN));
    }
}
