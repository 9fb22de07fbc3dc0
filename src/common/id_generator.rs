// src/common/id_generator.rs
//! Crockford Base32 ID Generator
//!
//! Generates prefixed IDs using Crockford Base32 encoding.
//! Format: PREFIX_XXXXXXXXXXXX (e.g., U_K7NP3X8MWQT2 for users)

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Random characters in a user id (60 bits)
const USER_ID_LENGTH: usize = 12;

/// Random characters in a generation request id
const GENERATION_ID_LENGTH: usize = 10;

/// Entity type prefixes for ID generation
#[derive(Debug, Clone, Copy)]
pub enum EntityPrefix {
    /// User profile (U_)
    User,
    /// Generation request (G_), used for log correlation
    Generation,
}

impl EntityPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::User => "U",
            EntityPrefix::Generation => "G",
        }
    }
}

fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CROCKFORD_ALPHABET[rng.gen_range(0..32)] as char)
        .collect()
}

/// Generate a prefixed ID with the given number of random characters
pub fn generate_id(prefix: EntityPrefix, length: usize) -> String {
    format!("{}_{}", prefix.as_str(), generate_crockford_string(length))
}

/// Generate a User ID (U_XXXXXXXXXXXX)
pub fn generate_user_id() -> String {
    generate_id(EntityPrefix::User, USER_ID_LENGTH)
}

/// Generate a Generation request ID (G_XXXXXXXXXX)
pub fn generate_generation_id() -> String {
    generate_id(EntityPrefix::Generation, GENERATION_ID_LENGTH)
}
