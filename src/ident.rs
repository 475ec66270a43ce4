//! Upload token generation
//!
//! Every submission gets one token that namespaces both of its stored
//! objects. Tokens carry 128 random bits (a v4 UUID) re-encoded in base 36,
//! so they are short, lowercase, and say nothing about who asked for them.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque token shared by the objects of one submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UploadToken(String);

impl fmt::Display for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a fresh token
pub fn generate() -> UploadToken {
    UploadToken(encode_base36(Uuid::new_v4().as_u128()))
}

fn encode_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::with_capacity(25);
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();

    // Only ASCII from ALPHABET ever lands in `digits`
    digits.into_iter().map(char::from).collect()
}
