use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GROUP_LENS: [usize; 3] = [3, 3, 4];

/// Customer-facing lookup code in the canonical `XXX-XXX-XXXX` form
/// (uppercase alphanumerics). Used for unauthenticated tracking lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    /// Generates a fresh code from random bytes.
    pub fn generate() -> Self {
        let bytes = *Uuid::new_v4().as_bytes();
        let mut out = String::with_capacity(12);

        let mut idx = 0;
        for (group, len) in GROUP_LENS.iter().enumerate() {
            if group > 0 {
                out.push('-');
            }
            for _ in 0..*len {
                let b = bytes[idx] as usize % ALPHABET.len();
                out.push(ALPHABET[b] as char);
                idx += 1;
            }
        }

        Self(out)
    }

    /// Parses user input, normalizing case. Rejects anything that is not
    /// three hyphen-separated alphanumeric groups of lengths 3-3-4.
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let normalized = input.trim().to_ascii_uppercase();
        let groups: Vec<&str> = normalized.split('-').collect();

        let shape_ok = groups.len() == GROUP_LENS.len()
            && groups
                .iter()
                .zip(GROUP_LENS)
                .all(|(g, len)| g.len() == len && g.bytes().all(|b| b.is_ascii_alphanumeric()));

        if !shape_ok {
            return Err(AppError::BadRequest(format!(
                "invalid tracking code format: {input}"
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
