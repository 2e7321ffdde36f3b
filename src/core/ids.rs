//! Purpose: Generate the random identifiers attached to outgoing requests.
//! Exports: `random_uuid`, `WindowId`.
//! Role: Window ids correlate one client instance; request ids key batch entries.
//! Invariants: Ids are RFC 4122 version-4 strings (lowercase hex, hyphenated).
//! Invariants: A `WindowId` is generated once and never mutated.

use crate::core::error::{Error, ErrorKind};
use std::fmt;
use std::fmt::Write as _;

pub fn random_uuid() -> Result<String, Error> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to read random bytes: {err}"))
    })?;
    Ok(format_uuid_v4(bytes))
}

fn format_uuid_v4(mut bytes: [u8; 16]) -> String {
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let mut out = String::with_capacity(36);
    for (index, byte) in bytes.iter().enumerate() {
        if matches!(index, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct WindowId(String);

impl WindowId {
    pub fn generate() -> Result<Self, Error> {
        random_uuid().map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for WindowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
