//! Scoped secret password value
//!
//! Passwords enter the derivation engine through [`Password`] so the
//! backing buffer is overwritten when the value goes out of scope and the
//! text can never end up in `Debug` output or logs.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A password held for string-to-key derivation
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
    /// Wrap a password string
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the password text
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

impl From<&str> for Password {
    fn from(secret: &str) -> Self {
        Self::new(secret)
    }
}

impl From<String> for Password {
    fn from(secret: String) -> Self {
        Self::new(secret)
    }
}
