//! Kerberos encryption type registry
//!
//! Enumerates the encryption types the derivation path supports, together
//! with their key sizes, PBKDF2 hash functions, and default iteration
//! counts. Etype codes outside this set survive a keytab read verbatim but
//! cannot be produced from a password.

use strum::{Display, EnumIter, EnumString};

/// Hash function an etype uses for PBKDF2
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum S2kHash {
    /// HMAC-SHA-1 (RFC 3962)
    Sha1,
    /// HMAC-SHA-256 (RFC 8009)
    Sha256,
    /// HMAC-SHA-384 (RFC 8009)
    Sha384,
}

/// Kerberos encryption type supported by the derivation path
// Codes from the IANA Kerberos encryption type registry
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[allow(clippy::exhaustive_enums)]
#[repr(u16)]
pub enum Etype {
    /// aes128-cts-hmac-sha1-96 (RFC 3962)
    #[strum(serialize = "17", serialize = "aes128-cts-hmac-sha1-96")]
    Aes128CtsHmacSha196 = 17,
    /// aes256-cts-hmac-sha1-96 (RFC 3962)
    #[strum(serialize = "18", serialize = "aes256-cts-hmac-sha1-96")]
    Aes256CtsHmacSha196 = 18,
    /// aes128-cts-hmac-sha256-128 (RFC 8009)
    #[strum(serialize = "19", serialize = "aes128-cts-hmac-sha256-128")]
    Aes128CtsHmacSha256128 = 19,
    /// aes256-cts-hmac-sha384-192 (RFC 8009)
    #[strum(serialize = "20", serialize = "aes256-cts-hmac-sha384-192")]
    Aes256CtsHmacSha384192 = 20,
    /// rc4-hmac, legacy (RFC 4757)
    #[strum(serialize = "23", serialize = "rc4-hmac")]
    Rc4Hmac = 23,
}

/// Etypes requested when the caller does not specify any
pub const DEFAULT_ETYPES: [Etype; 2] = [Etype::Aes128CtsHmacSha196, Etype::Aes256CtsHmacSha196];

impl Etype {
    /// Look up an etype by its numeric code
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            17 => Some(Self::Aes128CtsHmacSha196),
            18 => Some(Self::Aes256CtsHmacSha196),
            19 => Some(Self::Aes128CtsHmacSha256128),
            20 => Some(Self::Aes256CtsHmacSha384192),
            23 => Some(Self::Rc4Hmac),
            _ => None,
        }
    }

    /// Numeric etype code
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Length in bytes of a key of this etype
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128CtsHmacSha196 | Self::Aes128CtsHmacSha256128 | Self::Rc4Hmac => 16,
            Self::Aes256CtsHmacSha196 | Self::Aes256CtsHmacSha384192 => 32,
        }
    }

    /// Hash function used for PBKDF2, if this etype is password-derivable
    /// through PBKDF2 at all
    pub fn s2k_hash(self) -> Option<S2kHash> {
        match self {
            Self::Aes128CtsHmacSha196 | Self::Aes256CtsHmacSha196 => Some(S2kHash::Sha1),
            Self::Aes128CtsHmacSha256128 => Some(S2kHash::Sha256),
            Self::Aes256CtsHmacSha384192 => Some(S2kHash::Sha384),
            Self::Rc4Hmac => None,
        }
    }

    /// Default PBKDF2 iteration count, `None` for etypes that do not iterate
    pub fn default_iterations(self) -> Option<u32> {
        match self {
            Self::Aes128CtsHmacSha196 | Self::Aes256CtsHmacSha196 => Some(4096),
            Self::Aes128CtsHmacSha256128 | Self::Aes256CtsHmacSha384192 => Some(32768),
            Self::Rc4Hmac => None,
        }
    }

    /// Whether this etype is considered legacy and gated behind
    /// `include_legacy_rc4`
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::Rc4Hmac)
    }

    /// Salt prefix the RFC 8009 etypes mix into PBKDF2
    ///
    /// RFC 8009 §4 derives from `enctype-name || 0x00 || salt` rather than
    /// the bare salt. Returns `None` for etypes that use the salt as-is.
    pub fn s2k_salt_prefix(self) -> Option<&'static str> {
        match self {
            Self::Aes128CtsHmacSha256128 => Some("aes128-cts-hmac-sha256-128"),
            Self::Aes256CtsHmacSha384192 => Some("aes256-cts-hmac-sha384-192"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn codes_round_trip() {
        for etype in Etype::iter() {
            assert_eq!(Etype::from_code(etype.code()), Some(etype));
        }
        assert_eq!(Etype::from_code(3), None);
        assert_eq!(Etype::from_code(0), None);
    }

    #[test]
    fn parses_names_and_codes() {
        assert_eq!(
            "aes256-cts-hmac-sha1-96".parse::<Etype>().unwrap(),
            Etype::Aes256CtsHmacSha196
        );
        assert_eq!("18".parse::<Etype>().unwrap(), Etype::Aes256CtsHmacSha196);
        assert_eq!("23".parse::<Etype>().unwrap(), Etype::Rc4Hmac);
        assert!("des-cbc-crc".parse::<Etype>().is_err());
    }

    #[test]
    fn display_uses_iana_names() {
        assert_eq!(
            Etype::Aes128CtsHmacSha256128.to_string(),
            "aes128-cts-hmac-sha256-128"
        );
        assert_eq!(Etype::Rc4Hmac.to_string(), "rc4-hmac");
    }

    #[test]
    fn key_lengths_and_iterations() {
        assert_eq!(Etype::Aes128CtsHmacSha196.key_len(), 16);
        assert_eq!(Etype::Aes256CtsHmacSha196.key_len(), 32);
        assert_eq!(Etype::Aes256CtsHmacSha384192.key_len(), 32);
        assert_eq!(Etype::Rc4Hmac.key_len(), 16);
        assert_eq!(Etype::Aes256CtsHmacSha196.default_iterations(), Some(4096));
        assert_eq!(
            Etype::Aes128CtsHmacSha256128.default_iterations(),
            Some(32768)
        );
        assert_eq!(Etype::Rc4Hmac.default_iterations(), None);
        assert!(Etype::Rc4Hmac.is_legacy());
        assert!(!Etype::Aes256CtsHmacSha196.is_legacy());
    }
}
