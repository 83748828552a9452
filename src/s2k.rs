//! String-to-key derivation
//!
//! Turns a password and salt into a long-term Kerberos key for a given
//! encryption type:
//!
//! - AES-SHA1 etypes (17, 18): PBKDF2-HMAC-SHA-1 followed by the RFC 3961
//!   DK/DR construction over the n-folded `"kerberos"` constant (RFC 3962).
//! - AES-SHA2 etypes (19, 20): PBKDF2-HMAC-SHA-256/384 over
//!   `enctype-name || 0x00 || salt`, then the HMAC-based KDF of RFC 8009 §3.
//! - rc4-hmac (23): MD4 of the UTF-16LE password; salt and iteration count
//!   are ignored.
//!
//! Intermediate keying material lives in [`Zeroizing`] buffers and is
//! overwritten before release. Nothing in this module logs key bytes.

use std::fmt;

use aes::{
    Aes128, Aes256,
    cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray},
};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha384};
use zeroize::Zeroizing;

use crate::{
    error::{Error, Result},
    etype::{Etype, S2kHash},
    secret::Password,
};

/// Key-derivation constant for the final DK step (RFC 3961 §5.3)
const KERBEROS_CONSTANT: &[u8] = b"kerberos";

/// A derived or externally supplied long-term key
///
/// Length always matches the declaring etype. The buffer is zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Key(Zeroizing<Vec<u8>>);

impl Key {
    /// Wrap raw key bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Borrow the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the key in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty (never true for derived keys)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex rendering, for `--reveal-keys` output only
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_slice())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(<{} bytes>)", self.0.len())
    }
}

/// Derive the long-term key for `etype` from a password and salt
///
/// `iterations` overrides the etype's default PBKDF2 iteration count; pass
/// `None` to use the default. A zero override is rejected. Deterministic:
/// equal inputs always produce equal keys.
pub fn derive(
    password: &Password,
    salt: &[u8],
    etype: Etype,
    iterations: Option<u32>,
) -> Result<Key> {
    let hash = match etype.s2k_hash() {
        Some(hash) => hash,
        None => return rc4_string_to_key(password),
    };
    let iterations = match iterations {
        Some(0) => return Err(Error::InvalidIterationCount),
        Some(n) => n,
        // etypes with a PBKDF2 hash always declare a default
        None => etype
            .default_iterations()
            .ok_or(Error::UnsupportedEtype { code: etype.code() })?,
    };

    let key_len = etype.key_len();
    let salt = build_salt(etype, salt);
    let mut tkey = Zeroizing::new(vec![0u8; key_len]);
    let password = password.as_str().as_bytes();
    match hash {
        S2kHash::Sha1 => {
            pbkdf2_hmac::<Sha1>(password, &salt, iterations, tkey.as_mut_slice());
        }
        S2kHash::Sha256 => {
            pbkdf2_hmac::<Sha256>(password, &salt, iterations, tkey.as_mut_slice());
        }
        S2kHash::Sha384 => {
            pbkdf2_hmac::<Sha384>(password, &salt, iterations, tkey.as_mut_slice());
        }
    }

    match hash {
        S2kHash::Sha1 => Ok(Key::new(dk_aes(&tkey, key_len))),
        S2kHash::Sha256 | S2kHash::Sha384 => kdf_hmac_sha2(&tkey, key_len, hash),
    }
}

/// Assemble the PBKDF2 salt, prefixing the enctype name for RFC 8009 etypes
fn build_salt(etype: Etype, salt: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(salt.len() + 32));
    if let Some(prefix) = etype.s2k_salt_prefix() {
        out.extend_from_slice(prefix.as_bytes());
        out.push(0);
    }
    out.extend_from_slice(salt);
    out
}

/// RFC 3961 DK: AES-ECB chain over the n-folded constant
fn dk_aes(tkey: &[u8], key_len: usize) -> Vec<u8> {
    let mut block = [0u8; 16];
    block.copy_from_slice(&n_fold(KERBEROS_CONSTANT, 16));
    let mut out = Vec::with_capacity(key_len);
    while out.len() < key_len {
        aes_encrypt_block(tkey, &mut block);
        out.extend_from_slice(&block);
    }
    block.fill(0);
    out.truncate(key_len);
    out
}

fn aes_encrypt_block(tkey: &[u8], block: &mut [u8; 16]) {
    let mut chunk = GenericArray::clone_from_slice(block);
    match tkey.len() {
        16 => Aes128::new(GenericArray::from_slice(tkey)).encrypt_block(&mut chunk),
        // the registry only declares 16- and 32-byte AES keys
        _ => Aes256::new(GenericArray::from_slice(tkey)).encrypt_block(&mut chunk),
    }
    block.copy_from_slice(&chunk);
}

/// RFC 8009 §3 KDF-HMAC-SHA2 with label `"kerberos"`
fn kdf_hmac_sha2(tkey: &[u8], key_len: usize, hash: S2kHash) -> Result<Key> {
    let k_bits = (key_len as u32) * 8;
    let digest: Zeroizing<Vec<u8>> = match hash {
        S2kHash::Sha256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(tkey)
                .map_err(|cause| Error::DerivationFailed {
                    cause: cause.to_string(),
                })?;
            mac.update(&1u32.to_be_bytes());
            mac.update(KERBEROS_CONSTANT);
            mac.update(&[0]);
            mac.update(&k_bits.to_be_bytes());
            Zeroizing::new(mac.finalize().into_bytes().to_vec())
        }
        S2kHash::Sha384 => {
            let mut mac = <Hmac<Sha384> as Mac>::new_from_slice(tkey)
                .map_err(|cause| Error::DerivationFailed {
                    cause: cause.to_string(),
                })?;
            mac.update(&1u32.to_be_bytes());
            mac.update(KERBEROS_CONSTANT);
            mac.update(&[0]);
            mac.update(&k_bits.to_be_bytes());
            Zeroizing::new(mac.finalize().into_bytes().to_vec())
        }
        S2kHash::Sha1 => {
            return Err(Error::DerivationFailed {
                cause: "SHA-1 etypes use the DK construction".to_owned(),
            });
        }
    };
    Ok(Key::new(digest[..key_len].to_vec()))
}

/// RC4-HMAC string-to-key: MD4 over the UTF-16LE password (RFC 4757)
fn rc4_string_to_key(password: &Password) -> Result<Key> {
    let mut utf16 = Zeroizing::new(Vec::with_capacity(password.as_str().len() * 2));
    for unit in password.as_str().encode_utf16() {
        utf16.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(Key::new(Md4::digest(utf16.as_slice()).to_vec()))
}

/// RFC 3961 §5.1 n-fold
///
/// Stretches `input` to `out_len` bytes by concatenating rotated copies and
/// summing with ones-complement (end-around carry) addition.
pub(crate) fn n_fold(input: &[u8], out_len: usize) -> Vec<u8> {
    let in_len = input.len();
    let lcm = in_len / gcd(in_len, out_len) * out_len;
    let mut out = vec![0u8; out_len];
    let mut carry = 0usize;
    for i in (0..lcm).rev() {
        // most significant bit of the rotated copy that lands on byte i
        let msbit = ((in_len << 3) - 1
            + (((in_len << 3) + 13) * (i / in_len))
            + ((in_len - (i % in_len)) << 3))
            % (in_len << 3);
        carry += ((((input[(in_len - 1 - (msbit >> 3)) % in_len] as usize) << 8)
            | (input[(in_len - (msbit >> 3)) % in_len] as usize))
            >> ((msbit & 7) + 1))
            & 0xff;
        carry += out[i % out_len] as usize;
        out[i % out_len] = (carry & 0xff) as u8;
        carry >>= 8;
    }
    if carry != 0 {
        for i in (0..out_len).rev() {
            carry += out[i] as usize;
            out[i] = (carry & 0xff) as u8;
            carry >>= 8;
            if carry == 0 {
                break;
            }
        }
    }
    out
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    // RFC 3961 appendix A.1
    #[test]
    fn n_fold_rfc3961_vectors() {
        assert_eq!(n_fold(b"012345", 8), hex!("be072631276b1955"));
        assert_eq!(n_fold(b"password", 7), hex!("78a07b6caf85fa"));
        assert_eq!(
            n_fold(b"Rough Consensus, and Running Code", 8),
            hex!("bb6ed30870b7f0e0")
        );
        assert_eq!(
            n_fold(b"password", 21),
            hex!("59e4a8ca7c0385c3c37b3f6d2000247cb6e6bd5b3e")
        );
        assert_eq!(n_fold(b"kerberos", 8), hex!("6b65726265726f73"));
        assert_eq!(
            n_fold(b"kerberos", 16),
            hex!("6b65726265726f737b9b5b2b93132b93")
        );
        assert_eq!(
            n_fold(b"kerberos", 32),
            hex!("6b65726265726f737b9b5b2b93132b935c9bdcdad95c9899c4cae4dee6d6cae4")
        );
    }

    // RFC 3962 appendix B
    #[test]
    fn aes_sha1_rfc3962_vectors() {
        let password = Password::new("password");
        let salt = b"ATHENA.MIT.EDUraeburn";

        let key = derive(&password, salt, Etype::Aes128CtsHmacSha196, Some(1)).unwrap();
        assert_eq!(key.as_bytes(), hex!("42263c6e89f4fc28b8df68ee09799f15"));

        let key = derive(&password, salt, Etype::Aes256CtsHmacSha196, Some(1)).unwrap();
        assert_eq!(
            key.as_bytes(),
            hex!("fe697b52bc0d3ce14432ba036a92e65bbb52280990a2fa27883998d72af30161")
        );

        let key = derive(&password, salt, Etype::Aes128CtsHmacSha196, Some(2)).unwrap();
        assert_eq!(key.as_bytes(), hex!("c651bf29e2300ac27fa469d693bdda13"));

        let key = derive(&password, salt, Etype::Aes256CtsHmacSha196, Some(2)).unwrap();
        assert_eq!(
            key.as_bytes(),
            hex!("a2e16d16b36069c135d5e9d2e25f896102685618b95914b467c67622225824ff")
        );

        let key = derive(&password, salt, Etype::Aes128CtsHmacSha196, Some(1200)).unwrap();
        assert_eq!(key.as_bytes(), hex!("4c01cd46d632d01e6dbe230a01ed642a"));

        let key = derive(&password, salt, Etype::Aes256CtsHmacSha196, Some(1200)).unwrap();
        assert_eq!(
            key.as_bytes(),
            hex!("55a6ac740ad17b4846941051e1e8b0a7548d93b0ab30a8bc3ff16280382b8c2a")
        );
    }

    // RFC 8009 appendix A
    #[test]
    fn aes_sha2_rfc8009_vectors() {
        let password = Password::new("password");
        let mut salt = hex!("10df9dd783e5bc8acea1730e74355f61").to_vec();
        salt.extend_from_slice(b"ATHENA.MIT.EDUraeburn");

        let key = derive(&password, &salt, Etype::Aes128CtsHmacSha256128, Some(32768)).unwrap();
        assert_eq!(key.as_bytes(), hex!("089bca48b105ea6ea77ca5d2f39dc5e7"));

        let key = derive(&password, &salt, Etype::Aes256CtsHmacSha384192, Some(32768)).unwrap();
        assert_eq!(
            key.as_bytes(),
            hex!("45bd806dbf6a833a9cffc1c94589a222367a79bc21c413718906e9f578a78467")
        );
    }

    #[test]
    fn rc4_md4_of_utf16le_password() {
        let key = derive(&Password::new("password"), b"ignored", Etype::Rc4Hmac, None).unwrap();
        assert_eq!(key.as_bytes(), hex!("8846f7eaee8fb117ad06bdd830b7586c"));

        // salt and iteration count do not participate
        let other = derive(
            &Password::new("password"),
            b"different-salt",
            Etype::Rc4Hmac,
            Some(99),
        )
        .unwrap();
        assert_eq!(key, other);
    }

    #[test]
    fn zero_iterations_rejected() {
        let result = derive(
            &Password::new("pw"),
            b"salt",
            Etype::Aes256CtsHmacSha196,
            Some(0),
        );
        assert!(matches!(result, Err(Error::InvalidIterationCount)));
    }

    #[test]
    fn derivation_is_deterministic() {
        let password = Password::new("P@ssw0rd!");
        let salt = b"EXAMPLE.COMhttpweb01.example.com";
        let a = derive(&password, salt, Etype::Aes128CtsHmacSha196, None).unwrap();
        let b = derive(&password, salt, Etype::Aes128CtsHmacSha196, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), Etype::Aes128CtsHmacSha196.key_len());
    }

    #[test]
    fn default_iterations_match_explicit() {
        let password = Password::new("password");
        let salt = b"EXAMPLE.COMuser1";
        let implicit = derive(&password, salt, Etype::Aes256CtsHmacSha196, None).unwrap();
        let explicit = derive(&password, salt, Etype::Aes256CtsHmacSha196, Some(4096)).unwrap();
        assert_eq!(implicit, explicit);
    }
}
