//! At-rest protection for keytab blobs
//!
//! Wraps an opaque payload in a symmetric container bound to a named
//! scope. The scope secret comes from a [`ScopeKeyProvider`]; the default
//! provider keeps a random per-scope secret file on disk, created with
//! owner-only permissions. Caller-supplied entropy is mixed into the
//! wrapping key so a blob can additionally be bound to something the
//! filesystem does not hold.
//!
//! Container layout: `"KTPX"` magic, a format version byte, the scope tag,
//! a random 16-byte KDF salt, a random 12-byte nonce, then the AES-256-GCM
//! ciphertext. The payload is never interpreted.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use pbkdf2::pbkdf2_hmac;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use strum::{Display, EnumString};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

const WRAP_MAGIC: &[u8; 4] = b"KTPX";
const WRAP_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const SCOPE_SECRET_LEN: usize = 32;
const WRAP_KDF_ITERATIONS: u32 = 600_000;

/// Who can unwrap a protected blob
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
#[allow(clippy::exhaustive_enums)]
pub enum ProtectionScope {
    /// The invoking user
    #[strum(serialize = "current-user")]
    CurrentUser,
    /// Any user on this machine with access to the machine secret
    #[strum(serialize = "machine")]
    Machine,
}

impl ProtectionScope {
    fn tag(self) -> u8 {
        match self {
            Self::CurrentUser => 1,
            Self::Machine => 2,
        }
    }
}

/// Source of per-scope secrets, the boundary to the OS protection API
pub trait ScopeKeyProvider {
    /// The secret bound to `scope`, created on first use
    fn scope_secret(&self, scope: ProtectionScope) -> Result<Zeroizing<Vec<u8>>>;
}

/// Default provider: one random secret file per scope
///
/// `current-user` lives under the user's home directory, `machine` under
/// `/var/lib`. Secret files are created with owner-only permissions.
pub struct FileScopeKeyProvider {
    user_path: PathBuf,
    machine_path: PathBuf,
}

impl FileScopeKeyProvider {
    /// Provider with the platform default secret locations
    pub fn new() -> Result<Self> {
        let home = std::env::var_os("HOME").ok_or_else(|| Error::ProtectionError {
            cause: "cannot locate home directory for the current-user scope".to_owned(),
        })?;
        Ok(Self {
            user_path: PathBuf::from(home).join(".config/keytab/user.scope"),
            machine_path: PathBuf::from("/var/lib/keytab/machine.scope"),
        })
    }

    /// Provider keeping both scope secrets under one directory
    pub fn with_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            user_path: base.join("user.scope"),
            machine_path: base.join("machine.scope"),
        }
    }

    fn path_for(&self, scope: ProtectionScope) -> &Path {
        match scope {
            ProtectionScope::CurrentUser => &self.user_path,
            ProtectionScope::Machine => &self.machine_path,
        }
    }
}

impl ScopeKeyProvider for FileScopeKeyProvider {
    fn scope_secret(&self, scope: ProtectionScope) -> Result<Zeroizing<Vec<u8>>> {
        let path = self.path_for(scope);
        match fs::read(path) {
            Ok(secret) if secret.len() == SCOPE_SECRET_LEN => Ok(Zeroizing::new(secret)),
            Ok(_) => Err(Error::ProtectionError {
                cause: format!("scope secret {} has the wrong size", path.display()),
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                let mut secret = Zeroizing::new(vec![0u8; SCOPE_SECRET_LEN]);
                OsRng.fill_bytes(secret.as_mut_slice());
                write_secret_file(path, &secret)?;
                Ok(secret)
            }
            Err(error) => Err(Error::io(path, error)),
        }
    }
}

fn write_secret_file(path: &Path, secret: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| Error::io(parent, error))?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|error| Error::io(path, error))?;
    file.write_all(secret).map_err(|error| Error::io(path, error))
}

/// Wrap an opaque blob for `scope`
pub fn protect(
    blob: &[u8],
    scope: ProtectionScope,
    entropy: Option<&[u8]>,
    provider: &dyn ScopeKeyProvider,
) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = wrapping_key(scope, entropy, &salt, provider)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|cause| Error::ProtectionError {
        cause: cause.to_string(),
    })?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), blob)
        .map_err(|_| Error::ProtectionError {
            cause: "encryption failed".to_owned(),
        })?;

    let mut wrapped = Vec::with_capacity(WRAP_MAGIC.len() + 2 + SALT_LEN + NONCE_LEN + ciphertext.len());
    wrapped.extend_from_slice(WRAP_MAGIC);
    wrapped.push(WRAP_VERSION);
    wrapped.push(scope.tag());
    wrapped.extend_from_slice(&salt);
    wrapped.extend_from_slice(&nonce);
    wrapped.extend_from_slice(&ciphertext);
    Ok(wrapped)
}

/// Unwrap a blob previously produced by [`protect`]
pub fn unprotect(
    wrapped: &[u8],
    scope: ProtectionScope,
    entropy: Option<&[u8]>,
    provider: &dyn ScopeKeyProvider,
) -> Result<Vec<u8>> {
    let header_len = WRAP_MAGIC.len() + 2 + SALT_LEN + NONCE_LEN;
    if wrapped.len() < header_len || &wrapped[..4] != WRAP_MAGIC {
        return Err(Error::ProtectionError {
            cause: "not a protected keytab container".to_owned(),
        });
    }
    if wrapped[4] != WRAP_VERSION {
        return Err(Error::ProtectionError {
            cause: format!("unsupported container version {}", wrapped[4]),
        });
    }
    if wrapped[5] != scope.tag() {
        return Err(Error::ProtectionError {
            cause: format!("container was protected for a different scope, not {scope}"),
        });
    }
    let salt = &wrapped[6..6 + SALT_LEN];
    let nonce = &wrapped[6 + SALT_LEN..header_len];
    let ciphertext = &wrapped[header_len..];

    let key = wrapping_key(scope, entropy, salt, provider)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|cause| Error::ProtectionError {
        cause: cause.to_string(),
    })?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::ProtectionError {
            cause: "authentication failed: wrong scope secret, wrong entropy, or tampered data"
                .to_owned(),
        })
}

fn wrapping_key(
    scope: ProtectionScope,
    entropy: Option<&[u8]>,
    salt: &[u8],
    provider: &dyn ScopeKeyProvider,
) -> Result<Zeroizing<[u8; 32]>> {
    let secret = provider.scope_secret(scope)?;
    let mut input = Zeroizing::new(secret.to_vec());
    if let Some(entropy) = entropy {
        input.extend_from_slice(entropy);
    }
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(&input, salt, WRAP_KDF_ITERATIONS, key.as_mut_slice());
    Ok(key)
}

/// Narrow a file's permissions to its owner
///
/// Returns `Ok(None)` when permissions were tightened, or `Ok(Some(warning))`
/// on platforms without discretionary ACL support.
pub fn restrict_acl(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|error| Error::io(path, error))?;
        Ok(None)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(Some(
            "this platform does not support restricting file ACLs; permissions unchanged"
                .to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> (tempfile::TempDir, FileScopeKeyProvider) {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileScopeKeyProvider::with_base(dir.path());
        (dir, provider)
    }

    #[test]
    fn wrap_round_trips() {
        let (_dir, provider) = provider();
        let blob = b"\x05\x02 pretend keytab";
        let wrapped = protect(blob, ProtectionScope::CurrentUser, None, &provider).unwrap();
        assert_ne!(wrapped, blob.to_vec());
        let unwrapped =
            unprotect(&wrapped, ProtectionScope::CurrentUser, None, &provider).unwrap();
        assert_eq!(unwrapped, blob.to_vec());
    }

    #[test]
    fn entropy_is_part_of_the_key() {
        let (_dir, provider) = provider();
        let wrapped = protect(
            b"payload",
            ProtectionScope::CurrentUser,
            Some(b"extra"),
            &provider,
        )
        .unwrap();
        assert!(
            unprotect(&wrapped, ProtectionScope::CurrentUser, None, &provider).is_err()
        );
        assert!(
            unprotect(
                &wrapped,
                ProtectionScope::CurrentUser,
                Some(b"wrong"),
                &provider
            )
            .is_err()
        );
        let unwrapped = unprotect(
            &wrapped,
            ProtectionScope::CurrentUser,
            Some(b"extra"),
            &provider,
        )
        .unwrap();
        assert_eq!(unwrapped, b"payload".to_vec());
    }

    #[test]
    fn scope_mismatch_is_rejected() {
        let (_dir, provider) = provider();
        let wrapped = protect(b"payload", ProtectionScope::Machine, None, &provider).unwrap();
        let result = unprotect(&wrapped, ProtectionScope::CurrentUser, None, &provider);
        assert!(matches!(result, Err(Error::ProtectionError { .. })));
    }

    #[test]
    fn tampering_is_detected() {
        let (_dir, provider) = provider();
        let mut wrapped =
            protect(b"payload", ProtectionScope::CurrentUser, None, &provider).unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0x01;
        let result = unprotect(&wrapped, ProtectionScope::CurrentUser, None, &provider);
        assert!(matches!(result, Err(Error::ProtectionError { .. })));
    }

    #[test]
    fn garbage_is_not_a_container() {
        let (_dir, provider) = provider();
        let result = unprotect(b"\x05\x02", ProtectionScope::CurrentUser, None, &provider);
        assert!(matches!(result, Err(Error::ProtectionError { .. })));
    }

    #[test]
    fn scope_secret_is_stable_across_calls() {
        let (_dir, provider) = provider();
        let first = provider.scope_secret(ProtectionScope::CurrentUser).unwrap();
        let second = provider.scope_secret(ProtectionScope::CurrentUser).unwrap();
        assert_eq!(first, second);
        let machine = provider.scope_secret(ProtectionScope::Machine).unwrap();
        assert_ne!(first, machine);
    }

    #[cfg(unix)]
    #[test]
    fn restrict_acl_narrows_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.keytab");
        fs::write(&path, b"data").unwrap();
        assert_eq!(restrict_acl(&path).unwrap(), None);
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
