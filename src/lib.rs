//! MIT-format Kerberos keytab engine
//!
//! Produces, parses, inspects, compares, merges, and protects keytab files
//! in the MIT 0x0502 format, byte-compatible with MIT krb5, Heimdal, and
//! Active Directory consumers. Keys are derived from passwords per
//! RFC 3962 (AES-SHA1), RFC 8009 (AES-SHA2), and RFC 4757 (legacy
//! rc4-hmac), or ingested as raw bytes from a directory-replication
//! source.
//!
//! ```
//! use keytab::{Etype, KeytabBuilder, Password, Principal};
//!
//! fn example() -> keytab::error::Result<()> {
//!     let principal = Principal::parse("host/srv.example.com@EXAMPLE.COM")?;
//!     let keytab = KeytabBuilder::from_password(principal, Password::new("hunter2"))
//!         .etypes([Etype::Aes256CtsHmacSha196])
//!         .kvno(3)
//!         .build()?;
//!     let bytes = keytab.to_bytes(&Default::default())?;
//!     assert_eq!(&bytes[..2], &[0x05, 0x02]);
//!     Ok(())
//! }
//! example().unwrap();
//! ```
//!
//! All operations are pure functions of their inputs apart from file I/O
//! and the wall-clock read that defaults entry timestamps; the latter can
//! be pinned through the `KEYTAB_TIMESTAMP` environment variable. `Keytab`
//! values are immutable once built and freely sharable across threads.

mod conv;

pub mod error;
pub use error::Error;

pub mod principal;
pub use principal::{NameType, Principal, PrincipalClass};

pub mod etype;
pub use etype::{DEFAULT_ETYPES, Etype};

pub mod salt;
pub use salt::{Compatibility, default_salt};

pub mod secret;
pub use secret::Password;

pub mod s2k;
pub use s2k::{Key, derive};

pub mod keytab;
pub use keytab::{KEYTAB_MAGIC, Keytab, KeytabEntry, WriteOptions};

pub mod builder;
pub use builder::{ExternalKey, KeytabBuilder};

pub mod diff;
pub use diff::{ConflictPolicy, Diff, DiffMatch, EntryIdentity, compare, merge, merge_all};

pub mod protect;
pub use protect::{
    FileScopeKeyProvider, ProtectionScope, ScopeKeyProvider, protect, restrict_acl, unprotect,
};

pub mod facade;
pub use facade::{SelfCheckReport, read, read_bytes, self_check, shred, write, write_bytes};
