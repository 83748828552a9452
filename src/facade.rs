//! Top-level operations callable from a CLI or host program
//!
//! File-backed entry points around the codec plus the structural
//! self-check. In-memory operations (building, comparing, merging,
//! wrapping) live in their own modules and are re-exported from the crate
//! root.

use std::{fs, path::Path};

use crate::{
    error::{Error, Result},
    keytab::{Keytab, WriteOptions},
};

/// Read and parse a keytab file
pub fn read(path: impl AsRef<Path>) -> Result<Keytab> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|error| Error::io(path, error))?;
    Keytab::from_bytes(&bytes)
}

/// Serialize and write a keytab file
pub fn write(path: impl AsRef<Path>, keytab: &Keytab, options: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    let bytes = keytab.to_bytes(options)?;
    fs::write(path, bytes).map_err(|error| Error::io(path, error))
}

/// Read an opaque file, carrying the path in any error
///
/// For blobs the codec should not interpret, such as protected containers.
pub fn read_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|error| Error::io(path, error))
}

/// Write an opaque file, carrying the path in any error
pub fn write_bytes(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, bytes).map_err(|error| Error::io(path, error))
}

/// Overwrite a file with zeros and remove it
///
/// Best-effort scrubbing for `--delete-plaintext`; the filesystem may still
/// hold old blocks.
pub fn shred(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let len = fs::metadata(path)
        .map_err(|error| Error::io(path, error))?
        .len() as usize;
    fs::write(path, vec![0u8; len]).map_err(|error| Error::io(path, error))?;
    fs::remove_file(path).map_err(|error| Error::io(path, error))
}

/// Verdict for one record of a structural self-check
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct RecordCheck {
    /// Position of the record in the keytab
    pub index: usize,
    /// Rendered principal
    pub principal: String,
    /// Numeric etype code
    pub etype: u16,
    /// Key version number
    pub kvno: u32,
    /// Whether the record survives an encode/decode round trip unchanged
    pub round_trips: bool,
    /// Whether the key length matches the etype; `None` for unknown etypes
    pub key_len_ok: Option<bool>,
}

impl RecordCheck {
    /// Whether this record passed every applicable check
    pub fn passed(&self) -> bool {
        self.round_trips && self.key_len_ok.unwrap_or(true)
    }
}

/// Result of [`self_check`]
#[derive(Clone, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct SelfCheckReport {
    /// Per-record verdicts, in keytab order
    pub records: Vec<RecordCheck>,
}

impl SelfCheckReport {
    /// Whether every record passed
    pub fn passed(&self) -> bool {
        self.records.iter().all(RecordCheck::passed)
    }
}

/// Structurally verify a parsed keytab
///
/// Every record is re-encoded and re-parsed, and key lengths are checked
/// against the etype registry. Reading the keytab in the first place
/// already proves the magic and record framing.
pub fn self_check(keytab: &Keytab) -> SelfCheckReport {
    let options = WriteOptions::default();
    let records = keytab
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let round_trips = Keytab::from_entries(vec![entry.clone()])
                .to_bytes(&options)
                .ok()
                .and_then(|bytes| Keytab::from_bytes(&bytes).ok())
                .is_some_and(|parsed| parsed.entries() == std::slice::from_ref(entry));
            let key_len_ok = entry
                .known_etype()
                .map(|etype| entry.key().len() == etype.key_len());
            RecordCheck {
                index,
                principal: entry.principal().render(),
                etype: *entry.etype(),
                kvno: *entry.kvno(),
                round_trips,
                key_len_ok,
            }
        })
        .collect();
    SelfCheckReport { records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{keytab::KeytabEntry, principal::Principal, s2k::Key};

    fn sample() -> Keytab {
        Keytab::from_entries(vec![
            KeytabEntry::new(
                Principal::parse("host/srv.example.com@EXAMPLE.COM").unwrap(),
                18,
                3,
                Key::new(vec![7; 32]),
                1_700_000_000,
            )
            .unwrap(),
        ])
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.keytab");
        let keytab = sample();
        write(&path, &keytab, &WriteOptions::default()).unwrap();
        assert_eq!(read(&path).unwrap(), keytab);
    }

    #[test]
    fn missing_file_reports_path() {
        let error = read("/does/not/exist.keytab").unwrap_err();
        match error {
            Error::IoError { path, .. } => {
                assert_eq!(path, Path::new("/does/not/exist.keytab"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_check_passes_well_formed() {
        let report = self_check(&sample());
        assert!(report.passed());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].key_len_ok, Some(true));
    }

    #[test]
    fn self_check_flags_wrong_key_length() {
        // an undersized key for etype 18, as a hostile keytab could carry
        let principal = Principal::parse("user1@EXAMPLE.COM").unwrap();
        let mut bytes = Keytab::from_entries(vec![
            KeytabEntry::new(principal, 99, 1, Key::new(vec![1; 4]), 0).unwrap(),
        ])
        .to_bytes(&WriteOptions::default())
        .unwrap();
        // rewrite the etype field from 99 to 18: two bytes before the
        // 2-byte key length, which precedes the final 4 key bytes
        let len = bytes.len();
        bytes[len - 8..len - 6].copy_from_slice(&18u16.to_be_bytes());
        let keytab = Keytab::from_bytes(&bytes).unwrap();

        let report = self_check(&keytab);
        assert!(!report.passed());
        assert_eq!(report.records[0].key_len_ok, Some(false));
    }

    #[test]
    fn self_check_tolerates_unknown_etypes() {
        let keytab = Keytab::from_entries(vec![
            KeytabEntry::new(
                Principal::parse("odd@EXAMPLE.COM").unwrap(),
                99,
                1,
                Key::new(vec![1, 2, 3]),
                0,
            )
            .unwrap(),
        ]);
        let report = self_check(&keytab);
        assert!(report.passed());
        assert_eq!(report.records[0].key_len_ok, None);
    }
}
