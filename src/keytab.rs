//! Keytab values and the MIT 0x0502 binary codec
//!
//! A keytab is the two-byte magic `0x05 0x02` followed by variable-length
//! records, all integers big-endian. Each record starts with a signed
//! 32-bit size counting the bytes after itself; a negative size marks a
//! hole that readers skip. The KVNO is carried in a single byte unless the
//! record leaves exactly four trailing bytes after the key, in which case
//! those encode a 32-bit KVNO.
//!
//! The parser is tolerant: holes are skipped, unknown etype and name-type
//! codes are preserved, and extra trailing bytes inside a record are
//! discarded. Structural corruption (a record size overrunning the file, a
//! component length overrunning its record) fails with
//! [`Error::MalformedKeytab`] carrying the record's byte offset.

use getset::Getters;

use crate::{
    error::{Error, Result},
    etype::Etype,
    principal::{NameType, Principal},
    s2k::Key,
};

/// File magic for format 0x0502
pub const KEYTAB_MAGIC: [u8; 2] = [0x05, 0x02];

/// One keytab record: a principal bound to a key at a KVNO
#[derive(Clone, Debug, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct KeytabEntry {
    /// Principal the key belongs to
    principal: Principal,
    /// Numeric etype code; may be a code this library cannot derive
    etype: u16,
    /// Key version number
    kvno: u32,
    /// Raw key bytes
    key: Key,
    /// Seconds since the Unix epoch, truncated to 32 bits
    timestamp: u32,
}

impl KeytabEntry {
    /// Build an entry, validating the key length when the etype is known
    pub fn new(
        principal: Principal,
        etype: u16,
        kvno: u32,
        key: Key,
        timestamp: u32,
    ) -> Result<Self> {
        if let Some(known) = Etype::from_code(etype) {
            if key.len() != known.key_len() {
                return Err(Error::KeyLengthMismatch {
                    etype,
                    expected: known.key_len(),
                    got: key.len(),
                });
            }
        }
        Ok(Self {
            principal,
            etype,
            kvno,
            key,
            timestamp,
        })
    }

    /// Entry straight off the wire, no validation beyond structure
    pub(crate) fn from_wire(
        principal: Principal,
        etype: u16,
        kvno: u32,
        key: Key,
        timestamp: u32,
    ) -> Self {
        Self {
            principal,
            etype,
            kvno,
            key,
            timestamp,
        }
    }

    /// The registry etype, if this entry's code is one the library knows
    pub fn known_etype(&self) -> Option<Etype> {
        Etype::from_code(self.etype)
    }

    /// Timestamp as a [`chrono::DateTime`], `None` if out of range
    pub fn timestamp_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        crate::conv::ts_to_dt(self.timestamp)
    }
}

/// Knobs for the binary writer
#[derive(Clone, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct WriteOptions {
    /// Always emit the trailing 32-bit KVNO, even when the value fits in
    /// eight bits
    pub force_32bit_kvno: bool,
}

/// An ordered collection of keytab entries
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keytab {
    entries: Vec<KeytabEntry>,
}

impl Keytab {
    /// An empty keytab
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a list of entries, preserving their order
    pub fn from_entries(entries: Vec<KeytabEntry>) -> Self {
        Self { entries }
    }

    /// The entries, in file order
    pub fn entries(&self) -> &[KeytabEntry] {
        &self.entries
    }

    /// Append an entry
    pub fn push(&mut self, entry: KeytabEntry) {
        self.entries.push(entry);
    }

    /// Distinct principals present, in first-seen order
    pub fn principals(&self) -> Vec<&Principal> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.principal()) {
                seen.push(entry.principal());
            }
        }
        seen
    }

    /// Entries belonging to one principal, in file order
    pub fn entries_for<'a>(
        &'a self,
        principal: &'a Principal,
    ) -> impl Iterator<Item = &'a KeytabEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.principal() == principal)
    }

    /// Serialize to the 0x0502 binary form
    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(2 + self.entries.len() * 64);
        out.extend_from_slice(&KEYTAB_MAGIC);
        for entry in &self.entries {
            encode_entry(&mut out, entry, options)?;
        }
        Ok(out)
    }

    /// Parse the 0x0502 binary form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 || bytes[..2] != KEYTAB_MAGIC {
            return Err(Error::MalformedKeytab { offset: 0 });
        }
        let mut entries = Vec::new();
        let mut pos = 2;
        while pos < bytes.len() {
            let record_start = pos;
            if bytes.len() - pos < 4 {
                return Err(Error::MalformedKeytab {
                    offset: record_start,
                });
            }
            let size = i32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]);
            pos += 4;
            if size < 0 {
                // hole left by in-place entry deletion; skip it
                let skip = size.unsigned_abs() as usize;
                if bytes.len() - pos < skip {
                    return Err(Error::MalformedKeytab {
                        offset: record_start,
                    });
                }
                pos += skip;
                continue;
            }
            let size = size as usize;
            if size == 0 || bytes.len() - pos < size {
                return Err(Error::MalformedKeytab {
                    offset: record_start,
                });
            }
            let entry = decode_entry(&bytes[pos..pos + size]).ok_or(Error::MalformedKeytab {
                offset: record_start,
            })?;
            entries.push(entry);
            pos += size;
        }
        Ok(Self { entries })
    }
}

fn encode_entry(out: &mut Vec<u8>, entry: &KeytabEntry, options: &WriteOptions) -> Result<()> {
    let principal = entry.principal();
    let mut body = Vec::with_capacity(64);

    let num_components =
        u16::try_from(principal.components().len()).map_err(|_| too_long(principal))?;
    body.extend_from_slice(&num_components.to_be_bytes());
    push_counted(&mut body, principal.realm().as_bytes()).map_err(|_| too_long(principal))?;
    for component in principal.components() {
        push_counted(&mut body, component.as_bytes()).map_err(|_| too_long(principal))?;
    }
    body.extend_from_slice(&principal.name_type().code().to_be_bytes());
    body.extend_from_slice(&entry.timestamp().to_be_bytes());

    let trailing_kvno = options.force_32bit_kvno || *entry.kvno() > 255;
    // placeholder byte when the 32-bit form follows
    body.push(if trailing_kvno { 0 } else { *entry.kvno() as u8 });
    body.extend_from_slice(&entry.etype().to_be_bytes());
    push_counted(&mut body, entry.key().as_bytes()).map_err(|_| Error::KeyLengthMismatch {
        etype: *entry.etype(),
        expected: usize::from(u16::MAX),
        got: entry.key().len(),
    })?;
    if trailing_kvno {
        body.extend_from_slice(&entry.kvno().to_be_bytes());
    }

    let size = i32::try_from(body.len()).map_err(|_| too_long(principal))?;
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(())
}

fn too_long(principal: &Principal) -> Error {
    Error::InvalidPrincipal {
        reason: format!("{principal} does not fit a keytab record"),
    }
}

fn push_counted(out: &mut Vec<u8>, bytes: &[u8]) -> std::result::Result<(), ()> {
    let len = u16::try_from(bytes.len()).map_err(|_| ())?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Decode one record body; `None` means structural corruption
fn decode_entry(record: &[u8]) -> Option<KeytabEntry> {
    let mut cursor = Cursor { record, pos: 0 };

    let num_components = cursor.u16()?;
    let realm = cursor.counted_string()?;
    let mut components = Vec::with_capacity(num_components.into());
    for _ in 0..num_components {
        components.push(cursor.counted_string()?);
    }
    let name_type = NameType::from_code(cursor.u32()?);
    let timestamp = cursor.u32()?;
    let kvno8 = cursor.u8()?;
    let etype = cursor.u16()?;
    let key_len = cursor.u16()?;
    let key = Key::new(cursor.take(key_len.into())?.to_vec());

    // exactly four spare bytes carry a 32-bit KVNO that supersedes the
    // one-byte field; anything else trailing is discarded
    let kvno = if cursor.remaining() == 4 {
        cursor.u32()?
    } else {
        kvno8.into()
    };

    let principal = Principal::new(components, realm, name_type).ok()?;
    Some(KeytabEntry::from_wire(principal, etype, kvno, key, timestamp))
}

struct Cursor<'a> {
    record: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn remaining(&self) -> usize {
        self.record.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.record[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    fn u16(&mut self) -> Option<u16> {
        Some(u16::from_be_bytes(self.take(2)?.try_into().ok()?))
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_be_bytes(self.take(4)?.try_into().ok()?))
    }

    fn counted_string(&mut self) -> Option<String> {
        let len = self.u16()?;
        String::from_utf8(self.take(len.into())?.to_vec()).ok()
    }
}
