//! Keytab comparison and merging
//!
//! Both operations work on entry identity `(principal, kvno, etype)` with
//! multiset semantics: duplicate identities are matched pairwise, never
//! collapsed. Key bytes are the payload and only ever influence the
//! `keys_equal` verdict and merge conflicts.

use std::fmt;

use crate::{
    error::{Error, Result},
    keytab::{Keytab, KeytabEntry},
    principal::Principal,
};

/// Identity of an entry for set operations
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[allow(clippy::exhaustive_structs)]
pub struct EntryIdentity {
    /// Principal of the entry
    pub principal: Principal,
    /// Key version number
    pub kvno: u32,
    /// Numeric etype code
    pub etype: u16,
}

impl EntryIdentity {
    fn of(entry: &KeytabEntry, normalize: bool) -> Self {
        let principal = if normalize {
            entry.principal().normalized()
        } else {
            entry.principal().clone()
        };
        Self {
            principal,
            kvno: *entry.kvno(),
            etype: *entry.etype(),
        }
    }
}

impl fmt::Display for EntryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} kvno={} etype={}",
            self.principal, self.kvno, self.etype
        )
    }
}

/// One identity present in both keytabs
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct DiffMatch {
    /// The shared identity
    pub identity: EntryIdentity,
    /// Whether the key bytes agree
    pub keys_equal: bool,
}

/// Result of [`compare`]: a partition of both keytabs' entry identities
#[derive(Clone, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct Diff {
    /// Identities present only in the left keytab, in its order
    pub only_in_a: Vec<EntryIdentity>,
    /// Identities present only in the right keytab, in its order
    pub only_in_b: Vec<EntryIdentity>,
    /// Identities present in both, in the left keytab's order
    pub in_both: Vec<DiffMatch>,
}

impl Diff {
    /// Whether the keytabs hold the same identities with the same keys
    pub fn is_identical(&self) -> bool {
        self.only_in_a.is_empty()
            && self.only_in_b.is_empty()
            && self.in_both.iter().all(|matched| matched.keys_equal)
    }
}

/// Compare two keytabs structurally
///
/// `normalize` applies the Windows-compat shape before matching: service
/// and host components lowercased, realm uppercased.
pub fn compare(a: &Keytab, b: &Keytab, normalize: bool) -> Diff {
    let mut b_matched = vec![false; b.entries().len()];
    let mut diff = Diff::default();

    for entry_a in a.entries() {
        let identity = EntryIdentity::of(entry_a, normalize);
        let candidate = b.entries().iter().enumerate().find(|(i, entry_b)| {
            !b_matched[*i] && EntryIdentity::of(entry_b, normalize) == identity
        });
        match candidate {
            Some((i, entry_b)) => {
                b_matched[i] = true;
                diff.in_both.push(DiffMatch {
                    identity,
                    keys_equal: entry_a.key() == entry_b.key(),
                });
            }
            None => diff.only_in_a.push(identity),
        }
    }
    for (i, entry_b) in b.entries().iter().enumerate() {
        if !b_matched[i] {
            diff.only_in_b.push(EntryIdentity::of(entry_b, normalize));
        }
    }
    diff
}

/// What to do when merged keytabs disagree on the key for one identity
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum ConflictPolicy {
    /// Keep the left keytab's key
    PreferA,
    /// Take the right keytab's key
    PreferB,
    /// Refuse to merge
    Fail,
}

/// Union two keytabs by entry identity
///
/// The result keeps `a`'s entries in `a`'s order, followed by the entries
/// of `b` whose identity was not already present, in `b`'s order. An
/// identity collision with equal keys collapses to one entry; with unequal
/// keys the `policy` decides.
pub fn merge(a: &Keytab, b: &Keytab, policy: ConflictPolicy) -> Result<Keytab> {
    let mut entries: Vec<KeytabEntry> = a.entries().to_vec();
    for entry_b in b.entries() {
        let identity = EntryIdentity::of(entry_b, false);
        let existing = entries
            .iter_mut()
            .find(|entry| EntryIdentity::of(entry, false) == identity);
        match existing {
            None => entries.push(entry_b.clone()),
            Some(entry_a) if entry_a.key() == entry_b.key() => {}
            Some(entry_a) => match policy {
                ConflictPolicy::PreferA => {}
                ConflictPolicy::PreferB => *entry_a = entry_b.clone(),
                ConflictPolicy::Fail => {
                    return Err(Error::MergeConflict {
                        identity: identity.to_string(),
                    });
                }
            },
        }
    }
    Ok(Keytab::from_entries(entries))
}

/// Fold [`merge`] over any number of keytabs, left to right
pub fn merge_all<'a>(
    keytabs: impl IntoIterator<Item = &'a Keytab>,
    policy: ConflictPolicy,
) -> Result<Keytab> {
    let mut merged = Keytab::new();
    for keytab in keytabs {
        merged = merge(&merged, keytab, policy)?;
    }
    Ok(merged)
}
