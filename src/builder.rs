//! High-level keytab assembly
//!
//! [`KeytabBuilder`] composes keytab entries from one of two sources: a
//! password run through the string-to-key engine under a salt policy, or a
//! set of externally supplied raw keys (for example the result of
//! directory replication). The builder owns the policy gates: legacy RC4
//! emission, multi-KVNO inclusion, and the krbtgt risk acknowledgment.

use chrono::{DateTime, Utc};
use log::warn;

use crate::{
    conv::{default_timestamp, dt_to_ts},
    error::{Error, Result},
    etype::{DEFAULT_ETYPES, Etype},
    keytab::{Keytab, KeytabEntry},
    principal::{Principal, PrincipalClass},
    s2k::{self, Key},
    salt::{Compatibility, default_salt},
    secret::Password,
};

/// A raw key obtained outside the derivation path
///
/// This tuple is the interface to a directory-replication source: no schema
/// is assumed beyond `(etype, kvno, key bytes, optional timestamp)`.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct ExternalKey {
    /// Numeric etype code
    pub etype: u16,
    /// Key version number this key belongs to
    pub kvno: u32,
    /// Raw key bytes
    pub key: Vec<u8>,
    /// Seconds since the Unix epoch; defaults to the builder timestamp
    pub timestamp: Option<u32>,
}

enum Source {
    Password {
        password: Password,
        etypes: Vec<Etype>,
        compatibility: Compatibility,
        salt: Option<Vec<u8>>,
        iterations: Option<u32>,
        kvno: u32,
    },
    External {
        keys: Vec<ExternalKey>,
    },
}

/// Builder for a [`Keytab`]
pub struct KeytabBuilder {
    principal: Principal,
    source: Source,
    include_legacy_rc4: bool,
    include_old_kvno: bool,
    include_older_kvno: bool,
    acknowledge_risk: bool,
    justification: Option<String>,
    timestamp: Option<u32>,
}

impl KeytabBuilder {
    /// Start a keytab derived from a password
    ///
    /// Defaults: etypes 17 and 18, KVNO 1, MIT salt policy, etype-default
    /// iteration counts.
    pub fn from_password(principal: Principal, password: Password) -> Self {
        Self {
            principal,
            source: Source::Password {
                password,
                etypes: DEFAULT_ETYPES.to_vec(),
                compatibility: Compatibility::default(),
                salt: None,
                iterations: None,
                kvno: 1,
            },
            include_legacy_rc4: false,
            include_old_kvno: false,
            include_older_kvno: false,
            acknowledge_risk: false,
            justification: None,
            timestamp: None,
        }
    }

    /// Start a keytab from externally supplied raw keys
    pub fn from_external_keys(principal: Principal, keys: Vec<ExternalKey>) -> Self {
        Self {
            principal,
            source: Source::External { keys },
            include_legacy_rc4: false,
            include_old_kvno: false,
            include_older_kvno: false,
            acknowledge_risk: false,
            justification: None,
            timestamp: None,
        }
    }

    /// Replace the requested etype set (password path)
    pub fn etypes(mut self, etypes: impl IntoIterator<Item = Etype>) -> Self {
        if let Source::Password { etypes: e, .. } = &mut self.source {
            *e = etypes.into_iter().collect();
        }
        self
    }

    /// Set the KVNO for derived entries (password path)
    pub fn kvno(mut self, kvno: u32) -> Self {
        if let Source::Password { kvno: k, .. } = &mut self.source {
            *k = kvno;
        }
        self
    }

    /// Select the salt construction regime (password path)
    pub fn compatibility(mut self, compatibility: Compatibility) -> Self {
        if let Source::Password {
            compatibility: c, ..
        } = &mut self.source
        {
            *c = compatibility;
        }
        self
    }

    /// Supply an explicit salt, bypassing the salt policy (password path)
    pub fn salt(mut self, salt: Vec<u8>) -> Self {
        if let Source::Password { salt: s, .. } = &mut self.source {
            *s = Some(salt);
        }
        self
    }

    /// Override the PBKDF2 iteration count (password path)
    pub fn iterations(mut self, iterations: u32) -> Self {
        if let Source::Password { iterations: i, .. } = &mut self.source {
            *i = Some(iterations);
        }
        self
    }

    /// Allow rc4-hmac entries to be emitted
    pub fn include_legacy_rc4(mut self, include: bool) -> Self {
        self.include_legacy_rc4 = include;
        self
    }

    /// Include external keys for the previous KVNO
    pub fn include_old_kvno(mut self, include: bool) -> Self {
        self.include_old_kvno = include;
        self
    }

    /// Include external keys for the KVNO before the previous one
    pub fn include_older_kvno(mut self, include: bool) -> Self {
        self.include_older_kvno = include;
        self
    }

    /// Acknowledge the risk of a sensitive keytab shape
    pub fn acknowledge_risk(mut self, acknowledge: bool) -> Self {
        self.acknowledge_risk = acknowledge;
        self
    }

    /// Record why a risk-gated keytab is being produced
    pub fn justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }

    /// Pin the timestamp of produced entries, for reproducible output
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(dt_to_ts(timestamp));
        self
    }

    /// Assemble the keytab
    pub fn build(self) -> Result<Keytab> {
        let timestamp = self.timestamp.unwrap_or_else(default_timestamp);
        match self.source {
            Source::Password {
                ref password,
                ref etypes,
                compatibility,
                ref salt,
                iterations,
                kvno,
            } => {
                let mut keytab = Keytab::new();
                for &etype in etypes {
                    if etype.is_legacy() && !self.include_legacy_rc4 {
                        warn!("skipping legacy {etype}: enable include_legacy_rc4 to emit it");
                        continue;
                    }
                    let salt = salt
                        .clone()
                        .unwrap_or_else(|| default_salt(&self.principal, compatibility));
                    let key = s2k::derive(password, &salt, etype, iterations)?;
                    keytab.push(KeytabEntry::new(
                        self.principal.clone(),
                        etype.code(),
                        kvno,
                        key,
                        timestamp,
                    )?);
                }
                Ok(keytab)
            }
            Source::External { ref keys } => {
                let admitted = self.admitted_kvnos(keys)?;
                let mut keytab = Keytab::new();
                for external in keys {
                    if !admitted.contains(&external.kvno) {
                        continue;
                    }
                    if let Some(etype) = Etype::from_code(external.etype) {
                        if etype.is_legacy() && !self.include_legacy_rc4 {
                            warn!(
                                "skipping legacy {etype} key at kvno {}: enable include_legacy_rc4 to emit it",
                                external.kvno
                            );
                            continue;
                        }
                    }
                    keytab.push(KeytabEntry::new(
                        self.principal.clone(),
                        external.etype,
                        external.kvno,
                        Key::new(external.key.clone()),
                        external.timestamp.unwrap_or(timestamp),
                    )?);
                }
                Ok(keytab)
            }
        }
    }

    /// Which KVNOs make it into the output: the newest always, the one
    /// before under `include_old_kvno`, the one before that under
    /// `include_older_kvno`
    fn admitted_kvnos(&self, keys: &[ExternalKey]) -> Result<Vec<u32>> {
        let mut kvnos: Vec<u32> = keys.iter().map(|key| key.kvno).collect();
        kvnos.sort_unstable_by(|a, b| b.cmp(a));
        kvnos.dedup();

        let mut admitted = Vec::with_capacity(3);
        let mut take = 1;
        if self.include_old_kvno {
            take += 1;
        }
        if self.include_older_kvno {
            take += 1;
        }
        for &kvno in kvnos.iter().take(take) {
            admitted.push(kvno);
        }
        for &kvno in kvnos.iter().skip(take) {
            warn!("dropping keys at kvno {kvno}: outside the admitted KVNO window");
        }

        if admitted.len() > 1 && self.principal.classify().contains(PrincipalClass::KRBTGT) {
            let justified = self
                .justification
                .as_deref()
                .is_some_and(|justification| !justification.trim().is_empty());
            if !self.acknowledge_risk || !justified {
                return Err(Error::RiskNotAcknowledged);
            }
            warn!(
                "producing multi-KVNO krbtgt keytab for {}: {}",
                self.principal,
                self.justification.as_deref().unwrap_or_default()
            );
        }
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(text: &str) -> Principal {
        Principal::parse(text).unwrap()
    }

    #[test]
    fn password_path_defaults_to_aes_pair() {
        let keytab = KeytabBuilder::from_password(
            principal("user1@EXAMPLE.COM"),
            Password::new("password"),
        )
        .build()
        .unwrap();
        let codes: Vec<u16> = keytab.entries().iter().map(|e| *e.etype()).collect();
        assert_eq!(codes, vec![17, 18]);
        for entry in keytab.entries() {
            assert_eq!(*entry.kvno(), 1);
            assert_eq!(
                entry.key().len(),
                entry.known_etype().unwrap().key_len()
            );
        }
    }

    #[test]
    fn rc4_needs_legacy_gate() {
        let build = |legacy| {
            KeytabBuilder::from_password(
                principal("user1@EXAMPLE.COM"),
                Password::new("password"),
            )
            .etypes([Etype::Rc4Hmac])
            .include_legacy_rc4(legacy)
            .build()
            .unwrap()
        };
        assert!(build(false).entries().is_empty());
        assert_eq!(build(true).entries().len(), 1);
    }

    #[test]
    fn explicit_salt_bypasses_policy() {
        let derive = |salt: Option<&[u8]>| {
            let mut builder = KeytabBuilder::from_password(
                principal("user1@EXAMPLE.COM"),
                Password::new("password"),
            )
            .etypes([Etype::Aes256CtsHmacSha196]);
            if let Some(salt) = salt {
                builder = builder.salt(salt.to_vec());
            }
            builder.build().unwrap().entries()[0].key().clone()
        };
        // the MIT policy salt and the identical explicit salt agree
        assert_eq!(derive(None), derive(Some(b"EXAMPLE.COMuser1")));
        assert_ne!(derive(None), derive(Some(b"somewhere else entirely")));
    }

    #[test]
    fn external_keys_are_emitted_verbatim() {
        let keytab = KeytabBuilder::from_external_keys(
            principal("user1@EXAMPLE.COM"),
            vec![ExternalKey {
                etype: 18,
                kvno: 7,
                key: vec![0x5A; 32],
                timestamp: Some(1_600_000_000),
            }],
        )
        .build()
        .unwrap();
        let entry = &keytab.entries()[0];
        assert_eq!(*entry.kvno(), 7);
        assert_eq!(entry.key().as_bytes(), &[0x5A; 32][..]);
        assert_eq!(*entry.timestamp(), 1_600_000_000);
    }

    #[test]
    fn external_key_length_is_validated() {
        let result = KeytabBuilder::from_external_keys(
            principal("user1@EXAMPLE.COM"),
            vec![ExternalKey {
                etype: 18,
                kvno: 1,
                key: vec![0; 16],
                timestamp: None,
            }],
        )
        .build();
        assert!(matches!(result, Err(Error::KeyLengthMismatch { .. })));
    }

    #[test]
    fn old_kvnos_need_their_flags() {
        let keys = |kvnos: &[u32]| {
            kvnos
                .iter()
                .map(|&kvno| ExternalKey {
                    etype: 18,
                    kvno,
                    key: vec![kvno as u8; 32],
                    timestamp: None,
                })
                .collect::<Vec<_>>()
        };

        let newest_only =
            KeytabBuilder::from_external_keys(principal("svc@EXAMPLE.COM"), keys(&[5, 4, 3]))
                .build()
                .unwrap();
        let kvnos: Vec<u32> = newest_only.entries().iter().map(|e| *e.kvno()).collect();
        assert_eq!(kvnos, vec![5]);

        let with_old =
            KeytabBuilder::from_external_keys(principal("svc@EXAMPLE.COM"), keys(&[5, 4, 3]))
                .include_old_kvno(true)
                .build()
                .unwrap();
        let kvnos: Vec<u32> = with_old.entries().iter().map(|e| *e.kvno()).collect();
        assert_eq!(kvnos, vec![5, 4]);
    }

    #[test]
    fn krbtgt_multi_kvno_requires_acknowledgment() {
        let keys = vec![
            ExternalKey {
                etype: 18,
                kvno: 10,
                key: vec![1; 32],
                timestamp: None,
            },
            ExternalKey {
                etype: 18,
                kvno: 9,
                key: vec![2; 32],
                timestamp: None,
            },
        ];

        let refused = KeytabBuilder::from_external_keys(
            principal("krbtgt/EXAMPLE.COM@EXAMPLE.COM"),
            keys.clone(),
        )
        .include_old_kvno(true)
        .build();
        assert!(matches!(refused, Err(Error::RiskNotAcknowledged)));

        // acknowledgment without a justification is still refused
        let unjustified = KeytabBuilder::from_external_keys(
            principal("krbtgt/EXAMPLE.COM@EXAMPLE.COM"),
            keys.clone(),
        )
        .include_old_kvno(true)
        .acknowledge_risk(true)
        .build();
        assert!(matches!(unjustified, Err(Error::RiskNotAcknowledged)));

        let allowed = KeytabBuilder::from_external_keys(
            principal("krbtgt/EXAMPLE.COM@EXAMPLE.COM"),
            keys,
        )
        .include_old_kvno(true)
        .acknowledge_risk(true)
        .justification("dc-migration")
        .build()
        .unwrap();
        assert_eq!(allowed.entries().len(), 2);
    }

    #[test]
    fn single_kvno_krbtgt_needs_no_gate() {
        let keytab = KeytabBuilder::from_external_keys(
            principal("krbtgt/EXAMPLE.COM@EXAMPLE.COM"),
            vec![ExternalKey {
                etype: 18,
                kvno: 10,
                key: vec![1; 32],
                timestamp: None,
            }],
        )
        .build()
        .unwrap();
        assert_eq!(keytab.entries().len(), 1);
    }
}
