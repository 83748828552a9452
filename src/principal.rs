//! Kerberos principal names
//!
//! A principal is an ordered list of name components plus a realm, written
//! `c1/c2@REALM`. Component text may escape `/`, `@`, and `\` with a
//! backslash. Parsing splits once on the rightmost unescaped `@` and then on
//! unescaped `/`, so the textual form round-trips through [`Principal::parse`]
//! and [`Principal::render`].

use std::{fmt, str::FromStr};

use bitflags::bitflags;
use getset::Getters;

use crate::error::{Error, Result};

/// Service tokens that mark the first component of a service principal name
// The common SPN service classes seen in AD forests
const WELL_KNOWN_SERVICES: &[&str] = &[
    "host", "http", "https", "cifs", "ldap", "dns", "ftp", "imap", "pop", "smtp", "nfs",
    "mssqlsvc", "wsman", "rpcss", "termsrv", "sip",
];

/// Name-type tag carried with a principal (RFC 4120 §6.2)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NameType {
    /// Name type not known
    Unknown,
    /// Just the name of the principal, as in DCE or for users
    Principal,
    /// Service and other unique instance, as for `krbtgt`
    SrvInst,
    /// Service with host name as instance
    SrvHst,
    /// Unique ID
    Uid,
    /// A tag this library does not model, preserved verbatim
    Other(u32),
}

impl NameType {
    /// Map an on-wire name-type code to a tag, preserving unknown codes
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Principal,
            2 => Self::SrvInst,
            3 => Self::SrvHst,
            5 => Self::Uid,
            other => Self::Other(other),
        }
    }

    /// On-wire name-type code
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Principal => 1,
            Self::SrvInst => 2,
            Self::SrvHst => 3,
            Self::Uid => 5,
            Self::Other(code) => code,
        }
    }
}

bitflags! {
    /// Classification of a principal
    ///
    /// Classes are not mutually exclusive: `host/box@REALM` is both
    /// `SERVICE` and `HOST`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrincipalClass: u8 {
        /// Single-component user principal
        const USER = 1 << 0;
        /// Multi-component service principal
        const SERVICE = 1 << 1;
        /// Service principal whose service class is `host`
        const HOST = 1 << 2;
        /// `$`-suffixed single component naming a computer account
        const COMPUTER_ACCOUNT = 1 << 3;
        /// Ticket-granting service principal
        const KRBTGT = 1 << 4;
    }
}

/// A Kerberos principal name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Getters)]
#[getset(get = "pub")]
pub struct Principal {
    /// Name components, in order, excluding the realm
    components: Vec<String>,
    /// Realm, conventionally uppercase; stored as given
    realm: String,
    /// Name-type tag
    name_type: NameType,
}

impl Principal {
    /// Build a principal from parts, validating them
    pub fn new(components: Vec<String>, realm: impl Into<String>, name_type: NameType) -> Result<Self> {
        let principal = Self {
            components,
            realm: realm.into(),
            name_type,
        };
        principal.validate()?;
        Ok(principal)
    }

    /// Parse the textual form `c1/c2@REALM`
    ///
    /// The rightmost unescaped `@` separates the realm; unescaped `/`
    /// separates components. The default name type is
    /// [`NameType::Principal`], except that two-component names whose first
    /// component is a well-known service class get [`NameType::SrvHst`] and
    /// `krbtgt` principals get [`NameType::SrvInst`].
    pub fn parse(text: &str) -> Result<Self> {
        let at = find_last_unescaped(text, '@').ok_or_else(|| Error::InvalidPrincipal {
            reason: format!("missing realm in {text:?}"),
        })?;
        let realm = unescape(&text[at + 1..], at + 1)?;

        let mut components = Vec::new();
        let mut start = 0;
        for boundary in find_all_unescaped(&text[..at], '/') {
            components.push(unescape(&text[start..boundary], start)?);
            start = boundary + 1;
        }
        components.push(unescape(&text[start..at], start)?);

        let name_type = default_name_type(&components);
        Self::new(components, realm, name_type)
    }

    /// Map an Active Directory SamAccountName into a principal
    ///
    /// A `$`-suffixed name is a computer account and becomes the service
    /// form `host/<name-without-$>` with name and realm lowercase rules per
    /// AD convention; any other name becomes a single-component user
    /// principal. The realm is uppercased.
    pub fn from_sam_account_name(sam: &str, realm: &str) -> Result<Self> {
        let realm = realm.to_uppercase();
        if let Some(host) = sam.strip_suffix('$') {
            Self::new(
                vec!["host".to_owned(), host.to_lowercase()],
                realm,
                NameType::SrvHst,
            )
        } else {
            Self::new(vec![sam.to_owned()], realm, NameType::Principal)
        }
    }

    /// Replace the name-type tag
    pub fn with_name_type(mut self, name_type: NameType) -> Self {
        self.name_type = name_type;
        self
    }

    /// Render the textual form, escaping `/`, `@`, and `\` where needed
    pub fn render(&self) -> String {
        let components = self
            .components
            .iter()
            .map(|component| escape(component))
            .collect::<Vec<_>>()
            .join("/");
        format!("{}@{}", components, escape(&self.realm))
    }

    /// Classify this principal
    pub fn classify(&self) -> PrincipalClass {
        let mut class = PrincipalClass::empty();
        if self.components.len() == 1 {
            if self.components[0].ends_with('$') {
                class |= PrincipalClass::COMPUTER_ACCOUNT;
            } else {
                class |= PrincipalClass::USER;
            }
        } else {
            class |= PrincipalClass::SERVICE;
            if self.components[0].eq_ignore_ascii_case("host") {
                class |= PrincipalClass::HOST;
            }
        }
        if self.components[0].eq_ignore_ascii_case("krbtgt") {
            class |= PrincipalClass::KRBTGT;
        }
        class
    }

    /// Copy of this principal with service/host components lowercased and
    /// the realm uppercased, the shape Windows-compat comparisons use
    pub fn normalized(&self) -> Self {
        let components = if self.components.len() > 1 {
            self.components
                .iter()
                .map(|component| component.to_lowercase())
                .collect()
        } else {
            self.components.clone()
        };
        Self {
            components,
            realm: self.realm.to_uppercase(),
            name_type: self.name_type,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.realm.is_empty() {
            return Err(Error::InvalidPrincipal {
                reason: "empty realm".to_owned(),
            });
        }
        if self.components.is_empty() {
            return Err(Error::InvalidPrincipal {
                reason: "no name components".to_owned(),
            });
        }
        for text in self.components.iter().chain(std::iter::once(&self.realm)) {
            if text.is_empty() {
                return Err(Error::InvalidPrincipal {
                    reason: "empty name component".to_owned(),
                });
            }
            if text.contains('\0') {
                return Err(Error::InvalidPrincipal {
                    reason: "embedded NUL".to_owned(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for Principal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn default_name_type(components: &[String]) -> NameType {
    if components[0].eq_ignore_ascii_case("krbtgt") {
        NameType::SrvInst
    } else if components.len() == 2
        && WELL_KNOWN_SERVICES
            .iter()
            .any(|service| components[0].eq_ignore_ascii_case(service))
    {
        NameType::SrvHst
    } else {
        NameType::Principal
    }
}

/// Byte index of the last `needle` not preceded by an active escape
fn find_last_unescaped(text: &str, needle: char) -> Option<usize> {
    find_all_unescaped(text, needle).into_iter().last()
}

fn find_all_unescaped(text: &str, needle: char) -> Vec<usize> {
    let mut hits = Vec::new();
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == needle {
            hits.push(i);
        }
    }
    hits
}

fn unescape(text: &str, base_offset: usize) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, escapee @ ('/' | '@' | '\\'))) => out.push(escapee),
            Some((j, other)) => {
                return Err(Error::ParseError {
                    offset: base_offset + j,
                    reason: format!("unsupported escape '\\{other}'"),
                });
            }
            None => {
                return Err(Error::ParseError {
                    offset: base_offset + i,
                    reason: "dangling escape at end of input".to_owned(),
                });
            }
        }
    }
    Ok(out)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '/' | '@' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
