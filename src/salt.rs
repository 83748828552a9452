//! Per-principal salt construction
//!
//! The string-to-key salt is assembled from the principal under one of
//! three compatibility regimes. MIT and Heimdal concatenate realm and
//! components with case preserved. Windows uppercases the realm and
//! lowercases every component of service principals, matching what a
//! domain controller derives for SPNs and computer accounts.
//!
//! A caller-supplied explicit salt bypasses this policy entirely.

use log::debug;
use strum::{Display, EnumIter, EnumString};

use crate::principal::Principal;

/// Salt construction regime
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display, EnumString, EnumIter)]
#[allow(clippy::exhaustive_enums)]
pub enum Compatibility {
    /// MIT krb5 rules: realm and components as given
    #[default]
    #[strum(serialize = "MIT", serialize = "mit")]
    Mit,
    /// Heimdal rules; this library applies strict MIT construction
    #[strum(serialize = "Heimdal", serialize = "heimdal")]
    Heimdal,
    /// Active Directory rules: uppercase realm, lowercase service components
    #[strum(serialize = "Windows", serialize = "windows")]
    Windows,
}

/// Construct the default string-to-key salt for a principal
///
/// Deterministic: the same `(principal, compatibility)` pair always yields
/// the same bytes.
pub fn default_salt(principal: &Principal, compatibility: Compatibility) -> Vec<u8> {
    let salt = match compatibility {
        Compatibility::Mit | Compatibility::Heimdal => {
            let mut salt = principal.realm().clone();
            for component in principal.components() {
                salt.push_str(component);
            }
            debug!(
                "salt policy {compatibility}: realm || components, case preserved, for {principal}"
            );
            salt
        }
        Compatibility::Windows => {
            let mut salt = principal.realm().to_uppercase();
            if principal.components().len() > 1 {
                for component in principal.components() {
                    salt.push_str(&component.to_lowercase());
                }
                debug!("salt policy Windows: service rule (lowercased components) for {principal}");
            } else {
                for component in principal.components() {
                    salt.push_str(component);
                }
                debug!(
                    "salt policy Windows: user rule (SamAccountName case preserved) for {principal}"
                );
            }
            salt
        }
    };
    salt.into_bytes()
}
