//! Tracked Address Extraction
//!
//! Recovers the literal address set from a filter expression such as
//! `to in ['0x7a25…', '0xc02a…']`. The expression itself is enforced by the
//! remote service; this module only lets local trace scanning reuse the same set.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;

use alloy::primitives::Address;
use regex::Regex;
use tracing::warn;

/// First `in [...]` membership test of a filter expression
static ADDRESS_SET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"in \[(.*?)\]").expect("address set pattern is valid"));

/// Extract the literal list of the first `in [...]` test of a filter expression
///
/// # Arguments
/// * `filter` - The free-form filter expression
///
/// # Returns
/// The unquoted literals in declaration order, or an empty list when the
/// expression has no `in [...]` test
pub fn extract_filter_literals(filter: &str) -> Vec<String> {
    let Some(captures) = ADDRESS_SET_PATTERN.captures(filter) else {
        return Vec::new();
    };

    captures[1]
        .split(',')
        .map(|literal| literal.trim().trim_matches(|c| c == '\'' || c == '"'))
        .filter(|literal| !literal.is_empty())
        .map(str::to_string)
        .collect()
}

/// Immutable set of addresses named by the filter expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedAddresses {
    addresses: HashSet<Address>,
}

impl TrackedAddresses {
    /// Build the tracked set from a filter expression
    ///
    /// Literals that are not addresses cannot match a call frame and are dropped.
    pub fn from_filter(filter: &str) -> Self {
        let addresses = extract_filter_literals(filter)
            .into_iter()
            .filter_map(|literal| match Address::from_str(&literal) {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!(literal = %literal, error = %e, "Ignoring filter literal that is not an address");
                    None
                }
            })
            .collect();

        Self { addresses }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl FromIterator<Address> for TrackedAddresses {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self {
            addresses: iter.into_iter().collect(),
        }
    }
}
