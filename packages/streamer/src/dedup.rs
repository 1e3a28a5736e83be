//! Seen-address deduplication.
//!
//! Each discovered address is emitted at most once per scope. The scope is
//! either one connection attempt (the set is cleared whenever the stream is
//! re-established) or the whole process lifetime.

use std::collections::HashSet;
use std::fmt;

use alloy::primitives::Address;
use clap::ValueEnum;

/// Lifetime of the seen-address set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DedupScope {
    /// Cleared at the start of every connection attempt
    #[default]
    Connection,
    /// Kept for the whole process
    Process,
}

impl fmt::Display for DedupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupScope::Connection => f.write_str("connection"),
            DedupScope::Process => f.write_str("process"),
        }
    }
}

/// Addresses already emitted within the current scope
#[derive(Debug, Clone, Default)]
pub struct SeenAddresses {
    scope: DedupScope,
    seen: HashSet<Address>,
}

impl SeenAddresses {
    pub fn new(scope: DedupScope) -> Self {
        Self {
            scope,
            seen: HashSet::new(),
        }
    }

    /// Record `address` and report whether it was not seen before
    ///
    /// The zero address stands for mint/burn and is never recorded.
    pub fn mark_if_new(&mut self, address: Address) -> bool {
        if address.is_zero() {
            return false;
        }
        self.seen.insert(address)
    }

    /// Called at the start of every connection attempt
    pub fn begin_connection(&mut self) {
        if self.scope == DedupScope::Connection {
            self.seen.clear();
        }
    }

    pub fn scope(&self) -> DedupScope {
        self.scope
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
