//! Decoded block model consumed by the trace scanner.

use std::fmt;

use alloy::primitives::{Address, Bytes, B256};

const ADDRESS_LENGTH: usize = 20;

/// Reference to a block by number and hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRef {
    pub number: u64,
    pub hash: B256,
}

impl BlockRef {
    pub fn new(number: u64, hash: B256) -> Self {
        Self { number, hash }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({:#x})", self.number, self.hash)
    }
}

/// A block with its ordered transaction traces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub transaction_traces: Vec<TransactionTrace>,
}

impl Block {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.number, self.hash)
    }

    /// Reference to the parent block; the hash is the only known part
    pub fn previous_ref(&self) -> BlockRef {
        BlockRef::new(self.number.saturating_sub(1), self.parent_hash)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionTrace {
    pub hash: B256,
    pub calls: Vec<Call>,
}

/// A call frame; `address` holds the raw target bytes as received
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Call {
    pub address: Bytes,
    pub transfer_events: Vec<TransferEvent>,
}

/// ERC-20 `Transfer` emitted within a call frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferEvent {
    pub from: Bytes,
    pub to: Bytes,
    pub amount: Bytes,
}

/// Normalize raw address bytes, rejecting anything that is not 20 bytes long
pub fn normalize_address(raw: &[u8]) -> Option<Address> {
    (raw.len() == ADDRESS_LENGTH).then(|| Address::from_slice(raw))
}

/// Lowercase `0x`-prefixed rendering of an address
pub fn format_address(address: &Address) -> String {
    format!("{:#x}", address)
}
