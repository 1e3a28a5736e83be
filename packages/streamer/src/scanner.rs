//! Transaction Trace Scanner
//!
//! Walks the call frames of one transaction trace, keeps the frames that target
//! a tracked address, and collects the transfer counterparties that have not
//! been seen yet in the current dedup scope.

use alloy::primitives::Address;

use crate::dedup::SeenAddresses;
use crate::filter::TrackedAddresses;
use crate::model::{normalize_address, Block, TransactionTrace};

/// Scan one transaction trace for newly discovered addresses
///
/// # Arguments
/// * `block` - The block the trace belongs to
/// * `trace` - The transaction trace to walk
/// * `tracked` - Addresses whose call frames matter
/// * `seen` - Addresses already emitted in the current scope, updated in place
///
/// # Returns
/// Newly discovered addresses in frame/event order
pub fn scan_transaction(
    block: &Block,
    trace: &TransactionTrace,
    tracked: &TrackedAddresses,
    seen: &mut SeenAddresses,
) -> Vec<Address> {
    let mut discovered = Vec::new();

    for call in &trace.calls {
        let Some(target) = normalize_address(&call.address) else {
            continue;
        };
        if !tracked.contains(&target) {
            continue;
        }

        for event in &call.transfer_events {
            for counterparty in [&event.from, &event.to] {
                if let Some(address) = normalize_address(counterparty) {
                    if seen.mark_if_new(address) {
                        discovered.push(address);
                    }
                }
            }
        }
    }

    if !discovered.is_empty() {
        tracing::trace!(
            block = %block.block_ref(),
            trx = %format!("{:#x}", trace.hash),
            count = discovered.len(),
            "Discovered addresses in transaction"
        );
    }

    discovered
}

/// Scan every transaction trace of a block, in order
pub fn scan_block(block: &Block, tracked: &TrackedAddresses, seen: &mut SeenAddresses) -> Vec<Address> {
    block
        .transaction_traces
        .iter()
        .flat_map(|trace| scan_transaction(block, trace, tracked, seen))
        .collect()
}
