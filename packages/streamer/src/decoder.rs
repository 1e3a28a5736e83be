//! Block Decoder
//!
//! Decodes the block payload carried by a stream message into the domain
//! [`Block`]. A payload that does not decode means the client and the service
//! disagree on the protocol, so callers treat every error here as fatal.

use alloy::primitives::{Bytes, B256};
use prost::Message;
use thiserror::Error;

use crate::model::{Block, Call, TransactionTrace, TransferEvent};
use crate::pb::codec;

/// Errors that can occur during block decoding
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty block payload")]
    EmptyPayload,

    #[error("Failed to decode protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("Invalid {field} length: expected 32 bytes, got {len}")]
    InvalidHash { field: &'static str, len: usize },
}

/// Turns raw payload bytes into a block
pub trait BlockDecoder: Send {
    fn decode(&self, payload: &[u8]) -> Result<Block, DecodeError>;
}

/// Decoder for the protobuf Ethereum block codec
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoBlockDecoder;

impl BlockDecoder for ProtoBlockDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Block, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        let raw = codec::Block::decode(payload)?;
        block_from_codec(raw)
    }
}

fn hash_from_bytes(field: &'static str, raw: &[u8]) -> Result<B256, DecodeError> {
    if raw.len() != 32 {
        return Err(DecodeError::InvalidHash {
            field,
            len: raw.len(),
        });
    }
    Ok(B256::from_slice(raw))
}

/// Convert a codec block into the domain block
pub fn block_from_codec(raw: codec::Block) -> Result<Block, DecodeError> {
    let hash = hash_from_bytes("block hash", &raw.hash)?;
    let parent_hash = match &raw.header {
        Some(header) => hash_from_bytes("parent hash", &header.parent_hash)?,
        None => B256::ZERO,
    };

    let transaction_traces = raw
        .transaction_traces
        .into_iter()
        .map(|trx| {
            Ok(TransactionTrace {
                hash: hash_from_bytes("transaction hash", &trx.hash)?,
                calls: trx.calls.into_iter().map(call_from_codec).collect(),
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(Block {
        number: raw.number,
        hash,
        parent_hash,
        transaction_traces,
    })
}

fn call_from_codec(raw: codec::Call) -> Call {
    Call {
        address: Bytes::from(raw.address),
        transfer_events: raw
            .erc20_transfer_events
            .into_iter()
            .map(|event| TransferEvent {
                from: Bytes::from(event.from),
                to: Bytes::from(event.to),
                amount: Bytes::from(event.amount),
            })
            .collect(),
    }
}
