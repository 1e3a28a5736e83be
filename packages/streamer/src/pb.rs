//! Wire messages of the block stream service.
//!
//! Declared by hand with `prost` derives. Only the fields this client reads are
//! listed; protobuf decoding skips unknown fields.

/// Stream request for `dfuse.bstream.v1.BlockStreamV2/Blocks`
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlocksRequestV2 {
    #[prost(int64, tag = "1")]
    pub start_block_num: i64,
    #[prost(string, tag = "13")]
    pub start_cursor: ::prost::alloc::string::String,
    #[prost(uint64, tag = "5")]
    pub stop_block_num: u64,
    #[prost(enumeration = "ForkStep", repeated, tag = "8")]
    pub fork_steps: ::prost::alloc::vec::Vec<i32>,
    #[prost(string, tag = "10")]
    pub include_filter_expr: ::prost::alloc::string::String,
    #[prost(string, tag = "11")]
    pub exclude_filter_expr: ::prost::alloc::string::String,
    #[prost(enumeration = "BlockDetails", tag = "15")]
    pub details: i32,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockResponseV2 {
    #[prost(message, optional, tag = "1")]
    pub block: ::core::option::Option<::prost_types::Any>,
    #[prost(enumeration = "ForkStep", tag = "6")]
    pub step: i32,
    #[prost(string, tag = "10")]
    pub cursor: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ForkStep {
    StepUnknown = 0,
    StepNew = 1,
    StepUndo = 2,
    StepIrreversible = 4,
    StepStalled = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum BlockDetails {
    Light = 0,
    Full = 1,
}

/// Ethereum block codec, restricted to what the trace scanner reads
pub mod codec {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(int32, tag = "1")]
        pub ver: i32,
        #[prost(bytes = "vec", tag = "2")]
        pub hash: ::prost::alloc::vec::Vec<u8>,
        #[prost(uint64, tag = "3")]
        pub number: u64,
        #[prost(uint64, tag = "4")]
        pub size: u64,
        #[prost(message, optional, tag = "5")]
        pub header: ::core::option::Option<BlockHeader>,
        #[prost(message, repeated, tag = "10")]
        pub transaction_traces: ::prost::alloc::vec::Vec<TransactionTrace>,
    }

    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockHeader {
        #[prost(bytes = "vec", tag = "1")]
        pub parent_hash: ::prost::alloc::vec::Vec<u8>,
    }

    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TransactionTrace {
        #[prost(bytes = "vec", tag = "1")]
        pub to: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "21")]
        pub hash: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "22")]
        pub from: ::prost::alloc::vec::Vec<u8>,
        #[prost(message, repeated, tag = "32")]
        pub calls: ::prost::alloc::vec::Vec<Call>,
    }

    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Call {
        #[prost(uint32, tag = "1")]
        pub index: u32,
        #[prost(bytes = "vec", tag = "5")]
        pub caller: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "6")]
        pub address: ::prost::alloc::vec::Vec<u8>,
        #[prost(message, repeated, tag = "100")]
        pub erc20_transfer_events: ::prost::alloc::vec::Vec<Erc20TransferEvent>,
    }

    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Erc20TransferEvent {
        #[prost(bytes = "vec", tag = "1")]
        pub from: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub to: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub amount: ::prost::alloc::vec::Vec<u8>,
    }
}
