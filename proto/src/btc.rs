//! Bitcoin-family queries and responses.

use crate::common::{ChunkPayload, DerivationPath};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BtcQuery {
    #[prost(oneof = "btc_query::Request", tags = "1, 2, 3")]
    pub request: Option<btc_query::Request>,
}

pub mod btc_query {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        GetXpubs(super::GetXpubsRequest),
        #[prost(message, tag = "2")]
        GetPublicKey(super::GetPublicKeyRequest),
        #[prost(message, tag = "3")]
        SignTxn(super::SignTxnRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BtcResponse {
    #[prost(oneof = "btc_response::Response", tags = "1, 2, 3")]
    pub response: Option<btc_response::Response>,
}

pub mod btc_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        GetXpubs(super::GetXpubsResponse),
        #[prost(message, tag = "2")]
        GetPublicKey(super::GetPublicKeyResponse),
        #[prost(message, tag = "3")]
        SignTxn(super::SignTxnResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetXpubsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub wallet_id: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub derivation_paths: Vec<DerivationPath>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetXpubsResponse {
    #[prost(string, repeated, tag = "1")]
    pub xpubs: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPublicKeyRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub wallet_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub derivation_path: Option<DerivationPath>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPublicKeyResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    #[prost(string, tag = "2")]
    pub address: String,
}

/// `sign_txn` sub-request union; the host walks initiate → metadata →
/// inputs/outputs → per-input signature requests.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignTxnRequest {
    #[prost(oneof = "sign_txn_request::Request", tags = "1, 2, 3, 4, 5")]
    pub request: Option<sign_txn_request::Request>,
}

pub mod sign_txn_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        Initiate(super::SignTxnInitiateRequest),
        #[prost(message, tag = "2")]
        Metadata(super::SignTxnMetadata),
        #[prost(message, tag = "3")]
        Input(super::TxnInput),
        #[prost(message, tag = "4")]
        Output(super::TxnOutput),
        #[prost(message, tag = "5")]
        SignatureRequest(super::SignatureRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignTxnInitiateRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub wallet_id: Vec<u8>,
    /// Account-level path (`m/purpose'/coin'/account'`).
    #[prost(message, optional, tag = "2")]
    pub derivation_path: Option<DerivationPath>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignTxnMetadata {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint32, tag = "2")]
    pub input_count: u32,
    #[prost(uint32, tag = "3")]
    pub output_count: u32,
    #[prost(uint32, tag = "4")]
    pub locktime: u32,
    #[prost(uint32, tag = "5")]
    pub sighash: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxnInput {
    #[prost(bytes = "vec", tag = "1")]
    pub prev_txn_hash: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub prev_output_index: u32,
    #[prost(uint64, tag = "3")]
    pub value: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub script_pub_key: Vec<u8>,
    #[prost(uint32, tag = "5")]
    pub sequence: u32,
    #[prost(uint32, tag = "6")]
    pub change_index: u32,
    #[prost(uint32, tag = "7")]
    pub address_index: u32,
    /// Raw previous transaction, chunked for large ones.
    #[prost(message, optional, tag = "8")]
    pub prev_txn: Option<ChunkPayload>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxnOutput {
    #[prost(uint64, tag = "1")]
    pub value: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub script_pub_key: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub is_change: bool,
    #[prost(uint32, tag = "4")]
    pub change_index: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignatureRequest {
    #[prost(uint32, tag = "1")]
    pub input_index: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignTxnResponse {
    #[prost(oneof = "sign_txn_response::Response", tags = "1, 2")]
    pub response: Option<sign_txn_response::Response>,
}

pub mod sign_txn_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        /// Acknowledges initiate/metadata/input/output phases.
        #[prost(bool, tag = "1")]
        Accepted(bool),
        #[prost(message, tag = "2")]
        Signature(super::SignTxnSignature),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignTxnSignature {
    /// DER for legacy inputs, raw 64-byte for witness inputs.
    #[prost(bytes = "vec", tag = "1")]
    pub signature: Vec<u8>,
    /// Serialized script_sig / witness stack for the input.
    #[prost(bytes = "vec", tag = "2")]
    pub unlocking: Vec<u8>,
}
