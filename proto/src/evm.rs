//! EVM-family queries and responses.

use crate::common::{ChunkPayload, DerivationPath};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmQuery {
    #[prost(oneof = "evm_query::Request", tags = "1, 2")]
    pub request: Option<evm_query::Request>,
}

pub mod evm_query {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        SignTxn(super::EvmSignTxnRequest),
        #[prost(message, tag = "2")]
        SignMsg(super::EvmSignMsgRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmResponse {
    #[prost(oneof = "evm_response::Response", tags = "1, 2")]
    pub response: Option<evm_response::Response>,
}

pub mod evm_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        SignTxn(super::EvmSignTxnResponse),
        #[prost(message, tag = "2")]
        SignMsg(super::EvmSignMsgResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmSignTxnRequest {
    #[prost(oneof = "evm_sign_txn_request::Request", tags = "1, 2")]
    pub request: Option<evm_sign_txn_request::Request>,
}

pub mod evm_sign_txn_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        Initiate(super::EvmSignTxnInitiateRequest),
        #[prost(message, tag = "2")]
        TxnData(super::ChunkPayload),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmSignTxnInitiateRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub wallet_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub derivation_path: Option<DerivationPath>,
    #[prost(uint64, tag = "3")]
    pub chain_id: u64,
    #[prost(uint32, tag = "4")]
    pub transaction_size: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmSignTxnResponse {
    #[prost(oneof = "evm_sign_txn_response::Response", tags = "1, 2")]
    pub response: Option<evm_sign_txn_response::Response>,
}

pub mod evm_sign_txn_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(bool, tag = "1")]
        Accepted(bool),
        #[prost(message, tag = "2")]
        Signature(super::super::SignatureResponse),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EvmSignMsgType {
    SignTypedData = 0,
    PersonalSign = 1,
    EthSign = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmSignMsgRequest {
    #[prost(oneof = "evm_sign_msg_request::Request", tags = "1, 2, 3")]
    pub request: Option<evm_sign_msg_request::Request>,
}

pub mod evm_sign_msg_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        Initiate(super::EvmSignMsgInitiateRequest),
        #[prost(message, tag = "2")]
        MsgData(super::ChunkPayload),
        #[prost(message, tag = "3")]
        SignatureRequest(super::EvmSignMsgSignatureRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmSignMsgInitiateRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub wallet_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub derivation_path: Option<DerivationPath>,
    #[prost(enumeration = "EvmSignMsgType", tag = "3")]
    pub message_type: i32,
    #[prost(uint32, tag = "4")]
    pub total_msg_size: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmSignMsgSignatureRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvmSignMsgResponse {
    #[prost(oneof = "evm_sign_msg_response::Response", tags = "1, 2")]
    pub response: Option<evm_sign_msg_response::Response>,
}

pub mod evm_sign_msg_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(bool, tag = "1")]
        Accepted(bool),
        #[prost(message, tag = "2")]
        Signature(super::super::SignatureResponse),
    }
}

/// Typed-data tree for `sign_typed_data`, prepared by the host with the
/// per-struct type hashes embedded; the device hashes it recursively.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypedDataNode {
    #[prost(string, tag = "1")]
    pub struct_name: String,
    #[prost(enumeration = "TypedDataType", tag = "2")]
    pub r#type: i32,
    #[prost(uint32, tag = "3")]
    pub size: u32,
    #[prost(string, tag = "4")]
    pub type_name: String,
    #[prost(bytes = "vec", tag = "5")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub type_hash: Vec<u8>,
    #[prost(message, repeated, tag = "7")]
    pub children: Vec<TypedDataNode>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TypedDataType {
    Uint = 0,
    Int = 1,
    Bytes = 2,
    String = 3,
    Bool = 4,
    Address = 5,
    Array = 6,
    Struct = 7,
}

/// Root of a typed-data signing request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignTypedDataStruct {
    #[prost(message, optional, tag = "1")]
    pub domain: Option<TypedDataNode>,
    #[prost(message, optional, tag = "2")]
    pub message: Option<TypedDataNode>,
}
