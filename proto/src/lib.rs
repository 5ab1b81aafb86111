//! Host-protocol protobuf messages.
//!
//! Hand-written prost types; message and field names are preserved from the
//! desktop protocol so the wire stays compatible. One fully reassembled
//! command payload decodes into a [`Query`]; every response encodes from a
//! [`QueryResponse`].

mod btc;
mod common;
mod evm;
mod manager;

pub use btc::*;
pub use common::*;
pub use evm::*;
pub use manager::*;

use prost::Message;

/// Decodes a reassembled command payload.
pub fn decode_query(payload: &[u8]) -> Result<Query, prost::DecodeError> {
    Query::decode(payload)
}

/// Encodes a response for chunked transmission.
pub fn encode_response(response: &QueryResponse) -> Vec<u8> {
    response.encode_to_vec()
}

/// Top-level query union, dispatched by app.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Query {
    #[prost(oneof = "query::App", tags = "1, 2, 3")]
    pub app: Option<query::App>,
}

pub mod query {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum App {
        #[prost(message, tag = "1")]
        Manager(super::ManagerQuery),
        #[prost(message, tag = "2")]
        BtcFamily(super::BtcQuery),
        #[prost(message, tag = "3")]
        EvmFamily(super::EvmQuery),
    }
}

/// Top-level response union; mirrors [`Query`] plus the common error arm.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryResponse {
    #[prost(oneof = "query_response::App", tags = "1, 2, 3, 4")]
    pub app: Option<query_response::App>,
}

pub mod query_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum App {
        #[prost(message, tag = "1")]
        Manager(super::ManagerResponse),
        #[prost(message, tag = "2")]
        BtcFamily(super::BtcResponse),
        #[prost(message, tag = "3")]
        EvmFamily(super::EvmResponse),
        #[prost(message, tag = "4")]
        CommonError(super::CommonError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_roundtrip() {
        let query = Query {
            app: Some(query::App::BtcFamily(BtcQuery {
                request: Some(btc_query::Request::GetPublicKey(GetPublicKeyRequest {
                    wallet_id: vec![7u8; 32],
                    derivation_path: Some(DerivationPath {
                        components: vec![0x8000_0054, 0x8000_0000, 0x8000_0000, 0, 0],
                    }),
                })),
            })),
        };
        let bytes = query.encode_to_vec();
        assert_eq!(decode_query(&bytes).unwrap(), query);
    }

    #[test]
    fn test_error_response_roundtrip() {
        let response = QueryResponse {
            app: Some(query_response::App::CommonError(CommonError {
                kind: ErrorKind::UserRejection as i32,
                sub_kind: 0,
            })),
        };
        let bytes = encode_response(&response);
        assert_eq!(QueryResponse::decode(bytes.as_slice()).unwrap(), response);
    }

    #[test]
    fn test_unknown_bytes_fail_closed() {
        assert!(decode_query(&[0xFF, 0xFF, 0xFF]).is_err());
    }
}
