//! Messages shared by every app.

/// BIP-32 path; hardened components carry the 0x80000000 bit.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DerivationPath {
    #[prost(uint32, repeated, tag = "1")]
    pub components: Vec<u32>,
}

/// Wire-level error kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorKind {
    UnknownError = 0,
    InvalidRequest = 1,
    InvalidData = 2,
    UserRejection = 3,
    DeviceCorrupt = 4,
    AppNotSupported = 5,
}

/// Error arm of every response: a kind plus an app-specific sub-kind.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommonError {
    #[prost(enumeration = "ErrorKind", tag = "1")]
    pub kind: i32,
    #[prost(uint32, tag = "2")]
    pub sub_kind: u32,
}

/// Chunked payload carrier for oversized fields (raw transactions,
/// messages). `remaining_size` counts the bytes still to come after this
/// chunk.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkPayload {
    #[prost(bytes = "vec", tag = "1")]
    pub chunk: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub chunk_index: u32,
    #[prost(uint32, tag = "3")]
    pub total_chunks: u32,
    #[prost(uint32, tag = "4")]
    pub remaining_size: u32,
}

/// ECDSA signature response shared by the chain apps.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignatureResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub r: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub s: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub v: u32,
}
