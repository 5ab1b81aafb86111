//! Manager-app queries and responses.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ManagerQuery {
    #[prost(oneof = "manager_query::Request", tags = "1, 2")]
    pub request: Option<manager_query::Request>,
}

pub mod manager_query {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        GetDeviceInfo(super::GetDeviceInfoRequest),
        #[prost(message, tag = "2")]
        AuthCard(super::AuthCardRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ManagerResponse {
    #[prost(oneof = "manager_response::Response", tags = "1, 2")]
    pub response: Option<manager_response::Response>,
}

pub mod manager_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        GetDeviceInfo(super::GetDeviceInfoResponse),
        #[prost(message, tag = "2")]
        AuthCard(super::AuthCardResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDeviceInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDeviceInfoResponse {
    #[prost(uint32, tag = "1")]
    pub firmware_version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub family_id: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub paired_card_count: u32,
    #[prost(bool, tag = "4")]
    pub passphrase_enabled: bool,
    #[prost(bool, tag = "5")]
    pub logging_enabled: bool,
    #[prost(uint32, tag = "6")]
    pub wallet_count: u32,
}

/// `auth_card`: the host challenges a card to prove its applet key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthCardRequest {
    #[prost(oneof = "auth_card_request::Request", tags = "1, 2")]
    pub request: Option<auth_card_request::Request>,
}

pub mod auth_card_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        Initiate(super::AuthCardInitiateRequest),
        #[prost(message, tag = "2")]
        Challenge(super::AuthCardChallengeRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthCardInitiateRequest {
    /// Card slot to authenticate (1..=4).
    #[prost(uint32, tag = "1")]
    pub card_index: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthCardChallengeRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub challenge: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthCardResponse {
    #[prost(oneof = "auth_card_response::Response", tags = "1, 2")]
    pub response: Option<auth_card_response::Response>,
}

pub mod auth_card_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(bool, tag = "1")]
        Accepted(bool),
        #[prost(message, tag = "2")]
        Signature(super::AuthCardSignature),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthCardSignature {
    #[prost(bytes = "vec", tag = "1")]
    pub card_key_id: Vec<u8>,
    /// DER signature over SHA-256 of the host challenge.
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}
