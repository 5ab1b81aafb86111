//! EVM query flows: chunked transaction signing and message signing.
//!
//! Calldata classification decides the consent path: a whitelisted ERC-20
//! transfer renders in token units, a known function renders its decoded
//! arguments, and anything else must pass the explicit blind-signing
//! screen before a signature is produced.

use log::debug;
use prost::Message;
use x1_common::path::Bip32Path;
use x1_proto::{
    evm_sign_msg_request, evm_sign_msg_response, evm_sign_txn_response, ChunkPayload,
    EvmSignMsgInitiateRequest, EvmSignMsgResponse, EvmSignMsgType, EvmSignTxnInitiateRequest,
    EvmSignTxnResponse, SignTypedDataStruct, SignatureResponse,
};
use x1_sdk::curve::{self, HdNode};
use x1_sdk::hash::keccak256;
use x1_sdk::ux::{Decision, TagValue, UserConsent};
use zeroize::Zeroizing;

use crate::contracts::{known_function, whitelisted_token, KnownFunction, TokenInfo};
use crate::parsing::abi::{self, AbiValue};
use crate::parsing::{transaction, typed_data, ParsedTransaction};
use crate::utils::{fee_wei, format_units, format_value32};
use crate::{ChainParams, EvmError};

const MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// How the calldata will be shown to the user.
enum PayloadKind {
    /// Plain value transfer (no calldata).
    Plain,
    /// `transfer(address,uint256)` on a whitelisted token contract.
    TokenTransfer {
        token: &'static TokenInfo,
        recipient: [u8; 20],
        amount: [u8; 32],
    },
    /// Known function signature rendered argument by argument.
    Known {
        function: &'static KnownFunction,
        values: Vec<AbiValue>,
    },
    /// Opaque contract call; blind signing only.
    Blind,
}

pub struct EvmApp {
    pub params: ChainParams,
}

impl EvmApp {
    pub fn new(params: ChainParams) -> EvmApp {
        EvmApp { params }
    }

    pub fn sign_txn(&self, request: &EvmSignTxnInitiateRequest) -> Result<SignTxnFlow, EvmError> {
        SignTxnFlow::initiate(self.params, request)
    }

    pub fn sign_msg(&self, request: &EvmSignMsgInitiateRequest) -> Result<SignMsgFlow, EvmError> {
        SignMsgFlow::initiate(self.params, request)
    }
}

fn validated_path(
    path: Option<&x1_proto::DerivationPath>,
) -> Result<Bip32Path, EvmError> {
    let path = path
        .map(|p| Bip32Path::from_slice(&p.components))
        .ok_or(EvmError::InvalidRequest)?;
    if !path.is_valid_evm_path() {
        return Err(EvmError::InvalidDerivationPath);
    }
    Ok(path)
}

fn require(decision: Decision) -> Result<(), EvmError> {
    match decision {
        Decision::Approved => Ok(()),
        Decision::Rejected => Err(EvmError::UserRejected),
        Decision::TimedOut => Err(EvmError::Timeout),
    }
}

fn sign_digest(
    seed: &[u8],
    path: &Bip32Path,
    digest: &[u8; 32],
) -> Result<curve::RecoverableSignature, EvmError> {
    let node = HdNode::derive(seed, path).map_err(|_| EvmError::KeyDerivationFailed)?;
    let privkey: Zeroizing<[u8; 32]> = node.private_key_bytes();
    curve::ecdsa_sign(&privkey, digest).map_err(|_| EvmError::SigningFailed)
}

/// Chunked raw-transaction signing.
pub struct SignTxnFlow {
    params: ChainParams,
    path: Bip32Path,
    expected_size: usize,
    buffer: Vec<u8>,
    done: bool,
}

impl SignTxnFlow {
    pub fn initiate(
        params: ChainParams,
        request: &EvmSignTxnInitiateRequest,
    ) -> Result<SignTxnFlow, EvmError> {
        let path = validated_path(request.derivation_path.as_ref())?;
        if request.chain_id != params.chain_id {
            return Err(EvmError::ChainIdMismatch);
        }
        let expected_size = request.transaction_size as usize;
        if expected_size == 0 || expected_size > 16 * 1024 {
            return Err(EvmError::InvalidRequest);
        }
        Ok(SignTxnFlow {
            params,
            path,
            expected_size,
            buffer: Vec::with_capacity(expected_size),
            done: false,
        })
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds the next raw-transaction chunk; the final chunk triggers
    /// verification, consent and signing.
    pub fn step_chunk(
        &mut self,
        chunk: &ChunkPayload,
        seed: &[u8],
        consent: &mut dyn UserConsent,
    ) -> Result<EvmSignTxnResponse, EvmError> {
        if self.done {
            return Err(EvmError::InvalidRequest);
        }
        if self.buffer.len() + chunk.chunk.len() > self.expected_size {
            return Err(EvmError::InvalidRequest);
        }
        self.buffer.extend_from_slice(&chunk.chunk);
        if chunk.remaining_size > 0 {
            return Ok(EvmSignTxnResponse {
                response: Some(evm_sign_txn_response::Response::Accepted(true)),
            });
        }
        if self.buffer.len() != self.expected_size {
            return Err(EvmError::InvalidRequest);
        }

        let parsed = transaction::parse(&self.buffer, &self.params)?;
        self.review(&parsed, consent)?;

        let signature = sign_digest(seed, &self.path, &parsed.sign_hash)?;
        let v = match parsed.tx_type {
            transaction::TransactionType::Legacy => {
                parsed.chain_id * 2 + 35 + signature.recovery_id as u64
            }
            _ => signature.recovery_id as u64,
        };
        self.done = true;

        Ok(EvmSignTxnResponse {
            response: Some(evm_sign_txn_response::Response::Signature(
                SignatureResponse {
                    r: signature.r.to_vec(),
                    s: signature.s.to_vec(),
                    v: v as u32,
                },
            )),
        })
    }

    fn review(
        &self,
        parsed: &ParsedTransaction,
        consent: &mut dyn UserConsent,
    ) -> Result<(), EvmError> {
        let kind = self.classify(parsed)?;

        let mut pairs = Vec::new();
        match &kind {
            PayloadKind::Plain => {
                if let Some(to) = &parsed.to {
                    pairs.push(TagValue::new("To", format!("0x{}", hex::encode(to))));
                }
                pairs.push(TagValue::new(
                    "Amount",
                    format_value32(&parsed.value, self.params.decimals, self.params.unit),
                ));
            }
            PayloadKind::TokenTransfer {
                token,
                recipient,
                amount,
            } => {
                pairs.push(TagValue::new("Token", token.symbol));
                pairs.push(TagValue::new("To", format!("0x{}", hex::encode(recipient))));
                pairs.push(TagValue::new(
                    "Amount",
                    format_value32(amount, token.decimals, token.symbol),
                ));
            }
            PayloadKind::Known { function, values } => {
                pairs.push(TagValue::new("Function", function.name));
                for (i, value) in values.iter().enumerate() {
                    pairs.push(TagValue::new(format!("Arg {}", i + 1), abi::stringify(value)));
                }
                pairs.push(TagValue::new(
                    "Amount",
                    format_value32(&parsed.value, self.params.decimals, self.params.unit),
                ));
            }
            PayloadKind::Blind => {
                // distinct screen: the user must opt in to an unverified call
                require(consent.confirm(
                    "This contract call cannot be verified. Blind sign anyway?",
                ))?;
                if let Some(to) = &parsed.to {
                    pairs.push(TagValue::new("Contract", format!("0x{}", hex::encode(to))));
                }
                pairs.push(TagValue::new(
                    "Amount",
                    format_value32(&parsed.value, self.params.decimals, self.params.unit),
                ));
            }
        }

        let fee = fee_wei(parsed.gas_price, parsed.gas_limit);
        pairs.push(TagValue::new(
            "Max fee",
            format_units(fee, self.params.decimals, self.params.unit),
        ));

        debug!("evm sign_txn review: nonce {}, gas {}", parsed.nonce, parsed.gas_limit);
        require(consent.review_pairs("Sign transaction", &pairs, "Sign"))
    }

    fn classify(&self, parsed: &ParsedTransaction) -> Result<PayloadKind, EvmError> {
        let Some(selector) = parsed.selector() else {
            return Ok(if parsed.data.is_empty() {
                PayloadKind::Plain
            } else {
                PayloadKind::Blind
            });
        };
        let arguments = &parsed.data[4..];

        if selector == crate::contracts::SEL_TRANSFER {
            if let Some(token) = parsed.to.as_ref().and_then(whitelisted_token) {
                let values = abi::decode_arguments(
                    arguments,
                    &[abi::AbiType::Address, abi::AbiType::Uint256],
                )?;
                // the outer value must be zero for a token transfer
                if parsed.value.iter().any(|&b| b != 0) {
                    return Err(EvmError::TokenValueNotZero);
                }
                let (AbiValue::Address(recipient), AbiValue::Uint256(amount)) =
                    (&values[0], &values[1])
                else {
                    return Err(EvmError::InvalidCalldata);
                };
                return Ok(PayloadKind::TokenTransfer {
                    token,
                    recipient: *recipient,
                    amount: *amount,
                });
            }
        }

        if let Some(function) = known_function(&selector) {
            let values = abi::decode_arguments(arguments, function.arguments)?;
            return Ok(PayloadKind::Known { function, values });
        }

        Ok(PayloadKind::Blind)
    }
}

/// Message signing: personal-sign, the legacy eth-sign form and EIP-712
/// typed data.
pub struct SignMsgFlow {
    path: Bip32Path,
    message_type: EvmSignMsgType,
    expected_size: usize,
    buffer: Vec<u8>,
    done: bool,
}

impl SignMsgFlow {
    pub fn initiate(
        _params: ChainParams,
        request: &EvmSignMsgInitiateRequest,
    ) -> Result<SignMsgFlow, EvmError> {
        let path = validated_path(request.derivation_path.as_ref())?;
        let message_type =
            EvmSignMsgType::try_from(request.message_type).map_err(|_| EvmError::InvalidRequest)?;
        let expected_size = request.total_msg_size as usize;
        if expected_size == 0 || expected_size > MAX_MESSAGE_SIZE {
            return Err(EvmError::InvalidMessage);
        }
        Ok(SignMsgFlow {
            path,
            message_type,
            expected_size,
            buffer: Vec::with_capacity(expected_size),
            done: false,
        })
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn step(
        &mut self,
        request: &evm_sign_msg_request::Request,
        seed: &[u8],
        consent: &mut dyn UserConsent,
    ) -> Result<EvmSignMsgResponse, EvmError> {
        match request {
            evm_sign_msg_request::Request::MsgData(chunk) => self.on_chunk(chunk),
            evm_sign_msg_request::Request::SignatureRequest(_) => {
                self.on_signature_request(seed, consent)
            }
            evm_sign_msg_request::Request::Initiate(_) => Err(EvmError::InvalidRequest),
        }
    }

    fn on_chunk(&mut self, chunk: &ChunkPayload) -> Result<EvmSignMsgResponse, EvmError> {
        if self.done || self.buffer.len() + chunk.chunk.len() > self.expected_size {
            return Err(EvmError::InvalidMessage);
        }
        self.buffer.extend_from_slice(&chunk.chunk);
        Ok(EvmSignMsgResponse {
            response: Some(evm_sign_msg_response::Response::Accepted(true)),
        })
    }

    fn on_signature_request(
        &mut self,
        seed: &[u8],
        consent: &mut dyn UserConsent,
    ) -> Result<EvmSignMsgResponse, EvmError> {
        if self.buffer.len() != self.expected_size {
            return Err(EvmError::InvalidMessage);
        }
        let digest = self.message_digest()?;

        let preview = if let Ok(text) = core::str::from_utf8(&self.buffer) {
            if text.chars().all(|c| !c.is_control()) {
                text.to_string()
            } else {
                format!("0x{}", hex::encode(&self.buffer))
            }
        } else {
            format!("0x{}", hex::encode(&self.buffer))
        };
        let intro = match self.message_type {
            EvmSignMsgType::PersonalSign => "Sign message",
            EvmSignMsgType::EthSign => "Sign hash (legacy eth_sign)",
            EvmSignMsgType::SignTypedData => "Sign typed data",
        };
        require(consent.review_pairs(
            intro,
            &[TagValue::new("Message", preview)],
            "Sign",
        ))?;

        let signature = sign_digest(seed, &self.path, &digest)?;
        self.done = true;
        Ok(EvmSignMsgResponse {
            response: Some(evm_sign_msg_response::Response::Signature(
                SignatureResponse {
                    r: signature.r.to_vec(),
                    s: signature.s.to_vec(),
                    v: 27 + signature.recovery_id as u32,
                },
            )),
        })
    }

    /// Digest selection per message type.
    pub fn message_digest(&self) -> Result<[u8; 32], EvmError> {
        match self.message_type {
            EvmSignMsgType::PersonalSign => Ok(personal_sign_digest(&self.buffer)),
            EvmSignMsgType::EthSign => {
                // the legacy form signs exactly one 32-byte word
                if self.buffer.len() != 32 {
                    return Err(EvmError::InvalidMessage);
                }
                Ok(keccak256(&self.buffer))
            }
            EvmSignMsgType::SignTypedData => {
                let typed = SignTypedDataStruct::decode(self.buffer.as_slice())
                    .map_err(|_| EvmError::InvalidMessage)?;
                typed_data::digest(&typed)
            }
        }
    }
}

/// `keccak256("\x19Ethereum Signed Message:\n" || decimal(len) || msg)`
pub fn personal_sign_digest(message: &[u8]) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(message.len() + 30);
    preimage.extend_from_slice(b"\x19Ethereum Signed Message:\n");
    preimage.extend_from_slice(message.len().to_string().as_bytes());
    preimage.extend_from_slice(message);
    keccak256(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use x1_proto::DerivationPath;
    use x1_sdk::ux::testing::{AutoApprove, RejectAt};

    const SEED: [u8; 64] = [0x42; 64];

    fn eth_path() -> Option<DerivationPath> {
        Some(DerivationPath {
            components: vec![0x8000_002C, 0x8000_003C, 0x8000_0000, 0, 0],
        })
    }

    fn msg_flow(message_type: EvmSignMsgType, message: &[u8]) -> SignMsgFlow {
        let mut flow = SignMsgFlow::initiate(
            crate::ETHEREUM,
            &EvmSignMsgInitiateRequest {
                wallet_id: vec![1; 32],
                derivation_path: eth_path(),
                message_type: message_type as i32,
                total_msg_size: message.len() as u32,
            },
        )
        .unwrap();
        flow.buffer = message.to_vec();
        flow
    }

    #[test]
    fn test_personal_sign_digest_vector() {
        let message = b"My email is john@doe.com - 1693898375561";
        assert_eq!(
            personal_sign_digest(message),
            hex!("f8572657f9d0ea800c2eaf259932a95ac445f747ecc9ae18bbc0f9aef590164e")
        );
    }

    #[test]
    fn test_eth_sign_requires_32_bytes() {
        let word = [0xABu8; 32];
        let flow = msg_flow(EvmSignMsgType::EthSign, &word);
        assert_eq!(flow.message_digest().unwrap(), keccak256(&word));

        let flow = msg_flow(EvmSignMsgType::EthSign, &[0xAB; 31]);
        assert_eq!(flow.message_digest().unwrap_err(), EvmError::InvalidMessage);
    }

    #[test]
    fn test_sign_msg_flow_end_to_end() {
        let message = b"My email is john@doe.com - 1693898375561";
        let mut flow = SignMsgFlow::initiate(
            crate::ETHEREUM,
            &EvmSignMsgInitiateRequest {
                wallet_id: vec![1; 32],
                derivation_path: eth_path(),
                message_type: EvmSignMsgType::PersonalSign as i32,
                total_msg_size: message.len() as u32,
            },
        )
        .unwrap();

        let mut consent = AutoApprove::default();
        let (first, second) = message.split_at(10);
        for (part, remaining) in [(first, second.len() as u32), (second, 0)] {
            flow.step(
                &evm_sign_msg_request::Request::MsgData(ChunkPayload {
                    chunk: part.to_vec(),
                    chunk_index: 0,
                    total_chunks: 2,
                    remaining_size: remaining,
                }),
                &SEED,
                &mut consent,
            )
            .unwrap();
        }

        let response = flow
            .step(
                &evm_sign_msg_request::Request::SignatureRequest(
                    x1_proto::EvmSignMsgSignatureRequest {},
                ),
                &SEED,
                &mut consent,
            )
            .unwrap();
        let Some(evm_sign_msg_response::Response::Signature(sig)) = response.response else {
            panic!("expected signature");
        };
        assert!(sig.v == 27 || sig.v == 28);
        assert!(flow.is_done());
    }

    #[test]
    fn test_sign_txn_plain_transfer() {
        let raw = hex!("02e001800a64830186a094b0ee076d7779a6ce152283f009f4c32b5f88756c6480c0");
        let mut flow = SignTxnFlow::initiate(
            crate::ETHEREUM,
            &EvmSignTxnInitiateRequest {
                wallet_id: vec![1; 32],
                derivation_path: eth_path(),
                chain_id: 1,
                transaction_size: raw.len() as u32,
            },
        )
        .unwrap();

        let mut consent = AutoApprove::default();
        let response = flow
            .step_chunk(
                &ChunkPayload {
                    chunk: raw.to_vec(),
                    chunk_index: 0,
                    total_chunks: 1,
                    remaining_size: 0,
                },
                &SEED,
                &mut consent,
            )
            .unwrap();
        let Some(evm_sign_txn_response::Response::Signature(sig)) = response.response else {
            panic!("expected signature");
        };
        // typed transactions use the raw parity for v
        assert!(sig.v <= 1);
        assert_eq!(sig.r.len(), 32);
        // no blind-signing prompt for a plain transfer
        assert!(consent.prompts.iter().all(|p| !p.contains("Blind")));
    }

    #[test]
    fn test_blind_sign_gate() {
        // unknown selector 0xdeadbeef
        let mut fields = Vec::new();
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(1)); // chain
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(0)); // nonce
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(10));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(100));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(100_000));
        fields.extend_from_slice(&crate::parsing::rlp::encode_bytes(&[0x11; 20]));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(0));
        fields.extend_from_slice(&crate::parsing::rlp::encode_bytes(&hex!("deadbeef00")));
        fields.extend_from_slice(&crate::parsing::rlp::encode_list(&[]));
        let mut raw = vec![0x02];
        raw.extend_from_slice(&crate::parsing::rlp::encode_list(&fields));

        let initiate = EvmSignTxnInitiateRequest {
            wallet_id: vec![1; 32],
            derivation_path: eth_path(),
            chain_id: 1,
            transaction_size: raw.len() as u32,
        };
        let chunk = ChunkPayload {
            chunk: raw.clone(),
            chunk_index: 0,
            total_chunks: 1,
            remaining_size: 0,
        };

        // rejecting the blind-sign screen stops the flow
        let mut flow = SignTxnFlow::initiate(crate::ETHEREUM, &initiate).unwrap();
        let mut reject_blind = RejectAt::new(0);
        assert_eq!(
            flow.step_chunk(&chunk, &SEED, &mut reject_blind).unwrap_err(),
            EvmError::UserRejected
        );

        // approving it asks the dedicated question first
        let mut flow = SignTxnFlow::initiate(crate::ETHEREUM, &initiate).unwrap();
        let mut consent = AutoApprove::default();
        flow.step_chunk(&chunk, &SEED, &mut consent).unwrap();
        assert!(consent.prompts[0].contains("Blind sign"));
    }

    #[test]
    fn test_token_transfer_requires_zero_value() {
        // transfer(USDT) with non-zero outer value
        let mut calldata = crate::contracts::SEL_TRANSFER.to_vec();
        calldata.extend_from_slice(&[0u8; 12]);
        calldata.extend_from_slice(&[0x22; 20]);
        let mut amount = [0u8; 32];
        amount[31] = 5;
        calldata.extend_from_slice(&amount);

        let mut fields = Vec::new();
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(1));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(0));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(10));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(100));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(100_000));
        fields.extend_from_slice(&crate::parsing::rlp::encode_bytes(&hex!(
            "dac17f958d2ee523a2206206994597c13d831ec7"
        )));
        fields.extend_from_slice(&crate::parsing::rlp::encode_u64(7)); // non-zero value
        fields.extend_from_slice(&crate::parsing::rlp::encode_bytes(&calldata));
        fields.extend_from_slice(&crate::parsing::rlp::encode_list(&[]));
        let mut raw = vec![0x02];
        raw.extend_from_slice(&crate::parsing::rlp::encode_list(&fields));

        let mut flow = SignTxnFlow::initiate(
            crate::ETHEREUM,
            &EvmSignTxnInitiateRequest {
                wallet_id: vec![1; 32],
                derivation_path: eth_path(),
                chain_id: 1,
                transaction_size: raw.len() as u32,
            },
        )
        .unwrap();
        let mut consent = AutoApprove::default();
        assert_eq!(
            flow.step_chunk(
                &ChunkPayload {
                    chunk: raw,
                    chunk_index: 0,
                    total_chunks: 1,
                    remaining_size: 0
                },
                &SEED,
                &mut consent
            )
            .unwrap_err(),
            EvmError::TokenValueNotZero
        );
    }

    #[test]
    fn test_legacy_v_uses_eip155() {
        let raw = hex!(
            "eb1685050775d80082627094b3c152026d3722cb4acf2fb853fe107dd96bbb5e872386f26fc1000080018080"
        );
        let mut flow = SignTxnFlow::initiate(
            crate::ETHEREUM,
            &EvmSignTxnInitiateRequest {
                wallet_id: vec![1; 32],
                derivation_path: eth_path(),
                chain_id: 1,
                transaction_size: raw.len() as u32,
            },
        )
        .unwrap();
        let mut consent = AutoApprove::default();
        let response = flow
            .step_chunk(
                &ChunkPayload {
                    chunk: raw.to_vec(),
                    chunk_index: 0,
                    total_chunks: 1,
                    remaining_size: 0,
                },
                &SEED,
                &mut consent,
            )
            .unwrap();
        let Some(evm_sign_txn_response::Response::Signature(sig)) = response.response else {
            panic!("expected signature");
        };
        assert!(sig.v == 37 || sig.v == 38);
    }
}
