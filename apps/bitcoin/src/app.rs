//! Query handlers and the chunked `sign_txn` flow.
//!
//! The flow position is a single ADT advanced by `step`; each host
//! sub-request moves it forward or fails the whole command. The seed is
//! borrowed from the caller for the duration of the flow and never stored
//! here.

use log::debug;
use x1_common::path::Bip32Path;
use x1_proto::{
    sign_txn_request, sign_txn_response, GetPublicKeyRequest, GetPublicKeyResponse,
    GetXpubsRequest, GetXpubsResponse, SignTxnResponse, SignTxnSignature,
};
use x1_sdk::codec::{der, varint};
use x1_sdk::curve::{self, HdNode};
use x1_sdk::hash::hash160;
use x1_sdk::ux::{Decision, TagValue, UserConsent};

use crate::address::{derive_address, derive_xpub};
use crate::script::{
    p2pkh_script, p2sh_p2wpkh_redeem_script, script_address, ScriptType,
};
use crate::sighash::{legacy_digest, segwit_digest, SegwitCache};
use crate::txn::{
    fee, fee_threshold, spendable_script, transaction_weight, validate_change_output,
    verify_input_utxo, TxnInput, TxnOutput, UnsignedTxn,
};
use crate::{BtcError, CoinParams};

const MAX_INPUTS: usize = 200;
const MAX_OUTPUTS: usize = 200;

/// Formats satoshis as a decimal coin amount.
fn format_amount(satoshi: u64, unit: &str) -> String {
    let whole = satoshi / 100_000_000;
    let frac = satoshi % 100_000_000;
    let mut frac_str = format!("{:08}", frac);
    while frac_str.len() > 1 && frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{}.{} {}", whole, frac_str, unit)
}

/// Stateless per-query handlers.
pub struct BitcoinApp {
    pub params: CoinParams,
}

impl BitcoinApp {
    pub fn new(params: CoinParams) -> BitcoinApp {
        BitcoinApp { params }
    }

    /// `get_xpubs`: account-level extended public keys for each path.
    pub fn get_xpubs(
        &self,
        seed: &[u8],
        request: &GetXpubsRequest,
    ) -> Result<GetXpubsResponse, BtcError> {
        if request.derivation_paths.is_empty() {
            return Err(BtcError::InvalidRequest);
        }
        let mut xpubs = Vec::with_capacity(request.derivation_paths.len());
        for path in &request.derivation_paths {
            let path = Bip32Path::from_slice(&path.components);
            if !path.is_valid_bitcoin_path() {
                return Err(BtcError::InvalidDerivationPath);
            }
            xpubs.push(derive_xpub(seed, &path)?);
        }
        Ok(GetXpubsResponse { xpubs })
    }

    /// `get_public_key`: derives and displays one receive address.
    pub fn get_public_key(
        &self,
        seed: &[u8],
        consent: &mut dyn UserConsent,
        request: &GetPublicKeyRequest,
    ) -> Result<GetPublicKeyResponse, BtcError> {
        let path = request
            .derivation_path
            .as_ref()
            .map(|p| Bip32Path::from_slice(&p.components))
            .ok_or(BtcError::InvalidRequest)?;
        if !path.is_valid_bitcoin_path() || path.len() != 5 {
            return Err(BtcError::InvalidDerivationPath);
        }

        let node = HdNode::derive(seed, &path).map_err(|_| BtcError::KeyDerivationFailed)?;
        let address = derive_address(seed, &path, &self.params)?;

        match consent.review_pairs(
            "Verify address",
            &[TagValue::new("Address", address.clone())],
            "Confirm",
        ) {
            Decision::Approved => {}
            Decision::Rejected => return Err(BtcError::UserRejected),
            Decision::TimedOut => return Err(BtcError::Timeout),
        }

        Ok(GetPublicKeyResponse {
            public_key: node.public_key().to_vec(),
            address,
        })
    }
}

/// Where the sign flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowStage {
    AwaitingMetadata,
    CollectingInputs,
    CollectingOutputs,
    Signing { next_input: u32 },
    Done,
}

/// The chunked transaction-signing flow.
pub struct SignFlow {
    params: CoinParams,
    account_path: Bip32Path,
    stage: FlowStage,
    txn: UnsignedTxn,
    expected_inputs: u32,
    expected_outputs: u32,
    /// Reassembly buffer for a chunked previous transaction.
    prev_txn_buffer: Vec<u8>,
    cache: Option<SegwitCache>,
}

impl SignFlow {
    /// Starts a flow from the initiate sub-request.
    pub fn initiate(
        params: CoinParams,
        request: &x1_proto::SignTxnInitiateRequest,
    ) -> Result<SignFlow, BtcError> {
        let path = request
            .derivation_path
            .as_ref()
            .map(|p| Bip32Path::from_slice(&p.components))
            .ok_or(BtcError::InvalidRequest)?;
        if !path.is_valid_bitcoin_path() || path.len() != 3 {
            return Err(BtcError::InvalidDerivationPath);
        }
        Ok(SignFlow {
            params,
            account_path: path,
            stage: FlowStage::AwaitingMetadata,
            txn: UnsignedTxn::default(),
            expected_inputs: 0,
            expected_outputs: 0,
            prev_txn_buffer: Vec::new(),
            cache: None,
        })
    }

    pub fn is_done(&self) -> bool {
        self.stage == FlowStage::Done
    }

    /// Advances the flow with the next sub-request.
    pub fn step(
        &mut self,
        request: &sign_txn_request::Request,
        seed: &[u8],
        consent: &mut dyn UserConsent,
    ) -> Result<SignTxnResponse, BtcError> {
        match (self.stage, request) {
            (FlowStage::AwaitingMetadata, sign_txn_request::Request::Metadata(meta)) => {
                self.on_metadata(meta)
            }
            (FlowStage::CollectingInputs, sign_txn_request::Request::Input(input)) => {
                self.on_input(input, seed)
            }
            (FlowStage::CollectingOutputs, sign_txn_request::Request::Output(output)) => {
                self.on_output(output, seed, consent)
            }
            (
                FlowStage::Signing { next_input },
                sign_txn_request::Request::SignatureRequest(req),
            ) => {
                if req.input_index != next_input {
                    return Err(BtcError::InvalidRequest);
                }
                self.on_signature_request(req.input_index, seed)
            }
            _ => Err(BtcError::InvalidRequest),
        }
    }

    fn on_metadata(&mut self, meta: &x1_proto::SignTxnMetadata) -> Result<SignTxnResponse, BtcError> {
        if meta.input_count == 0
            || meta.output_count == 0
            || meta.input_count as usize > MAX_INPUTS
            || meta.output_count as usize > MAX_OUTPUTS
        {
            return Err(BtcError::InvalidRequest);
        }
        self.txn.version = meta.version;
        self.txn.locktime = meta.locktime;
        self.txn.sighash = if meta.sighash == 0 { 1 } else { meta.sighash };
        self.expected_inputs = meta.input_count;
        self.expected_outputs = meta.output_count;
        self.stage = FlowStage::CollectingInputs;
        Ok(accepted())
    }

    fn on_input(
        &mut self,
        input: &x1_proto::TxnInput,
        seed: &[u8],
    ) -> Result<SignTxnResponse, BtcError> {
        // The raw previous transaction may arrive in several chunks; the
        // remaining fields repeat on each one.
        let Some(chunk) = &input.prev_txn else {
            return Err(BtcError::InvalidRequest);
        };
        self.prev_txn_buffer.extend_from_slice(&chunk.chunk);
        if chunk.remaining_size > 0 {
            return Ok(accepted());
        }

        let prev_txn_hash: [u8; 32] = input
            .prev_txn_hash
            .as_slice()
            .try_into()
            .map_err(|_| BtcError::InvalidRequest)?;
        let parsed = TxnInput {
            prev_txn_hash,
            prev_output_index: input.prev_output_index,
            value: input.value,
            script_pub_key: input.script_pub_key.clone(),
            sequence: input.sequence,
            change_index: input.change_index,
            address_index: input.address_index,
        };

        // The input's claimed script must belong to this wallet's key.
        let kind = spendable_script(&parsed.script_pub_key)?;
        let pubkey = self.input_pubkey(seed, &parsed)?;
        let owned = match kind {
            ScriptType::P2tr => {
                let tweaked = curve::taproot_output_key(&pubkey, None)
                    .map_err(|_| BtcError::KeyDerivationFailed)?;
                parsed.script_pub_key[2..] == tweaked
            }
            _ => crate::script::change_script_matches(&parsed.script_pub_key, &pubkey)
                .unwrap_or(false),
        };
        if !owned {
            return Err(BtcError::UnknownScript);
        }

        let raw = core::mem::take(&mut self.prev_txn_buffer);
        verify_input_utxo(&raw, &parsed)?;

        self.txn.inputs.push(parsed);
        if self.txn.inputs.len() as u32 == self.expected_inputs {
            self.stage = FlowStage::CollectingOutputs;
        }
        Ok(accepted())
    }

    fn on_output(
        &mut self,
        output: &x1_proto::TxnOutput,
        seed: &[u8],
        consent: &mut dyn UserConsent,
    ) -> Result<SignTxnResponse, BtcError> {
        let parsed = TxnOutput {
            value: output.value,
            script_pub_key: output.script_pub_key.clone(),
            is_change: output.is_change,
            change_index: output.change_index,
        };
        if parsed.is_change {
            let change_path = self.account_path.child(&[1, parsed.change_index]);
            let node =
                HdNode::derive(seed, &change_path).map_err(|_| BtcError::KeyDerivationFailed)?;
            validate_change_output(&parsed, &node.public_key())?;
        } else {
            // Must be displayable to the user.
            script_address(&parsed.script_pub_key, &self.params)?;
        }

        self.txn.outputs.push(parsed);
        if self.txn.outputs.len() as u32 == self.expected_outputs {
            self.finish_collection(consent)?;
        }
        Ok(accepted())
    }

    /// Fee checks and the user review, then the segwit cache.
    fn finish_collection(&mut self, consent: &mut dyn UserConsent) -> Result<(), BtcError> {
        let fee_value = fee(&self.txn)?;
        let threshold = fee_threshold(&self.txn, &self.params);
        if fee_value > threshold {
            match consent.confirm("Fee is unusually high. Continue anyway?") {
                Decision::Approved => {}
                Decision::Rejected => return Err(BtcError::UserRejected),
                Decision::TimedOut => return Err(BtcError::Timeout),
            }
        }

        let mut pairs = Vec::new();
        for output in self.txn.outputs.iter().filter(|o| !o.is_change) {
            pairs.push(TagValue::new(
                script_address(&output.script_pub_key, &self.params)?,
                format_amount(output.value, self.params.unit),
            ));
        }
        pairs.push(TagValue::new(
            "Fee",
            format_amount(fee_value, self.params.unit),
        ));
        match consent.review_pairs("Sign transaction", &pairs, "Sign") {
            Decision::Approved => {}
            Decision::Rejected => return Err(BtcError::UserRejected),
            Decision::TimedOut => return Err(BtcError::Timeout),
        }

        debug!(
            "sign_txn approved: {} inputs, {} outputs, weight {}",
            self.txn.inputs.len(),
            self.txn.outputs.len(),
            transaction_weight(&self.txn)
        );
        self.cache = Some(SegwitCache::new(&self.txn));
        self.stage = FlowStage::Signing { next_input: 0 };
        Ok(())
    }

    fn input_pubkey(&self, seed: &[u8], input: &TxnInput) -> Result<[u8; 33], BtcError> {
        if input.change_index > 1 {
            return Err(BtcError::InvalidDerivationPath);
        }
        let path = self
            .account_path
            .child(&[input.change_index, input.address_index]);
        let node = HdNode::derive(seed, &path).map_err(|_| BtcError::KeyDerivationFailed)?;
        Ok(node.public_key())
    }

    fn on_signature_request(
        &mut self,
        input_index: u32,
        seed: &[u8],
    ) -> Result<SignTxnResponse, BtcError> {
        let input = self
            .txn
            .inputs
            .get(input_index as usize)
            .ok_or(BtcError::InvalidRequest)?
            .clone();
        let cache = self.cache.as_ref().ok_or(BtcError::InvalidRequest)?;

        let path = self
            .account_path
            .child(&[input.change_index, input.address_index]);
        let node = HdNode::derive(seed, &path).map_err(|_| BtcError::KeyDerivationFailed)?;
        let pubkey = node.public_key();
        let privkey = node.private_key_bytes();

        let kind = spendable_script(&input.script_pub_key)?;
        let (signature, unlocking) = match kind {
            ScriptType::P2pkh => {
                let digest =
                    legacy_digest(&self.txn, input_index as usize, &input.script_pub_key)?;
                let sig = curve::ecdsa_sign(&privkey, &digest)
                    .map_err(|_| BtcError::SigningFailed)?;
                let der = der::sig_to_der(&sig.r, &sig.s);
                (der.clone(), p2pkh_script_sig(&der, &pubkey, self.txn.sighash))
            }
            ScriptType::P2wpkh => {
                let script_code = p2pkh_script(&hash160(&pubkey));
                let digest =
                    segwit_digest(&self.txn, cache, input_index as usize, &script_code)?;
                let sig = curve::ecdsa_sign(&privkey, &digest)
                    .map_err(|_| BtcError::SigningFailed)?;
                (
                    sig.to_fixed_bytes().to_vec(),
                    p2wpkh_witness(&sig.r, &sig.s, &pubkey, self.txn.sighash),
                )
            }
            ScriptType::P2sh => {
                // wrapped segwit: witness plus the redeem-script push
                let script_code = p2pkh_script(&hash160(&pubkey));
                let digest =
                    segwit_digest(&self.txn, cache, input_index as usize, &script_code)?;
                let sig = curve::ecdsa_sign(&privkey, &digest)
                    .map_err(|_| BtcError::SigningFailed)?;
                let redeem = p2sh_p2wpkh_redeem_script(&pubkey);
                let mut script_sig = Vec::with_capacity(redeem.len() + 1);
                script_sig.push(redeem.len() as u8);
                script_sig.extend_from_slice(&redeem);
                let mut unlocking = p2wpkh_witness(&sig.r, &sig.s, &pubkey, self.txn.sighash);
                unlocking.splice(0..0, script_sig);
                (sig.to_fixed_bytes().to_vec(), unlocking)
            }
            _ => return Err(BtcError::UnknownScript),
        };

        let next = input_index + 1;
        self.stage = if next as usize == self.txn.inputs.len() {
            FlowStage::Done
        } else {
            FlowStage::Signing { next_input: next }
        };

        Ok(SignTxnResponse {
            response: Some(sign_txn_response::Response::Signature(SignTxnSignature {
                signature,
                unlocking,
            })),
        })
    }
}

fn accepted() -> SignTxnResponse {
    SignTxnResponse {
        response: Some(sign_txn_response::Response::Accepted(true)),
    }
}

/// `push(sig || hashtype) push(pubkey)`
fn p2pkh_script_sig(der_sig: &[u8], pubkey: &[u8; 33], sighash: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(der_sig.len() + 36);
    out.push(der_sig.len() as u8 + 1);
    out.extend_from_slice(der_sig);
    out.push(sighash as u8);
    out.push(pubkey.len() as u8);
    out.extend_from_slice(pubkey);
    out
}

/// Two-element witness stack `[sig || hashtype, pubkey]`, serialized.
fn p2wpkh_witness(r: &[u8; 32], s: &[u8; 32], pubkey: &[u8; 33], sighash: u32) -> Vec<u8> {
    let der = der::sig_to_der(r, s);
    let mut out = Vec::with_capacity(der.len() + 40);
    varint::write(2, &mut out);
    out.push(der.len() as u8 + 1);
    out.extend_from_slice(&der);
    out.push(sighash as u8);
    out.push(pubkey.len() as u8);
    out.extend_from_slice(pubkey);
    out
}
