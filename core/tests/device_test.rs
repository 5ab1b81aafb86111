//! End-to-end: framed protobuf queries against a device with a paired
//! four-card set and one restored wallet.

use std::collections::VecDeque;

use prost::Message;
use x1_card::error::CardError;
use x1_card::mock::MockCard;
use x1_card::pairing::DeviceIdentity;
use x1_card::transport::Transport;
use x1_core::{DeviceCore, SecretEntry};
use x1_host::frame::{chunk_command, decode, PacketType};
use x1_host::Interface;
use x1_proto::{
    btc_query, btc_response, evm_query, evm_response, evm_sign_msg_request,
    evm_sign_msg_response, manager_query, manager_response, query, query_response,
    DerivationPath, GetXpubsRequest, Query, QueryResponse,
};
use x1_sdk::rand::testing::FixedEntropy;
use x1_sdk::rand::Drbg;
use x1_sdk::ux::testing::AutoApprove;
use x1_store::{MockFlash, Store};
use x1_vault::lifecycle::{pair_card, restore_wallet, VaultEnv, WalletParams};
use zeroize::Zeroizing;

const FAMILY: [u8; 4] = [0x11, 0x22, 0x33, 0x44];
const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

struct CardDeck {
    cards: Vec<MockCard>,
    taps: VecDeque<u8>,
    current: usize,
}

impl CardDeck {
    fn script(&mut self, taps: &[u8]) {
        self.taps = taps.iter().copied().collect();
    }
}

impl Transport for CardDeck {
    fn wait_for_card(&mut self, timeout_ms: u32) -> Result<(), CardError> {
        if let Some(next) = self.taps.pop_front() {
            self.current = (next - 1) as usize;
        }
        self.cards[self.current].wait_for_card(timeout_ms)
    }

    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        self.cards[self.current].exchange(apdu)
    }

    fn deselect(&mut self) {
        self.cards[self.current].deselect();
    }
}

struct NoPins;

impl SecretEntry for NoPins {
    fn request_pin(&mut self, _wallet: &str) -> Option<Zeroizing<String>> {
        None
    }

    fn request_passphrase(&mut self) -> Option<Zeroizing<String>> {
        Some(Zeroizing::new(String::new()))
    }
}

type Core = DeviceCore<MockFlash, CardDeck, AutoApprove, NoPins>;

/// Pairs four cards, restores a known wallet, and boots the core.
fn device_with_wallet() -> (Core, [u8; 32]) {
    let device_secret = [0x42u8; 32];
    let mut cards = Vec::new();
    let probe = MockCard::new(1, FAMILY, [0x61; 32]);
    let identity_pub = DeviceIdentity::new([1, 2, 3, 4], [0; 8], &device_secret, &probe.public_key())
        .unwrap()
        .public_key();
    for n in 1..=4u8 {
        let mut card = MockCard::new(n, FAMILY, [0x60 + n; 32]);
        card.provision_device_key(&identity_pub);
        cards.push(card);
    }

    let mut deck = CardDeck {
        cards,
        taps: VecDeque::new(),
        current: 0,
    };
    let mut store = Store::open(MockFlash::new()).unwrap();
    let mut rng = Drbg::seeded(&mut [&mut FixedEntropy(3)]);
    let mut consent = AutoApprove::default();

    for n in 1..=4u8 {
        let anchor = deck.cards[(n - 1) as usize].public_key();
        let identity = DeviceIdentity::new([1, 2, 3, 4], [0; 8], &device_secret, &anchor).unwrap();
        deck.script(&[n]);
        let mut env = VaultEnv {
            store: &mut store,
            transport: &mut deck,
            consent: &mut consent,
            rng: &mut rng,
        };
        pair_card(&mut env, &identity, n).unwrap();
    }

    deck.script(&[1, 2, 3, 4, 1, 2]);
    let wallet_id = {
        let mut env = VaultEnv {
            store: &mut store,
            transport: &mut deck,
            consent: &mut consent,
            rng: &mut rng,
        };
        restore_wallet(
            &mut env,
            &WalletParams {
                name: "main",
                pin: None,
                passphrase_on: false,
            },
            PHRASE,
        )
        .unwrap()
    };

    let core = DeviceCore::new(store, deck, consent, NoPins, rng);
    (core, wallet_id)
}

/// Sends one query and returns the decoded response.
fn exchange_query(core: &mut Core, sequence_no: u16, query: &Query) -> QueryResponse {
    let payload = query.encode_to_vec();
    let frames = chunk_command(PacketType::Cmd, sequence_no, 0, &payload);

    let mut response_payload = Vec::new();
    for frame in frames {
        for reply in core.on_host_frame(&frame, Interface::A) {
            let packet = decode(&reply).unwrap();
            if packet.header.packet_type == PacketType::Cmd {
                response_payload.extend_from_slice(&packet.payload);
            }
        }
    }
    QueryResponse::decode(response_payload.as_slice()).unwrap()
}

#[test]
fn get_device_info_over_the_wire() {
    let (mut core, _) = device_with_wallet();
    let query = Query {
        app: Some(query::App::Manager(x1_proto::ManagerQuery {
            request: Some(manager_query::Request::GetDeviceInfo(
                x1_proto::GetDeviceInfoRequest {},
            )),
        })),
    };
    let response = exchange_query(&mut core, 1, &query);
    let Some(query_response::App::Manager(manager)) = response.app else {
        panic!("expected manager response");
    };
    let Some(manager_response::Response::GetDeviceInfo(info)) = manager.response else {
        panic!("expected device info");
    };
    assert_eq!(info.paired_card_count, 4);
    assert_eq!(info.wallet_count, 1);
    assert_eq!(info.family_id, FAMILY.to_vec());
}

#[test]
fn get_xpubs_reconstructs_seed_from_cards() {
    let (mut core, wallet_id) = device_with_wallet();
    // seed reconstruction taps one card
    core.transport.script(&[1]);

    let query = Query {
        app: Some(query::App::BtcFamily(x1_proto::BtcQuery {
            request: Some(btc_query::Request::GetXpubs(GetXpubsRequest {
                wallet_id: wallet_id.to_vec(),
                derivation_paths: vec![DerivationPath {
                    components: vec![0x8000_0054, 0x8000_0000, 0x8000_0000],
                }],
            })),
        })),
    };
    let response = exchange_query(&mut core, 2, &query);
    let Some(query_response::App::BtcFamily(btc)) = response.app else {
        panic!("expected btc response");
    };
    let Some(btc_response::Response::GetXpubs(xpubs)) = btc.response else {
        panic!("expected xpubs");
    };

    // must equal direct derivation from the known BIP-39 seed
    let seed = x1_sdk::mnemonic::seed_from_phrase(PHRASE, "").unwrap();
    let expected = x1_app_bitcoin::address::derive_xpub(
        seed.as_ref(),
        &x1_common::path::Bip32Path::parse("m/84'/0'/0'").unwrap(),
    )
    .unwrap();
    assert_eq!(xpubs.xpubs, vec![expected]);
}

#[test]
fn evm_personal_sign_over_the_wire() {
    let (mut core, wallet_id) = device_with_wallet();
    core.transport.script(&[1]);

    let message = b"My email is john@doe.com - 1693898375561".to_vec();

    let initiate = Query {
        app: Some(query::App::EvmFamily(x1_proto::EvmQuery {
            request: Some(evm_query::Request::SignMsg(x1_proto::EvmSignMsgRequest {
                request: Some(evm_sign_msg_request::Request::Initiate(
                    x1_proto::EvmSignMsgInitiateRequest {
                        wallet_id: wallet_id.to_vec(),
                        derivation_path: Some(DerivationPath {
                            components: vec![0x8000_002C, 0x8000_003C, 0x8000_0000, 0, 0],
                        }),
                        message_type: x1_proto::EvmSignMsgType::PersonalSign as i32,
                        total_msg_size: message.len() as u32,
                    },
                )),
            })),
        })),
    };
    exchange_query(&mut core, 3, &initiate);

    let chunk = Query {
        app: Some(query::App::EvmFamily(x1_proto::EvmQuery {
            request: Some(evm_query::Request::SignMsg(x1_proto::EvmSignMsgRequest {
                request: Some(evm_sign_msg_request::Request::MsgData(
                    x1_proto::ChunkPayload {
                        chunk: message.clone(),
                        chunk_index: 0,
                        total_chunks: 1,
                        remaining_size: 0,
                    },
                )),
            })),
        })),
    };
    exchange_query(&mut core, 4, &chunk);

    let request_sig = Query {
        app: Some(query::App::EvmFamily(x1_proto::EvmQuery {
            request: Some(evm_query::Request::SignMsg(x1_proto::EvmSignMsgRequest {
                request: Some(evm_sign_msg_request::Request::SignatureRequest(
                    x1_proto::EvmSignMsgSignatureRequest {},
                )),
            })),
        })),
    };
    let response = exchange_query(&mut core, 5, &request_sig);
    let Some(query_response::App::EvmFamily(evm)) = response.app else {
        panic!("expected evm response");
    };
    let Some(evm_response::Response::SignMsg(msg)) = evm.response else {
        panic!("expected sign_msg response");
    };
    let Some(evm_sign_msg_response::Response::Signature(sig)) = msg.response else {
        panic!("expected signature");
    };

    // verify against the wallet's own key at m/44'/60'/0'/0/0
    let seed = x1_sdk::mnemonic::seed_from_phrase(PHRASE, "").unwrap();
    let node = x1_sdk::curve::HdNode::derive(
        seed.as_ref(),
        &x1_common::path::Bip32Path::parse("m/44'/60'/0'/0/0").unwrap(),
    )
    .unwrap();
    let digest = x1_app_evm::app::personal_sign_digest(&message);
    assert!(x1_sdk::curve::ecdsa_verify(
        &node.public_key(),
        &digest,
        &sig.r.as_slice().try_into().unwrap(),
        &sig.s.as_slice().try_into().unwrap(),
    )
    .unwrap());
    assert!(sig.v == 27 || sig.v == 28);
}

#[test]
fn unknown_wallet_yields_typed_error() {
    let (mut core, _) = device_with_wallet();
    let query = Query {
        app: Some(query::App::BtcFamily(x1_proto::BtcQuery {
            request: Some(btc_query::Request::GetXpubs(GetXpubsRequest {
                wallet_id: vec![0xEE; 32],
                derivation_paths: vec![DerivationPath {
                    components: vec![0x8000_0054, 0x8000_0000, 0x8000_0000],
                }],
            })),
        })),
    };
    let response = exchange_query(&mut core, 6, &query);
    let Some(query_response::App::CommonError(_)) = response.app else {
        panic!("expected a common error");
    };
}

#[test]
fn abort_mid_command_unpins_interface() {
    let (mut core, _) = device_with_wallet();

    // feed only the first chunk of a large command
    let payload = vec![0x55u8; 200];
    let frames = chunk_command(PacketType::Cmd, 9, 0, &payload);
    core.on_host_frame(&frames[0], Interface::A);
    assert_eq!(core.host.active_interface(), Some(Interface::A));

    // abort from the other interface
    let abort = chunk_command(PacketType::Abort, 9, 0, &[]);
    core.on_host_frame(&abort[0], Interface::B);
    assert_eq!(core.host.active_interface(), None);

    // a fresh command on interface B is now accepted
    let query = Query {
        app: Some(query::App::Manager(x1_proto::ManagerQuery {
            request: Some(manager_query::Request::GetDeviceInfo(
                x1_proto::GetDeviceInfoRequest {},
            )),
        })),
    };
    let payload = query.encode_to_vec();
    let frames = chunk_command(PacketType::Cmd, 10, 0, &payload);
    let mut got_response = false;
    for frame in frames {
        for reply in core.on_host_frame(&frame, Interface::B) {
            let packet = decode(&reply).unwrap();
            if packet.header.packet_type == PacketType::Cmd {
                got_response = true;
            }
        }
    }
    assert!(got_response);
}
