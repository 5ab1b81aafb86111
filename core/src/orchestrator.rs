//! Query dispatch.
//!
//! One command in flight at a time: the host session pins the interface,
//! the orchestrator routes the decoded query to the owning app, and the
//! command ends with exactly one result or one typed error. Seeds are
//! reconstructed on demand (device share plus one card share), held in
//! zeroizing buffers for the duration of the flow, and dropped on every
//! exit path including abort.

use log::{debug, warn};
use prost::Message;
use x1_app_bitcoin::{BitcoinApp, SignFlow, BITCOIN};
use x1_app_evm::{EvmApp, SignMsgFlow, SignTxnFlow, ETHEREUM};
use x1_app_manager::AuthCardFlow;
use x1_card::transport::Transport;
use x1_common::types::WalletId;
use x1_common::Error;
use x1_host::{HostEvent, HostSession, Interface};
use x1_proto::{
    auth_card_request, auth_card_response, btc_query, btc_response, evm_query, evm_response,
    evm_sign_msg_request, evm_sign_txn_request, manager_query, manager_response, query,
    query_response, sign_txn_request, AuthCardResponse, BtcResponse, CommonError, EvmResponse,
    ManagerResponse, Query, QueryResponse, SignTxnResponse,
};
use x1_sdk::rand::Drbg;
use x1_sdk::ux::UserConsent;
use x1_store::{FlashMedium, Store};
use x1_vault::lifecycle::{self, VaultEnv};
use zeroize::Zeroizing;

use crate::events::Event;

/// On-device secret entry (PIN pad, passphrase keyboard); out of scope of
/// this repository beyond the interface.
pub trait SecretEntry {
    /// `None` means the user backed out.
    fn request_pin(&mut self, wallet_name: &str) -> Option<Zeroizing<String>>;
    fn request_passphrase(&mut self) -> Option<Zeroizing<String>>;
}

/// A no-PIN environment (wallets without PINs, tests).
pub struct NoSecrets;

impl SecretEntry for NoSecrets {
    fn request_pin(&mut self, _wallet_name: &str) -> Option<Zeroizing<String>> {
        None
    }

    fn request_passphrase(&mut self) -> Option<Zeroizing<String>> {
        Some(Zeroizing::new(String::new()))
    }
}

/// The flow currently spanning multiple host queries.
enum ActiveFlow {
    BtcSign {
        flow: SignFlow,
        seed: Zeroizing<[u8; 64]>,
    },
    EvmTxn {
        flow: SignTxnFlow,
        seed: Zeroizing<[u8; 64]>,
    },
    EvmMsg {
        flow: SignMsgFlow,
        seed: Zeroizing<[u8; 64]>,
    },
    AuthCard(AuthCardFlow),
}

/// The device core: store, transports, apps and the in-flight session.
pub struct DeviceCore<M: FlashMedium, T: Transport, C: UserConsent, S: SecretEntry> {
    pub store: Store<M>,
    pub transport: T,
    pub consent: C,
    pub secrets: S,
    pub rng: Drbg,
    pub host: HostSession,
    btc: BitcoinApp,
    evm: EvmApp,
    active: Option<ActiveFlow>,
}

impl<M: FlashMedium, T: Transport, C: UserConsent, S: SecretEntry> DeviceCore<M, T, C, S> {
    pub fn new(store: Store<M>, transport: T, consent: C, secrets: S, rng: Drbg) -> Self {
        DeviceCore {
            store,
            transport,
            consent,
            secrets,
            rng,
            host: HostSession::new(),
            btc: BitcoinApp::new(BITCOIN),
            evm: EvmApp::new(ETHEREUM),
            active: None,
        }
    }

    /// Main-loop entry: feeds one event in, returns frames to transmit.
    pub fn handle_event(&mut self, event: Event) -> Vec<Vec<u8>> {
        match event {
            Event::HostFrame { interface, bytes } => self.on_host_frame(&bytes, interface),
            // Card and button events are consumed inside the running flow
            // via the transport/consent interfaces; ticks feed timeouts.
            _ => Vec::new(),
        }
    }

    /// Feeds one raw host frame; returns every frame to send back.
    pub fn on_host_frame(&mut self, bytes: &[u8], interface: Interface) -> Vec<Vec<u8>> {
        let output = self.host.handle_frame(bytes, interface);
        let mut frames = output.replies;

        match output.event {
            Some(HostEvent::CommandReady { payload, .. }) => {
                self.host.mark_executing();
                match self.dispatch_payload(&payload) {
                    Ok(response) => {
                        frames.extend(self.host.send_response(&response.encode_to_vec()));
                    }
                    Err((kind, sub_kind)) => {
                        warn!("command failed: {}", kind);
                        self.cleanup_flow();
                        let response = error_response(kind, sub_kind);
                        frames.extend(self.host.send_failure(&response.encode_to_vec()));
                    }
                }
            }
            Some(HostEvent::Aborted) => {
                debug!("host abort; running flow cleanup");
                self.cleanup_flow();
            }
            None => {}
        }
        frames
    }

    /// Drops the in-flight flow, zeroes its transient secrets and restores
    /// the store's last committed state.
    fn cleanup_flow(&mut self) {
        self.active = None; // seeds zeroize on drop
        self.store.revert();
    }

    fn dispatch_payload(&mut self, payload: &[u8]) -> Result<QueryResponse, (Error, u32)> {
        let query = Query::decode(payload).map_err(|_| (Error::InvalidData, 0))?;
        match query.app {
            Some(query::App::Manager(q)) => self.dispatch_manager(q),
            Some(query::App::BtcFamily(q)) => self.dispatch_btc(q),
            Some(query::App::EvmFamily(q)) => self.dispatch_evm(q),
            None => Err((Error::AppNotSupported, 0)),
        }
    }

    // ---- manager --------------------------------------------------------

    fn dispatch_manager(
        &mut self,
        q: x1_proto::ManagerQuery,
    ) -> Result<QueryResponse, (Error, u32)> {
        match q.request {
            Some(manager_query::Request::GetDeviceInfo(_)) => {
                let info = x1_app_manager::get_device_info(&self.store);
                Ok(manager_response_of(
                    manager_response::Response::GetDeviceInfo(info),
                ))
            }
            Some(manager_query::Request::AuthCard(req)) => match &req.request {
                Some(auth_card_request::Request::Initiate(_)) => {
                    let flow = AuthCardFlow::initiate(&req).map_err(|e| (e, 0))?;
                    self.active = Some(ActiveFlow::AuthCard(flow));
                    Ok(manager_response_of(manager_response::Response::AuthCard(
                        AuthCardResponse {
                            response: Some(auth_card_response::Response::Accepted(true)),
                        },
                    )))
                }
                Some(auth_card_request::Request::Challenge(challenge)) => {
                    let Some(ActiveFlow::AuthCard(flow)) = self.active.take() else {
                        return Err((Error::InvalidRequest, 0));
                    };
                    let response = flow
                        .challenge(
                            &self.store,
                            &mut self.transport,
                            &mut self.rng,
                            &mut self.consent,
                            &challenge.challenge,
                        )
                        .map_err(|e| (e, 0))?;
                    Ok(manager_response_of(manager_response::Response::AuthCard(
                        response,
                    )))
                }
                None => Err((Error::InvalidRequest, 0)),
            },
            None => Err((Error::InvalidRequest, 0)),
        }
    }

    // ---- bitcoin family -------------------------------------------------

    fn dispatch_btc(&mut self, q: x1_proto::BtcQuery) -> Result<QueryResponse, (Error, u32)> {
        match q.request {
            Some(btc_query::Request::GetXpubs(req)) => {
                let seed = self.reconstruct_seed(&req.wallet_id)?;
                let response = self
                    .btc
                    .get_xpubs(seed.as_ref(), &req)
                    .map_err(btc_err)?;
                Ok(btc_response_of(btc_response::Response::GetXpubs(response)))
            }
            Some(btc_query::Request::GetPublicKey(req)) => {
                let seed = self.reconstruct_seed(&req.wallet_id)?;
                let response = self
                    .btc
                    .get_public_key(seed.as_ref(), &mut self.consent, &req)
                    .map_err(btc_err)?;
                Ok(btc_response_of(btc_response::Response::GetPublicKey(
                    response,
                )))
            }
            Some(btc_query::Request::SignTxn(req)) => match req.request {
                Some(sign_txn_request::Request::Initiate(init)) => {
                    let seed = self.reconstruct_seed(&init.wallet_id)?;
                    let flow = SignFlow::initiate(self.btc.params, &init).map_err(btc_err)?;
                    self.active = Some(ActiveFlow::BtcSign { flow, seed });
                    Ok(btc_response_of(btc_response::Response::SignTxn(
                        SignTxnResponse {
                            response: Some(x1_proto::sign_txn_response::Response::Accepted(true)),
                        },
                    )))
                }
                Some(step) => {
                    let Some(ActiveFlow::BtcSign { mut flow, seed }) = self.active.take() else {
                        return Err((Error::InvalidRequest, 0));
                    };
                    let response = flow
                        .step(&step, seed.as_ref(), &mut self.consent)
                        .map_err(btc_err)?;
                    if !flow.is_done() {
                        self.active = Some(ActiveFlow::BtcSign { flow, seed });
                    }
                    Ok(btc_response_of(btc_response::Response::SignTxn(response)))
                }
                None => Err((Error::InvalidRequest, 0)),
            },
            None => Err((Error::InvalidRequest, 0)),
        }
    }

    // ---- evm family -----------------------------------------------------

    fn dispatch_evm(&mut self, q: x1_proto::EvmQuery) -> Result<QueryResponse, (Error, u32)> {
        match q.request {
            Some(evm_query::Request::SignTxn(req)) => match req.request {
                Some(evm_sign_txn_request::Request::Initiate(init)) => {
                    let seed = self.reconstruct_seed(&init.wallet_id)?;
                    let flow = self.evm.sign_txn(&init).map_err(evm_err)?;
                    self.active = Some(ActiveFlow::EvmTxn { flow, seed });
                    Ok(evm_response_of(evm_response::Response::SignTxn(
                        x1_proto::EvmSignTxnResponse {
                            response: Some(
                                x1_proto::evm_sign_txn_response::Response::Accepted(true),
                            ),
                        },
                    )))
                }
                Some(evm_sign_txn_request::Request::TxnData(chunk)) => {
                    let Some(ActiveFlow::EvmTxn { mut flow, seed }) = self.active.take() else {
                        return Err((Error::InvalidRequest, 0));
                    };
                    let response = flow
                        .step_chunk(&chunk, seed.as_ref(), &mut self.consent)
                        .map_err(evm_err)?;
                    if !flow.is_done() {
                        self.active = Some(ActiveFlow::EvmTxn { flow, seed });
                    }
                    Ok(evm_response_of(evm_response::Response::SignTxn(response)))
                }
                None => Err((Error::InvalidRequest, 0)),
            },
            Some(evm_query::Request::SignMsg(req)) => match req.request {
                Some(evm_sign_msg_request::Request::Initiate(init)) => {
                    let seed = self.reconstruct_seed(&init.wallet_id)?;
                    let flow = self.evm.sign_msg(&init).map_err(evm_err)?;
                    self.active = Some(ActiveFlow::EvmMsg { flow, seed });
                    Ok(evm_response_of(evm_response::Response::SignMsg(
                        x1_proto::EvmSignMsgResponse {
                            response: Some(
                                x1_proto::evm_sign_msg_response::Response::Accepted(true),
                            ),
                        },
                    )))
                }
                Some(step) => {
                    let Some(ActiveFlow::EvmMsg { mut flow, seed }) = self.active.take() else {
                        return Err((Error::InvalidRequest, 0));
                    };
                    let response = flow
                        .step(&step, seed.as_ref(), &mut self.consent)
                        .map_err(evm_err)?;
                    if !flow.is_done() {
                        self.active = Some(ActiveFlow::EvmMsg { flow, seed });
                    }
                    Ok(evm_response_of(evm_response::Response::SignMsg(response)))
                }
                None => Err((Error::InvalidRequest, 0)),
            },
            None => Err((Error::InvalidRequest, 0)),
        }
    }

    /// Seed reconstruction for a signing flow: device share plus one card
    /// share, PIN-unwrapped when the wallet demands it.
    fn reconstruct_seed(&mut self, wallet_id: &[u8]) -> Result<Zeroizing<[u8; 64]>, (Error, u32)> {
        let wallet_id: WalletId = wallet_id
            .try_into()
            .map_err(|_| (Error::InvalidData, 0))?;
        let meta = self
            .store
            .wallet(&wallet_id)
            .ok_or((Error::WalletNotFound, 0))?;

        let pin = if meta.flags.pin_set {
            Some(
                self.secrets
                    .request_pin(&meta.name)
                    .ok_or((Error::UserRejection, 0))?,
            )
        } else {
            None
        };
        let passphrase = if meta.flags.passphrase_on {
            self.secrets
                .request_passphrase()
                .ok_or((Error::UserRejection, 0))?
        } else {
            Zeroizing::new(String::new())
        };

        let mut env = VaultEnv {
            store: &mut self.store,
            transport: &mut self.transport,
            consent: &mut self.consent,
            rng: &mut self.rng,
        };
        lifecycle::reconstruct_seed(
            &mut env,
            &wallet_id,
            pin.as_ref().map(|p| p.as_str()),
            &passphrase,
        )
        .map_err(|e| (e, 0))
    }
}

fn btc_err(e: x1_app_bitcoin::BtcError) -> (Error, u32) {
    (e.into(), e.sub_kind())
}

fn evm_err(e: x1_app_evm::EvmError) -> (Error, u32) {
    (e.into(), e.sub_kind())
}

fn manager_response_of(response: manager_response::Response) -> QueryResponse {
    QueryResponse {
        app: Some(query_response::App::Manager(ManagerResponse {
            response: Some(response),
        })),
    }
}

fn btc_response_of(response: btc_response::Response) -> QueryResponse {
    QueryResponse {
        app: Some(query_response::App::BtcFamily(BtcResponse {
            response: Some(response),
        })),
    }
}

fn evm_response_of(response: evm_response::Response) -> QueryResponse {
    QueryResponse {
        app: Some(query_response::App::EvmFamily(EvmResponse {
            response: Some(response),
        })),
    }
}

fn error_response(kind: Error, sub_kind: u32) -> QueryResponse {
    use x1_common::error::ResponseErrorKind;
    let wire_kind = match kind.response_kind() {
        ResponseErrorKind::InvalidRequest => x1_proto::ErrorKind::InvalidRequest,
        ResponseErrorKind::InvalidData => x1_proto::ErrorKind::InvalidData,
        ResponseErrorKind::UserRejection => x1_proto::ErrorKind::UserRejection,
        ResponseErrorKind::DeviceCorrupt => x1_proto::ErrorKind::DeviceCorrupt,
        ResponseErrorKind::AppNotSupported => x1_proto::ErrorKind::AppNotSupported,
        ResponseErrorKind::UnknownError => x1_proto::ErrorKind::UnknownError,
    };
    QueryResponse {
        app: Some(query_response::App::CommonError(CommonError {
            kind: wire_kind as i32,
            sub_kind,
        })),
    }
}
