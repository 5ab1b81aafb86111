//! Card-session protocol: APDU assembly, pairing, session keys, encrypted
//! transport and per-card health tracking.
//!
//! A session follows the applet's state machine strictly:
//!
//! ```text
//!   IDLE ── detect ──► CONNECTED ── select_applet ──► SELECTED
//!     ▲                                                  │
//!     │                                     pair? ───────┤
//!     │                                                  ▼
//!     │                                              PAIRED
//!     │                                                  │
//!     └────── deselect ◄──── EXCHANGE ◄──── SESSION_OPEN
//! ```
//!
//! One card operation holds the NFC transport exclusively; there is no
//! pipelining. Any MAC failure on the encrypted channel drops the session
//! back to IDLE.

pub mod apdu;
pub mod error;
pub mod health;
pub mod ops;
pub mod pairing;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{CardError, RETRY_ATTEMPTS};
pub use session::{CardSession, SessionState};
pub use transport::Transport;
