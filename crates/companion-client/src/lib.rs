//! # companion-client
//!
//! Client for Apple's Companion protocol: the frame transport, the
//! request/response multiplexer, and the user-facing session API.
//!
//! Operations cover system info, service sessions, HID buttons and touch,
//! media control, app launching, and event subscriptions.
//!
//! Typical flow:
//!
//! ```no_run
//! use companion_client::{CompanionSession, HidButton};
//! use companion_core::Credentials;
//!
//! # async fn demo(addr: std::net::SocketAddr, stored: String) -> companion_core::Result<()> {
//! let session = CompanionSession::connect(addr).await?;
//! let credentials = Credentials::from_json(&stored)?;
//! session.verify(&credentials).await?;
//! session.system_info().await?;
//! session.session_start().await?;
//! session.press_button(HidButton::Select).await?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod connection;
pub mod events;
pub mod mux;
pub mod session;

pub use commands::{ButtonState, HidButton, MediaControlCommand};
pub use connection::{Connection, MessageType, DEFAULT_REQUEST_TIMEOUT};
pub use events::{CompanionEvent, EventReceiver};
pub use session::{App, ClientInfo, CompanionSession};
