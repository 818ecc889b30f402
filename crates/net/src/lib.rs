//! Huddle Network Library
//!
//! TCP relay for LAN chat and file sharing.
//!
//! # Architecture
//!
//! - **Server**: accepts connections, one task per session
//! - **SessionHandler**: nickname handshake, dispatch loop, teardown
//! - **Broadcaster**: fans a payload out to every other session
//! - **FileRelay**: receives a file body and forwards it without interleaving
//! - **SessionRegistry**: the one shared table of connected sessions
//! - **Client**: headless counterpart for tests and tools
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(&config, Arc::new(ChatLog::disabled())).await?;
//!
//! let mut alice = Client::connect(server.addr(), "alice").await?;
//! alice.send_chat("hi").await?;
//!
//! while let Some(event) = bob.next_event().await? {
//!     match event {
//!         ClientEvent::Text(line) => { /* "[12:00:00] alice: hi" */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod error;
pub mod file_relay;
pub mod frame;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use broadcast::Broadcaster;
pub use client::{Client, ClientEvent};
pub use error::{Error, Result};
pub use file_relay::FileRelay;
pub use frame::{classify, FrameReader};
pub use protocol::{FileHeader, Frame, Payload, NICK};
pub use registry::{Outbound, Session, SessionId, SessionRegistry};
pub use server::Server;
pub use session::{Relay, SessionHandler};
