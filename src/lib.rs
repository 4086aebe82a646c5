//! # DistrIRC - Protocol Core of an IRC Client/Relay
//!
//! DistrIRC can sit on either side of a multi-hop IRC connection: as a
//! client talking to a server, or as a relay ("bouncer") that other DistrIRC
//! instances connect to. This crate holds the part both sides share.
//!
//! ## Features
//!
//! - **One Thread, Many Sockets**: a readiness multiplexer built on `mio`
//! - **Plaintext or TLS**: one stream interface over TCP and `rustls`
//! - **Binary-Safe Lines**: chunked bytes reassembled into lines with bounded reads
//! - **Real-World Parsing**: numeric tables, colon quirks and usermasks
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               DistrIRC                               │
//! │                                                                      │
//! │   ┌──────────────┐   ready    ┌──────────────────┐   lines           │
//! │   │  SocketSet   │──────────> │  LineConnection  │──────────┐        │
//! │   │  (mux)       │            │  (connection)    │          │        │
//! │   └──────┬───────┘            └────────┬─────────┘          ▼        │
//! │          │ register_sources            │ receive   ┌──────────────┐  │
//! │          │                             ▼           │CommandParser │  │
//! │          │                  ┌──────────────────┐   │ (protocol)   │  │
//! │          └────────────────> │ NetStream (net)  │   └──────┬───────┘  │
//! │                             │  TcpSocket       │          │          │
//! │                             │  TlsStream       │ <── send_command ───┘
//! │                             └──────────────────┘                     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use distrirc::connection::LineConnection;
//! use distrirc::mux::{SocketSet, Waitable};
//! use distrirc::net::{NetStream, TcpSocket};
//! use distrirc::protocol::{Command, CommandKind};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream: Box<dyn NetStream> = Box::new(TcpSocket::connect("irc.example.org", 6667)?);
//!     let conn = Rc::new(RefCell::new(LineConnection::new(stream)));
//!     conn.borrow_mut()
//!         .send_command(&Command::new(CommandKind::Nick, ["Remram"]))?;
//!
//!     let mut set = SocketSet::new()?;
//!     let member: Rc<dyn Waitable> = conn.clone();
//!     set.add(&member);
//!
//!     while set.wait(None)?.is_some() {
//!         for line in conn.borrow_mut().read_lines(false)? {
//!             if let Ok(command) = Command::parse_bytes(&line) {
//!                 println!("{command}");
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`net`]: plaintext and TLS streams and listeners
//! - [`mux`]: the readiness multiplexer
//! - [`connection`]: line-buffered connections
//! - [`protocol`]: IRC command parsing and rendering
//!
//! ## Design Highlights
//!
//! ### Level-Triggered Waiting
//!
//! Every [`mux::SocketSet::wait`] registers its members afresh, so a socket
//! that still has unread data is reported again on the next call. The set
//! holds weak references only: dropping a connection removes it.
//!
//! ### Quirks as Data
//!
//! Servers disagree with the grammar in a few known places. Those exceptions
//! live in a [`protocol::ParsePolicy`] value rather than in parser branches.

pub mod connection;
pub mod mux;
pub mod net;
pub mod protocol;

// Re-export commonly used types for convenience
pub use connection::{LineConfig, LineConnection};
pub use mux::{SocketSet, Waitable};
pub use net::{NetStream, SocketError, SocketResult, TlsConfig, TlsRuntime};
pub use protocol::{Command, CommandBuilder, CommandKind, CommandParser, Usermask};

/// Program name, as shown to users and peers
pub const PROGRAM_NAME: &str = "DistrIRC";

/// Short name, used as the IRC username
pub const SHORT_NAME: &str = "distrirc";

/// Version of DistrIRC
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The usual plaintext IRC port
pub const DEFAULT_PORT: u16 = 6667;
