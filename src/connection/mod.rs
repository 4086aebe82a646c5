//! Line-buffered Connection Module
//!
//! Turns the chunked byte stream of a [`NetStream`](crate::net::NetStream)
//! into complete protocol lines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SocketSet::wait()                        │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ ready
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   LineConnection                            │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ receive()   │───>│ BytesMut    │───>│ split on \n │      │
//! │  │ ≤128 bytes  │    │ accumulate  │    │ strip \r    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! └───────────────────────────────────────────────┼─────────────┘
//!                                                 │ Vec<Bytes>
//!                                                 ▼
//!                                       Command::parse_bytes()
//! ```
//!
//! ## Features
//!
//! - **Bounded reads**: one fixed-size receive per call, never an unbounded read
//! - **Incremental scan**: bytes already searched for `\n` are not searched again
//! - **Binary-safe**: NUL and control bytes pass through untouched
//! - **Transport-agnostic**: works over any stream, plaintext or TLS

pub mod line;

pub use line::{LineConfig, LineConnection, LineStats, DEFAULT_CHUNK_SIZE};
