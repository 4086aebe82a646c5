//! IRC Protocol Implementation
//!
//! Turns raw protocol lines into structured [`Command`]s and back.
//!
//! ## Modules
//!
//! - `kind`: the [`CommandKind`] keyword and numeric-code table
//! - `command`: [`Command`], [`CommandBuilder`] and wire rendering
//! - `parser`: [`CommandParser`] with its per-kind [`ParsePolicy`]
//! - `usermask`: `nick!user@host` decomposition
//! - `relay`: hop chains and targets of the relay vocabulary
//!
//! ## Example
//!
//! ```
//! use distrirc::protocol::{Command, CommandKind};
//!
//! let line = ":Remram!distrirc@remram44.github.com PRIVMSG #rezo :hi all";
//! let command = Command::parse(line).unwrap();
//! assert_eq!(command.kind(), CommandKind::Privmsg);
//! assert_eq!(command.usermask().nick, "Remram");
//! assert_eq!(command.render(), line);
//! ```

pub mod command;
pub mod kind;
pub mod parser;
pub mod relay;
pub mod usermask;

// Re-export commonly used types for convenience
pub use command::{Command, CommandBuilder};
pub use kind::CommandKind;
pub use parser::{CommandParser, InvalidLine, ParsePolicy, ParseResult};
pub use relay::{LogBuffer, PrefixChain, RelayTarget};
pub use usermask::Usermask;
