//! IRC Line Parser
//!
//! Splits one protocol line into source, command and arguments.
//!
//! ## Line Format
//!
//! ```text
//! [:source ]COMMAND arg1 arg2 ... [:trailing argument with spaces]
//!
//! :irc.example.org 352 Test #rezo distrirc host server Test H :0 Remi Rampin
//!  └──── source ──┘ └┬┘ └──────────── middle arguments ─────────┘ └─┬──────┘
//!                   kind                                         trailing
//! ```
//!
//! ## Server Quirks
//!
//! Real servers do not always follow the grammar. Two deviations are
//! tolerated, and both are expressed as data in a [`ParsePolicy`]:
//!
//! 1. **Ignored marker**: some replies put a `:` in front of a token that is
//!    *not* the trailing argument (names in a NAMES reply, channels in a
//!    WHOIS reply, ISON results, the hop count of a WHO reply). For those
//!    kinds the `:` is dropped and splitting continues.
//! 2. **Forced trailing**: the realname of a WHO reply follows the hop count
//!    without a marker of its own. Once that position is reached, the rest
//!    of the line is taken as the last argument.

use super::command::Command;
use super::kind::CommandKind;
use std::borrow::Cow;
use thiserror::Error;

/// Marks the source and the trailing argument.
const MARKER: char = ':';

/// Reasons a line cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidLine {
    /// Nothing but whitespace.
    #[error("line is empty")]
    Empty,

    /// A source prefix not followed by a space.
    #[error("no command after source")]
    MissingCommand,
}

/// Convenience alias for parse results.
pub type ParseResult<T> = Result<T, InvalidLine>;

/// Per-kind exceptions to the standard argument grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePolicy {
    ignore_marker: Cow<'static, [CommandKind]>,
    forced_trailing: Cow<'static, [(CommandKind, usize)]>,
}

impl ParsePolicy {
    /// The quirks seen on deployed servers.
    pub const OBSERVED: ParsePolicy = ParsePolicy {
        ignore_marker: Cow::Borrowed(&[
            CommandKind::WhoisChannels,
            CommandKind::WhoReply,
            CommandKind::NamesAre,
            CommandKind::Ison,
        ]),
        forced_trailing: Cow::Borrowed(&[(CommandKind::WhoReply, 8)]),
    };

    /// The plain grammar, with no exceptions.
    pub const STRICT: ParsePolicy = ParsePolicy {
        ignore_marker: Cow::Borrowed(&[]),
        forced_trailing: Cow::Borrowed(&[]),
    };

    pub fn strict() -> Self {
        Self::STRICT
    }

    /// Adds a kind whose `:` markers do not start the trailing argument.
    pub fn ignoring_marker(mut self, kind: CommandKind) -> Self {
        if !self.ignore_marker.contains(&kind) {
            self.ignore_marker.to_mut().push(kind);
        }
        self
    }

    /// Makes the argument at `position` of `kind` swallow the rest of the
    /// line, marker or not.
    pub fn forcing_trailing(mut self, kind: CommandKind, position: usize) -> Self {
        if !self.forces_trailing(kind, position) {
            self.forced_trailing.to_mut().push((kind, position));
        }
        self
    }

    pub fn ignores_marker(&self, kind: CommandKind) -> bool {
        self.ignore_marker.contains(&kind)
    }

    pub fn forces_trailing(&self, kind: CommandKind, position: usize) -> bool {
        self.forced_trailing.contains(&(kind, position))
    }
}

impl Default for ParsePolicy {
    fn default() -> Self {
        Self::OBSERVED
    }
}

/// Parses lines into [`Command`]s under a given policy.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    policy: ParsePolicy,
}

impl CommandParser {
    /// Creates a parser with the observed server quirks.
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_policy(policy: ParsePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ParsePolicy {
        &self.policy
    }

    /// Parses one line. A trailing CR/LF, if present, is ignored.
    pub fn parse(&self, line: &str) -> ParseResult<Command> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim_start_matches(' ').is_empty() {
            return Err(InvalidLine::Empty);
        }

        // Source
        let (source, rest) = match line.strip_prefix(MARKER) {
            Some(prefixed) => {
                let space = prefixed.find(' ').ok_or(InvalidLine::MissingCommand)?;
                (&prefixed[..space], &prefixed[space + 1..])
            }
            None => ("", line),
        };

        // Command. A source followed by nothing but spaces leaves an empty,
        // unrecognized verb.
        let rest = rest.trim_start_matches(' ');
        let end = rest.find(' ').unwrap_or(rest.len());
        let verb = &rest[..end];
        let kind = CommandKind::from_token(verb);

        // Arguments
        let mut args = Vec::new();
        let mut rest = &rest[end..];
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            let (marked, body) = match rest.strip_prefix(MARKER) {
                Some(body) => (true, body),
                None => (false, rest),
            };
            let forced = self.policy.forces_trailing(kind, args.len());
            if forced || (marked && !self.policy.ignores_marker(kind)) {
                args.push(body.to_string());
                break;
            }
            let end = body.find(' ').unwrap_or(body.len());
            args.push(body[..end].to_string());
            rest = &body[end..];
        }

        Ok(Command::from_parts(kind, verb.to_string(), source.to_string(), args))
    }

    /// Parses raw bytes, replacing invalid UTF-8 sequences.
    pub fn parse_bytes(&self, line: &[u8]) -> ParseResult<Command> {
        self.parse(&String::from_utf8_lossy(line))
    }
}
