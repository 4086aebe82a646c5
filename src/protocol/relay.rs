//! Relay notation
//!
//! The relay commands address a connection several hops away with a chain
//! of hop identifiers. The leftmost identifier is the next hop; each relay
//! strips it and forwards the rest.
//!
//! ```text
//! DQUOTE home~freenode :PRIVMSG #rezo :hi
//!        └──┘ └──────┘
//!        hop1   hop2
//!
//! #home~freenode~rezo         channel "rezo" two hops away
//! home~freenode~~server       server buffer of "freenode" (DSHOWLOG only)
//! we~~ird                     single identifier "we~ird"
//! ```
//!
//! Only tokenizing lives here. Forwarding is up to whoever owns the
//! connections.

use std::fmt;

const SEPARATOR: char = '~';
const CHANNEL: char = '#';

/// Splits on `~`, turning `~~` into a literal `~`.
fn split_escaped(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != SEPARATOR {
            current.push(c);
        } else if chars.peek() == Some(&SEPARATOR) {
            chars.next();
            current.push(SEPARATOR);
        } else {
            parts.push(std::mem::take(&mut current));
        }
    }
    parts.push(current);
    parts
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == SEPARATOR {
            out.push(SEPARATOR);
        }
        out.push(c);
    }
}

/// An ordered list of hop identifiers, next hop first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PrefixChain {
    hops: Vec<String>,
}

impl PrefixChain {
    /// Parses `hop1~hop2~...`. An empty string is an empty chain.
    ///
    /// ```
    /// use distrirc::protocol::PrefixChain;
    ///
    /// let chain = PrefixChain::parse("home~free~~node");
    /// assert_eq!(chain.hops(), ["home", "free~node"]);
    /// assert_eq!(chain.render(), "home~free~~node");
    /// ```
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        Self {
            hops: split_escaped(text),
        }
    }

    pub fn from_hops<I, H>(hops: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        Self {
            hops: hops.into_iter().map(Into::into).collect(),
        }
    }

    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    /// The hop that receives the command next.
    pub fn first(&self) -> Option<&str> {
        self.hops.first().map(String::as_str)
    }

    /// The chain left once the first hop is stripped.
    pub fn rest(&self) -> PrefixChain {
        Self {
            hops: self.hops.iter().skip(1).cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        for (index, hop) in self.hops.iter().enumerate() {
            if index > 0 {
                out.push(SEPARATOR);
            }
            push_escaped(out, hop);
        }
    }
}

impl fmt::Display for PrefixChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// The log buffers a `DSHOWLOG` can name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogBuffer {
    /// Server messages outside any channel or query.
    Server,
    /// Private messages and highlights.
    AwayLog,
    /// The relay's own system log.
    SystemLog,
    /// A channel or query buffer.
    Named(String),
}

const SPECIAL_BUFFERS: &[(&str, LogBuffer)] = &[
    ("~server", LogBuffer::Server),
    ("~awaylog", LogBuffer::AwayLog),
    ("~systemlog", LogBuffer::SystemLog),
];

impl LogBuffer {
    fn special(name: &str) -> Option<LogBuffer> {
        SPECIAL_BUFFERS
            .iter()
            .find(|(keyword, _)| *keyword == name)
            .map(|(_, buffer)| buffer.clone())
    }
}

/// A nickname, channel or log buffer on a possibly remote connection.
///
/// Written `[#][chain~]name`: a leading `#` marks a channel, the last
/// identifier is the name, and everything before it is the hop chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RelayTarget {
    pub channel: bool,
    pub chain: PrefixChain,
    pub name: String,
}

impl RelayTarget {
    /// Parses a nickname or channel reference.
    ///
    /// ```
    /// use distrirc::protocol::RelayTarget;
    ///
    /// let target = RelayTarget::parse("#home~freenode~rezo");
    /// assert!(target.channel);
    /// assert_eq!(target.chain.hops(), ["home", "freenode"]);
    /// assert_eq!(target.name, "rezo");
    /// ```
    pub fn parse(text: &str) -> Self {
        let (channel, text) = match text.strip_prefix(CHANNEL) {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let mut parts = split_escaped(text);
        let name = parts.pop().unwrap_or_default();
        Self {
            channel,
            chain: PrefixChain { hops: parts },
            name,
        }
    }

    /// Parses a `DSHOWLOG` buffer reference.
    ///
    /// A trailing `~server`, `~awaylog` or `~systemlog` names a special
    /// buffer even when it follows a separator, so `home~~server` is the
    /// server buffer of `home` rather than a nickname `home~server`.
    pub fn parse_log(text: &str) -> Self {
        let (channel, body) = match text.strip_prefix(CHANNEL) {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        for (keyword, _) in SPECIAL_BUFFERS {
            if body == *keyword {
                return Self {
                    channel,
                    chain: PrefixChain::default(),
                    name: keyword.to_string(),
                };
            }
            let Some(head) = body.strip_suffix(keyword) else {
                continue;
            };
            if let Some(chain) = head.strip_suffix(SEPARATOR) {
                return Self {
                    channel,
                    chain: PrefixChain::parse(chain),
                    name: keyword.to_string(),
                };
            }
        }
        Self::parse(text)
    }

    /// The buffer this target names, when used with `DSHOWLOG`.
    pub fn log_buffer(&self) -> LogBuffer {
        LogBuffer::special(&self.name).unwrap_or_else(|| LogBuffer::Named(self.name.clone()))
    }

    /// Writes the target back in the form [`parse`](Self::parse) reads.
    pub fn render(&self) -> String {
        self.render_with(false)
    }

    /// Writes the target back in the form [`parse_log`](Self::parse_log)
    /// reads: special buffer names stay unescaped.
    pub fn render_log(&self) -> String {
        self.render_with(true)
    }

    fn render_with(&self, log: bool) -> String {
        let mut out = String::new();
        if self.channel {
            out.push(CHANNEL);
        }
        self.chain.render_into(&mut out);
        if !self.chain.is_empty() {
            out.push(SEPARATOR);
        }
        if log && LogBuffer::special(&self.name).is_some() {
            out.push_str(&self.name);
        } else {
            push_escaped(&mut out, &self.name);
        }
        out
    }
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
