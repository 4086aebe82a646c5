//! Usermask decoding.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// The parts of a `nick!user@host` source.
///
/// Server sources carry only a host; a `user@host` mask has no nick.
/// Missing parts are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Usermask {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl Usermask {
    /// Splits a mask, tolerating `@` inside the nickname.
    ///
    /// The rightmost `@` separates the host; the nearest `!` before it
    /// separates nick from user. A leading `:` is ignored.
    ///
    /// ```
    /// use distrirc::protocol::Usermask;
    ///
    /// let mask = Usermask::parse("Remr@m[away]!distrirc@remram44.github.com");
    /// assert_eq!(mask.nick, "Remr@m[away]");
    /// assert_eq!(mask.user, "distrirc");
    /// assert_eq!(mask.host, "remram44.github.com");
    /// ```
    pub fn parse(mask: &str) -> Self {
        let mask = mask.strip_prefix(':').unwrap_or(mask);
        let Some(at) = mask.rfind('@') else {
            return Self {
                host: mask.to_string(),
                ..Self::default()
            };
        };

        let (head, host) = (&mask[..at], &mask[at + 1..]);
        let (nick, user) = match head.rfind('!') {
            Some(bang) => (&head[..bang], &head[bang + 1..]),
            None => ("", head),
        };
        Self {
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
        }
    }

    /// True when only a host is present, as for server sources.
    pub fn is_server(&self) -> bool {
        self.nick.is_empty() && self.user.is_empty()
    }
}

impl FromStr for Usermask {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Usermask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.nick.is_empty() {
            write!(f, "{}!", self.nick)?;
        }
        if !self.nick.is_empty() || !self.user.is_empty() {
            write!(f, "{}@", self.user)?;
        }
        f.write_str(&self.host)
    }
}
