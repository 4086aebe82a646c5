//! Structured commands and their wire rendering.

use super::kind::CommandKind;
use super::parser::{CommandParser, ParsePolicy, ParseResult};
use super::usermask::Usermask;
use std::fmt;

static DEFAULT_PARSER: CommandParser = CommandParser::with_policy(ParsePolicy::OBSERVED);

/// One protocol line, parsed.
///
/// The verb is kept as received so that unrecognized commands and generic
/// error codes render back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    verb: String,
    source: String,
    args: Vec<String>,
}

impl Command {
    /// Builds a command with no source.
    ///
    /// [`CommandKind::Unrecognized`] has no verb of its own; use
    /// [`CommandBuilder::raw`] for commands outside the keyword table.
    pub fn new<I, A>(kind: CommandKind, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        CommandBuilder::new(kind).args(args).build()
    }

    /// Builds a command carrying a source prefix.
    pub fn with_source<I, A>(source: impl Into<String>, kind: CommandKind, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        CommandBuilder::new(kind).source(source).args(args).build()
    }

    pub(crate) fn from_parts(
        kind: CommandKind,
        verb: String,
        source: String,
        args: Vec<String>,
    ) -> Self {
        Self {
            kind,
            verb,
            source,
            args,
        }
    }

    /// Parses a line with the default server quirks.
    ///
    /// ```
    /// use distrirc::protocol::{Command, CommandKind};
    ///
    /// let ping = Command::parse("PING :this is sparta").unwrap();
    /// assert_eq!(ping.kind(), CommandKind::Ping);
    /// assert_eq!(ping.args(), ["this is sparta"]);
    /// ```
    pub fn parse(line: &str) -> ParseResult<Self> {
        DEFAULT_PARSER.parse(line)
    }

    /// Parses raw bytes, replacing invalid UTF-8.
    pub fn parse_bytes(line: &[u8]) -> ParseResult<Self> {
        DEFAULT_PARSER.parse_bytes(line)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The command token as received or built.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The source prefix without its marker; empty if absent.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }

    /// Decodes the source as a usermask.
    pub fn usermask(&self) -> Usermask {
        Usermask::parse(&self.source)
    }

    /// Renders the line, without terminator.
    ///
    /// The last argument gets a `:` prefix when it is empty, contains a
    /// space, or starts with `:` itself.
    pub fn render(&self) -> String {
        let capacity = self.source.len()
            + self.verb.len()
            + self.args.iter().map(|a| a.len() + 2).sum::<usize>()
            + 2;
        let mut out = String::with_capacity(capacity);

        if !self.source.is_empty() {
            out.push(':');
            out.push_str(&self.source);
            out.push(' ');
        }
        out.push_str(&self.verb);

        let last = self.args.len().saturating_sub(1);
        for (index, arg) in self.args.iter().enumerate() {
            out.push(' ');
            if index == last && needs_marker(arg) {
                out.push(':');
            }
            out.push_str(arg);
        }
        out
    }
}

fn needs_marker(arg: &str) -> bool {
    arg.is_empty() || arg.contains(' ') || arg.starts_with(':')
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::str::FromStr for Command {
    type Err = super::parser::InvalidLine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Step-by-step construction of a [`Command`].
///
/// ```
/// use distrirc::protocol::{CommandBuilder, CommandKind};
///
/// let reply = CommandBuilder::new(CommandKind::Privmsg)
///     .source("Remram!distrirc@remram44.github.com")
///     .arg("#rezo")
///     .arg("hello world")
///     .build();
/// assert_eq!(
///     reply.render(),
///     ":Remram!distrirc@remram44.github.com PRIVMSG #rezo :hello world"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    kind: CommandKind,
    verb: String,
    source: String,
    args: Vec<String>,
}

impl CommandBuilder {
    /// Starts a command of the given kind.
    ///
    /// The kind is settled the way a parser would read the rendered verb, so
    /// an [`OtherError`](CommandKind::OtherError) code outside 400-599 comes
    /// out as [`Unrecognized`](CommandKind::Unrecognized). `Unrecognized`
    /// itself has no verb and must go through [`raw`](Self::raw).
    pub fn new(kind: CommandKind) -> Self {
        debug_assert!(
            kind != CommandKind::Unrecognized,
            "CommandKind::Unrecognized has no verb, use CommandBuilder::raw"
        );
        match kind.verb() {
            Some(verb) => Self::raw(verb),
            None => Self {
                kind,
                verb: String::new(),
                source: String::new(),
                args: Vec::new(),
            },
        }
    }

    /// Starts from an arbitrary verb, classified like a parsed token.
    pub fn raw(verb: impl Into<String>) -> Self {
        let verb = verb.into();
        Self {
            kind: CommandKind::from_token(&verb),
            verb,
            source: String::new(),
            args: Vec::new(),
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Command {
        Command::from_parts(self.kind, self.verb, self.source, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandKind::*;

    fn assert_round_trip(command: Command) {
        let line = command.render();
        let parsed = CommandParser::with_policy(ParsePolicy::strict())
            .parse(&line)
            .unwrap();
        assert_eq!(parsed, command, "{line}");
        assert_eq!(Command::parse(&line).unwrap().kind(), command.kind());
    }

    #[test]
    fn test_out_of_range_error_code_is_unrecognized() {
        let command = Command::new(OtherError(42), ["Test", "odd reply"]);
        assert_eq!(command.kind(), Unrecognized);
        assert_eq!(command.verb(), "042");
        assert_eq!(command.render(), "042 Test :odd reply");
        assert_eq!(Command::parse(&command.render()).unwrap(), command);

        let command = Command::new(OtherError(433), ["Test", "Nickname is already in use"]);
        assert_eq!(command.kind(), OtherError(433));
        assert_round_trip(command);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "no verb")]
    fn test_unrecognized_needs_raw() {
        Command::new(Unrecognized, ["x", "y z"]);
    }

    #[test]
    fn test_render() {
        let command = Command::new(Privmsg, ["#rezo", "hello world"]);
        assert_eq!(command.render(), "PRIVMSG #rezo :hello world");

        let command = Command::new(Nick, ["Remram"]);
        assert_eq!(command.to_string(), "NICK Remram");

        let command = Command::with_source(
            "irc.example.org",
            EndOfMotd,
            ["Test", "End of /MOTD command."],
        );
        assert_eq!(
            command.render(),
            ":irc.example.org 376 Test :End of /MOTD command."
        );

        let command = Command::new(
            OtherError(433),
            ["*", "Remram", "Nickname is already in use"],
        );
        assert_eq!(command.render(), "433 * Remram :Nickname is already in use");
    }

    #[test]
    fn test_trailing_marker_rules() {
        assert_eq!(Command::new(Topic, ["#a", ""]).render(), "TOPIC #a :");
        assert_eq!(Command::new(Privmsg, ["#a", ":)"]).render(), "PRIVMSG #a ::)");
        assert_eq!(Command::new(Join, ["#a"]).render(), "JOIN #a");
        assert_eq!(Command::new(Quit, Vec::<String>::new()).render(), "QUIT");
    }

    #[test]
    fn test_round_trips() {
        for kind in CommandKind::named() {
            assert_round_trip(Command::new(kind, ["first", "last one"]));
            assert_round_trip(Command::with_source("nick!user@host", kind, ["x", ""]));
            assert_round_trip(Command::new(kind, ["only"]));
        }
        assert_round_trip(Command::new(OtherError(482), ["#rezo", "You're not channel operator"]));
        assert_round_trip(Command::new(Privmsg, ["#rezo", ":colon first"]));
    }

    #[test]
    fn test_round_trips_under_default_policy() {
        let quirky = [WhoisChannels, WhoReply, NamesAre, Ison];
        for kind in CommandKind::named().filter(|k| !quirky.contains(k)) {
            let command = Command::new(kind, ["a", "b", "c d"]);
            assert_eq!(Command::parse(&command.render()).unwrap(), command);
        }
    }

    #[test]
    fn test_raw_verbs() {
        let command = CommandBuilder::raw("USER")
            .args(["distrirc", "distrirc", "localhost", "Remi Rampin"])
            .build();
        assert_eq!(command.kind(), Unrecognized);
        assert_eq!(command.render(), "USER distrirc distrirc localhost :Remi Rampin");
        assert_eq!(Command::parse(&command.render()).unwrap(), command);

        let command = CommandBuilder::raw("PING").arg("x").build();
        assert_eq!(command.kind(), Ping);
    }

    #[test]
    fn test_parsed_keeps_verb() {
        let command: Command = ":srv 001 Test :Welcome".parse().unwrap();
        assert_eq!(command.kind(), Unrecognized);
        assert_eq!(command.verb(), "001");
        assert_eq!(command.render(), ":srv 001 Test Welcome");
        assert_eq!(command.arg(0), Some("Test"));
        assert_eq!(command.arg(2), None);
        assert!(command.usermask().is_server());
    }
}
