//! Command kinds and the keyword table.

use std::fmt;

/// The closed set of commands the parser tells apart.
///
/// Numeric replies keep their RFC 1459 meaning. Any other three-digit code in
/// the 400-599 error range becomes [`OtherError`](CommandKind::OtherError);
/// every remaining verb is [`Unrecognized`](CommandKind::Unrecognized).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    // Errors
    InvalidPasswd,
    Banned,
    OtherError(u16),

    // Away
    Away,
    YouAway,
    YouUnaway,

    // WHOIS
    WhoisUser,
    WhoisServer,
    WhoisOperator,
    WhoisIdle,
    WhoisChannels,
    EndOfWhois,

    // Channels
    ChannelModes,
    NoTopic,
    TopicIs,
    TopicWhoTime,
    WhoReply,
    EndOfWho,
    NamesAre,
    EndOfNames,
    BanList,
    EndOfBanList,

    // MOTD
    MotdStart,
    Motd,
    EndOfMotd,
    NoMotd,

    Ison,

    // Textual commands
    Privmsg,
    Notice,
    Topic,
    Join,
    Part,
    Quit,
    Names,
    Who,
    Mode,
    Nick,
    Invite,
    Ping,
    Pong,

    // Relay vocabulary
    DIdent,
    DConnect,
    DDisconnect,
    DQuote,
    DShowLog,
    DListLogs,

    Unrecognized,
}

use CommandKind::*;

/// Verb to kind, in lookup order.
const KEYWORDS: &[(&str, CommandKind)] = &[
    ("464", InvalidPasswd),
    ("465", Banned),
    ("301", Away),
    ("306", YouAway),
    ("305", YouUnaway),
    ("311", WhoisUser),
    ("312", WhoisServer),
    ("313", WhoisOperator),
    ("317", WhoisIdle),
    ("319", WhoisChannels),
    ("318", EndOfWhois),
    ("324", ChannelModes),
    ("331", NoTopic),
    ("332", TopicIs),
    ("333", TopicWhoTime),
    ("352", WhoReply),
    ("315", EndOfWho),
    ("353", NamesAre),
    ("366", EndOfNames),
    ("367", BanList),
    ("368", EndOfBanList),
    ("375", MotdStart),
    ("372", Motd),
    ("376", EndOfMotd),
    ("422", NoMotd),
    ("303", Ison),
    ("PRIVMSG", Privmsg),
    ("NOTICE", Notice),
    ("TOPIC", Topic),
    ("JOIN", Join),
    ("PART", Part),
    ("QUIT", Quit),
    ("NAMES", Names),
    ("WHO", Who),
    ("MODE", Mode),
    ("NICK", Nick),
    ("INVITE", Invite),
    ("PING", Ping),
    ("PONG", Pong),
    ("DIDENT", DIdent),
    ("DCONNECT", DConnect),
    ("DDISCONNECT", DDisconnect),
    ("DQUOTE", DQuote),
    ("DSHOWLOG", DShowLog),
    ("DLISTLOGS", DListLogs),
];

const ERROR_CODES: std::ops::RangeInclusive<u16> = 400..=599;

impl CommandKind {
    /// Classifies a command token. Matching is exact and case-sensitive.
    pub fn from_token(token: &str) -> Self {
        if let Some(&(_, kind)) = KEYWORDS.iter().find(|(keyword, _)| *keyword == token) {
            return kind;
        }
        match parse_code(token) {
            Some(code) if ERROR_CODES.contains(&code) => OtherError(code),
            _ => Unrecognized,
        }
    }

    /// The fixed keyword of this kind, if it has one.
    pub fn keyword(self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(keyword, _)| *keyword)
    }

    /// The verb written on the wire: the keyword, or the three-digit code of
    /// a generic error. `None` for [`Unrecognized`](CommandKind::Unrecognized).
    pub fn verb(self) -> Option<String> {
        match self {
            OtherError(code) => Some(format!("{code:03}")),
            kind => kind.keyword().map(str::to_string),
        }
    }

    /// Numeric reply code, if this is a numeric kind.
    pub fn code(self) -> Option<u16> {
        match self {
            OtherError(code) => Some(code),
            kind => kind.keyword().and_then(parse_code),
        }
    }

    /// Whether this is an error reply (codes 400-599).
    pub fn is_error(self) -> bool {
        self.code().is_some_and(|code| ERROR_CODES.contains(&code))
    }

    /// Whether this belongs to the relay vocabulary.
    pub fn is_relay(self) -> bool {
        matches!(
            self,
            DIdent | DConnect | DDisconnect | DQuote | DShowLog | DListLogs
        )
    }

    /// Every kind that has a fixed keyword.
    pub fn named() -> impl Iterator<Item = CommandKind> {
        KEYWORDS.iter().map(|&(_, kind)| kind)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.verb() {
            Some(verb) => f.write_str(&verb),
            None => f.write_str("<unrecognized>"),
        }
    }
}

fn parse_code(token: &str) -> Option<u16> {
    if token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_table() {
        assert_eq!(CommandKind::from_token("352"), WhoReply);
        assert_eq!(CommandKind::from_token("353"), NamesAre);
        assert_eq!(CommandKind::from_token("333"), TopicWhoTime);
        assert_eq!(CommandKind::from_token("464"), InvalidPasswd);
        assert_eq!(CommandKind::from_token("422"), NoMotd);
    }

    #[test]
    fn test_generic_errors() {
        assert_eq!(CommandKind::from_token("433"), OtherError(433));
        assert_eq!(CommandKind::from_token("599"), OtherError(599));
        assert_eq!(CommandKind::from_token("400"), OtherError(400));
        assert_eq!(CommandKind::from_token("399"), Unrecognized);
        assert_eq!(CommandKind::from_token("600"), Unrecognized);
        assert_eq!(CommandKind::from_token("4333"), Unrecognized);
        assert_eq!(CommandKind::from_token("001"), Unrecognized);
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(CommandKind::from_token("PRIVMSG"), Privmsg);
        assert_eq!(CommandKind::from_token("privmsg"), Unrecognized);
        assert_eq!(CommandKind::from_token("DSHOWLOG"), DShowLog);
        assert_eq!(CommandKind::from_token(""), Unrecognized);
    }

    #[test]
    fn test_verbs() {
        assert_eq!(Ping.verb().as_deref(), Some("PING"));
        assert_eq!(EndOfMotd.verb().as_deref(), Some("376"));
        assert_eq!(OtherError(451).verb().as_deref(), Some("451"));
        assert_eq!(Unrecognized.verb(), None);
        assert_eq!(OtherError(451).to_string(), "451");
    }

    #[test]
    fn test_every_keyword_maps_back() {
        for kind in CommandKind::named() {
            let verb = kind.verb().unwrap();
            assert_eq!(CommandKind::from_token(&verb), kind, "{verb}");
        }
    }

    #[test]
    fn test_classification() {
        assert!(Banned.is_error());
        assert!(OtherError(433).is_error());
        assert!(!Motd.is_error());
        assert!(!Privmsg.is_error());
        assert_eq!(Motd.code(), Some(372));
        assert_eq!(Privmsg.code(), None);
        assert!(DQuote.is_relay());
        assert!(!Quit.is_relay());
    }
}
