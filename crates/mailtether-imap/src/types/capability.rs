//! Tagged-response status and the capability set.

/// Completion status of a tagged response (or of an untagged status line
/// such as the greeting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed for operational reasons.
    No,
    /// Command was syntactically or semantically invalid.
    Bad,
    /// Greeting: the connection is already authenticated.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    /// Parses a status keyword, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }

    /// Whether the status indicates success.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        };
        write!(f, "{s}")
    }
}

/// A single server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// STARTTLS upgrade offered
    StartTls,
    /// LOGIN command refused until the connection is encrypted
    LoginDisabled,
    /// SASL mechanism, e.g. `AUTH=PLAIN`
    Auth(String),
    /// SASL initial response in AUTHENTICATE (RFC 4959)
    SaslIr,
    /// IDLE command (RFC 2177)
    Idle,
    /// ENABLE command (RFC 5161)
    Enable,
    /// CONDSTORE mod-sequences (RFC 7162)
    CondStore,
    /// QRESYNC quick resynchronization (RFC 7162)
    QResync,
    /// UIDPLUS: APPENDUID/COPYUID response codes (RFC 4315)
    UidPlus,
    /// MOVE command (RFC 6851)
    Move,
    /// LITERAL+ non-synchronizing literals (RFC 7888)
    LiteralPlus,
    /// UNSELECT command (RFC 3691)
    Unselect,
    /// Anything this engine does not model.
    Other(String),
}

impl Capability {
    /// Parses one capability token, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "IDLE" => Self::Idle,
            "ENABLE" => Self::Enable,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "LITERAL+" => Self::LiteralPlus,
            "UNSELECT" => Self::Unselect,
            _ if upper.starts_with("AUTH=") => Self::Auth(upper[5..].to_string()),
            _ => Self::Other(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::Idle => write!(f, "IDLE"),
            Self::Enable => write!(f, "ENABLE"),
            Self::CondStore => write!(f, "CONDSTORE"),
            Self::QResync => write!(f, "QRESYNC"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Move => write!(f, "MOVE"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::Unselect => write!(f, "UNSELECT"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// The set of capabilities a server has advertised, plus the subset the
/// client has switched on with ENABLE.
///
/// Cleared and re-learned after STARTTLS and after authentication, since
/// servers may advertise different sets in each phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    advertised: Vec<Capability>,
    enabled: Vec<Capability>,
}

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            advertised: Vec::new(),
            enabled: Vec::new(),
        }
    }

    /// Replaces the advertised set wholesale (a CAPABILITY response always
    /// carries the complete current set).
    pub fn replace(&mut self, caps: impl IntoIterator<Item = Capability>) {
        self.advertised.clear();
        for cap in caps {
            if !self.advertised.contains(&cap) {
                self.advertised.push(cap);
            }
        }
    }

    /// Forgets everything. Used after STARTTLS, when the pre-TLS
    /// advertisement can no longer be trusted.
    pub fn clear(&mut self) {
        self.advertised.clear();
        self.enabled.clear();
    }

    /// Whether the server has advertised the capability.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        self.advertised.contains(cap)
    }

    /// Whether a SASL mechanism is advertised, e.g. `"PLAIN"`.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        let want = mechanism.to_uppercase();
        self.advertised
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if *m == want))
    }

    /// Marks capabilities as switched on via ENABLE.
    pub fn enable(&mut self, caps: impl IntoIterator<Item = Capability>) {
        for cap in caps {
            if !self.enabled.contains(&cap) {
                self.enabled.push(cap);
            }
        }
    }

    /// Whether the capability has been switched on via ENABLE.
    #[must_use]
    pub fn is_enabled(&self, cap: &Capability) -> bool {
        self.enabled.contains(cap)
    }

    /// True when no advertisement has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.advertised.is_empty()
    }

    /// The advertised capabilities in advertisement order.
    #[must_use]
    pub fn advertised(&self) -> &[Capability] {
        &self.advertised
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    mod status_tests {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(Status::parse("ok"), Some(Status::Ok));
            assert_eq!(Status::parse("Preauth"), Some(Status::PreAuth));
            assert_eq!(Status::parse("BYE"), Some(Status::Bye));
            assert_eq!(Status::parse("WAT"), None);
        }

        #[test]
        fn ok_and_preauth_are_success() {
            assert!(Status::Ok.is_ok());
            assert!(Status::PreAuth.is_ok());
            assert!(!Status::No.is_ok());
            assert!(!Status::Bad.is_ok());
            assert!(!Status::Bye.is_ok());
        }
    }

    mod capability_tests {
        use super::*;

        #[test]
        fn parse_known_tokens() {
            assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
            assert_eq!(Capability::parse("starttls"), Capability::StartTls);
            assert_eq!(Capability::parse("QRESYNC"), Capability::QResync);
            assert_eq!(Capability::parse("SASL-IR"), Capability::SaslIr);
        }

        #[test]
        fn parse_auth_mechanisms() {
            assert_eq!(
                Capability::parse("AUTH=PLAIN"),
                Capability::Auth("PLAIN".to_string())
            );
            assert_eq!(
                Capability::parse("auth=xoauth2"),
                Capability::Auth("XOAUTH2".to_string())
            );
        }

        #[test]
        fn unmodeled_tokens_round_trip_through_other() {
            let cap = Capability::parse("X-GM-EXT-1");
            assert_eq!(cap, Capability::Other("X-GM-EXT-1".to_string()));
            assert_eq!(cap.to_string(), "X-GM-EXT-1");
        }
    }

    mod set_tests {
        use super::*;

        #[test]
        fn replace_deduplicates() {
            let mut set = CapabilitySet::new();
            set.replace(vec![
                Capability::Idle,
                Capability::Idle,
                Capability::StartTls,
            ]);
            assert_eq!(set.advertised().len(), 2);
            assert!(set.has(&Capability::Idle));
        }

        #[test]
        fn replace_is_wholesale() {
            let mut set = CapabilitySet::new();
            set.replace(vec![Capability::StartTls]);
            set.replace(vec![Capability::Idle]);
            assert!(!set.has(&Capability::StartTls));
            assert!(set.has(&Capability::Idle));
        }

        #[test]
        fn has_auth_matches_mechanism() {
            let mut set = CapabilitySet::new();
            set.replace(vec![Capability::Auth("PLAIN".to_string())]);
            assert!(set.has_auth("plain"));
            assert!(!set.has_auth("XOAUTH2"));
        }

        #[test]
        fn clear_drops_enabled_state() {
            let mut set = CapabilitySet::new();
            set.replace(vec![Capability::QResync]);
            set.enable(vec![Capability::QResync]);
            assert!(set.is_enabled(&Capability::QResync));
            set.clear();
            assert!(set.is_empty());
            assert!(!set.is_enabled(&Capability::QResync));
        }
    }
}
