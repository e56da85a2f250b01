use core::fmt::{self, Display, Formatter};

/// SMTP reply codes used by the submission session and the relay client.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady,
    GoodBye,
    Ok,
    UserNotLocal,
    StartMailInput,
    Unavailable,
    Unrecognised,
    SyntaxError,
    InvalidCommandSequence,
    MailboxUnavailable,
    Unknown(u32),
}

impl Status {
    /// Checks if the status is a permanent rejection
    #[must_use]
    pub fn is_permanent(self) -> bool {
        u32::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    #[must_use]
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u32::from(self))
    }

    /// Parse the three-digit code at the start of a reply line.
    #[must_use]
    pub fn from_reply(line: &str) -> Option<Self> {
        let code = line.get(..3)?;
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        match line.as_bytes().get(3) {
            None | Some(b' ' | b'-' | b'\r') => code.parse::<u32>().ok().map(Self::from),
            Some(_) => None,
        }
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            250 => Self::Ok,
            251 => Self::UserNotLocal,
            354 => Self::StartMailInput,
            421 => Self::Unavailable,
            500 => Self::Unrecognised,
            501 => Self::SyntaxError,
            503 => Self::InvalidCommandSequence,
            550 => Self::MailboxUnavailable,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::Ok => 250,
            Status::UserNotLocal => 251,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::Unrecognised => 500,
            Status::SyntaxError => 501,
            Status::InvalidCommandSequence => 503,
            Status::MailboxUnavailable => 550,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}
