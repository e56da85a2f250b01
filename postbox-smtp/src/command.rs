use core::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(Option<String>),
    /// Text after `FROM:`, or `None` when the keyword is missing.
    MailFrom(Option<String>),
    /// Text after `TO:`, or `None` when the keyword is missing.
    RcptTo(Option<String>),
    Data,
    Rset,
    Noop,
    Quit,
    Unknown(String),
}

fn keyword_argument(rest: &str, keyword: &str) -> Option<String> {
    let (name, argument) = rest.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case(keyword)
        .then(|| argument.trim().to_string())
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Self::Helo(rest.split_whitespace().next().map(str::to_string)),
            "MAIL" => Self::MailFrom(keyword_argument(rest, "FROM")),
            "RCPT" => Self::RcptTo(keyword_argument(rest, "TO")),
            "DATA" => Self::Data,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(name) => write!(f, "HELO {}", name.as_deref().unwrap_or_default()),
            Self::MailFrom(from) => write!(f, "MAIL FROM:{}", from.as_deref().unwrap_or_default()),
            Self::RcptTo(to) => write!(f, "RCPT TO:{}", to.as_deref().unwrap_or_default()),
            Self::Data => f.write_str("DATA"),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Quit => f.write_str("QUIT"),
            Self::Unknown(line) => f.write_str(line),
        }
    }
}
