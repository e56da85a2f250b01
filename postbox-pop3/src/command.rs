use core::fmt::{self, Display, Formatter};

/// A client line, split into verb and arguments. Verbs are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `USER name`
    User(Option<String>),
    /// `PASS secret`; the argument is the rest of the line.
    Pass(Option<String>),
    Quit,
    Stat,
    List(Option<String>),
    Retr(Option<String>),
    Dele(Option<String>),
    Rset,
    Noop,
    /// `TOP msg lines`
    Top(Option<String>, Option<String>),
    Unknown(String),
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let mut args = rest.split_whitespace().map(str::to_string);
        let whole = (!rest.is_empty()).then(|| rest.to_string());

        match verb.to_ascii_uppercase().as_str() {
            "USER" => Self::User(args.next()),
            "PASS" => Self::Pass(whole),
            "QUIT" => Self::Quit,
            "STAT" => Self::Stat,
            "LIST" => Self::List(args.next()),
            "RETR" => Self::Retr(args.next()),
            "DELE" => Self::Dele(args.next()),
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "TOP" => Self::Top(args.next(), args.next()),
            _ => Self::Unknown(line.to_string()),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let arg = |arg: &Option<String>| arg.as_deref().map(|a| format!(" {a}")).unwrap_or_default();

        match self {
            Self::User(name) => write!(f, "USER{}", arg(name)),
            // Never echo secrets into logs.
            Self::Pass(_) => f.write_str("PASS ****"),
            Self::Quit => f.write_str("QUIT"),
            Self::Stat => f.write_str("STAT"),
            Self::List(n) => write!(f, "LIST{}", arg(n)),
            Self::Retr(n) => write!(f, "RETR{}", arg(n)),
            Self::Dele(n) => write!(f, "DELE{}", arg(n)),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Top(n, lines) => write!(f, "TOP{}{}", arg(n), arg(lines)),
            Self::Unknown(line) => f.write_str(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Command;

    #[test]
    fn parse() {
        assert_eq!(Command::from("user alice"), Command::User(Some("alice".into())));
        assert_eq!(Command::from("USER"), Command::User(None));
        assert_eq!(
            Command::from("PASS two words "),
            Command::Pass(Some("two words".into()))
        );
        assert_eq!(Command::from("PASS"), Command::Pass(None));
        assert_eq!(Command::from("list"), Command::List(None));
        assert_eq!(Command::from("LIST 2"), Command::List(Some("2".into())));
        assert_eq!(
            Command::from("TOP 1 10"),
            Command::Top(Some("1".into()), Some("10".into()))
        );
        assert_eq!(Command::from("Quit"), Command::Quit);
        assert_eq!(Command::from("APOP x y"), Command::Unknown("APOP x y".into()));
        assert_eq!(Command::from(""), Command::Unknown(String::new()));
    }

    #[test]
    fn display_hides_password() {
        assert_eq!(Command::from("PASS hunter2").to_string(), "PASS ****");
        assert_eq!(Command::from("retr 3").to_string(), "RETR 3");
    }
}
