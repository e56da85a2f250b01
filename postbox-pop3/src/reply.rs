use core::fmt::{self, Display, Formatter};

/// A server reply. [`Display`] renders the exact wire text, CRLF included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(String),
    Err(String),
    /// `+OK status`, the body lines, then a lone `.`.
    Listing { status: String, body: String },
}

impl Reply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self::Ok(text.into())
    }

    pub fn err(text: impl Into<String>) -> Self {
        Self::Err(text.into())
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        !matches!(self, Self::Err(_))
    }

    /// The first line without its status indicator.
    #[must_use]
    pub fn status(&self) -> &str {
        match self {
            Self::Ok(text) | Self::Err(text) | Self::Listing { status: text, .. } => text,
        }
    }

    /// Multi-line payload, if any.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Listing { body, .. } => Some(body),
            _ => None,
        }
    }
}

fn status_line(f: &mut Formatter<'_>, indicator: &str, text: &str) -> fmt::Result {
    if text.is_empty() {
        write!(f, "{indicator}\r\n")
    } else {
        write!(f, "{indicator} {text}\r\n")
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(text) => status_line(f, "+OK", text),
            Self::Err(text) => status_line(f, "-ERR", text),
            Self::Listing { status, body } => {
                status_line(f, "+OK", status)?;
                for line in body.lines() {
                    if line.starts_with('.') {
                        f.write_str(".")?;
                    }
                    write!(f, "{line}\r\n")?;
                }
                f.write_str(".\r\n")
            }
        }
    }
}
