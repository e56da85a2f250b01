//! Mailbox address parsing and route classification.
//!
//! Two textual forms are accepted: a bare `local@domain` and a display form
//! ending in `<local@domain>`. Both sides of the `@` are dot-separated runs
//! of ASCII word characters.

use std::{
    fmt::{self, Display, Formatter},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

const ADDRESS: &str = r"(?:[A-Za-z0-9_]+\.)*[A-Za-z0-9_]+@(?:[A-Za-z0-9_]+\.)*[A-Za-z0-9_]+";

static BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{ADDRESS}$")).expect("address pattern is valid"));

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^.*<({ADDRESS})>$")).expect("bracketed address pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteClass {
    /// The domain names this host.
    ServerLocal,
    /// The domain belongs to a peer on the local network.
    NetworkLocal,
    External,
}

impl Display for RouteClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServerLocal => "server-local",
            Self::NetworkLocal => "network-local",
            Self::External => "external",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    raw: String,
    local_part: String,
    domain: String,
}

impl Address {
    /// Parse either form after trimming surrounding whitespace.
    ///
    /// Returns `None` when the text is not an address.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let raw = text.trim();

        let address = if BARE.is_match(raw) {
            raw
        } else {
            BRACKETED.captures(raw)?.get(1)?.as_str()
        };

        let (local_part, domain) = address.split_once('@')?;

        Some(Self {
            raw: raw.to_string(),
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }

    /// The text as received, trimmed.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `local@domain`, without any display text or brackets.
    #[must_use]
    pub fn parsed(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Decides where a recipient domain lives relative to this host.
#[derive(Debug, Clone)]
pub struct Classifier {
    hostname: String,
    network: Regex,
}

impl Classifier {
    /// `network` is matched against the whole domain.
    ///
    /// # Errors
    /// If `network` is not a valid regular expression.
    pub fn new(hostname: impl Into<String>, network: &str) -> Result<Self, ProtocolError> {
        let network =
            Regex::new(&format!("^(?:{network})$")).map_err(|err| {
                ProtocolError::InvalidConfiguration {
                    field: "network_pattern".to_string(),
                    reason: err.to_string(),
                }
            })?;

        Ok(Self {
            hostname: hostname.into(),
            network,
        })
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The network pattern as configured, without the anchoring wrapper.
    #[must_use]
    pub fn network_pattern(&self) -> &str {
        let pattern = self.network.as_str();
        pattern
            .strip_prefix("^(?:")
            .and_then(|p| p.strip_suffix(")$"))
            .unwrap_or(pattern)
    }

    #[must_use]
    pub fn classify(&self, domain: &str) -> RouteClass {
        if domain == self.hostname {
            RouteClass::ServerLocal
        } else if self.network.is_match(domain) {
            RouteClass::NetworkLocal
        } else {
            RouteClass::External
        }
    }

    #[must_use]
    pub fn classify_address(&self, address: &Address) -> RouteClass {
        self.classify(address.domain())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bare_address() {
        let address = Address::parse("  bob@mail.example.org ").expect("valid address");

        assert_eq!(address.raw(), "bob@mail.example.org");
        assert_eq!(address.local_part(), "bob");
        assert_eq!(address.domain(), "mail.example.org");
        assert_eq!(address.parsed(), "bob@mail.example.org");
    }

    #[test]
    fn bracketed_address() {
        let address = Address::parse("Bob Smith <bob.smith@example.org>").expect("valid address");

        assert_eq!(address.raw(), "Bob Smith <bob.smith@example.org>");
        assert_eq!(address.local_part(), "bob.smith");
        assert_eq!(address.domain(), "example.org");
        assert_eq!(address.parsed(), "bob.smith@example.org");

        let address = Address::parse("<alice@host>").expect("valid address");
        assert_eq!(address.parsed(), "alice@host");
    }

    #[test]
    fn last_bracket_group_wins() {
        let address = Address::parse("a <b> <c@d.e>").expect("valid address");
        assert_eq!(address.parsed(), "c@d.e");
    }

    #[test]
    fn rejects_malformed() {
        for text in [
            "",
            "bob",
            "@example.org",
            "bob@",
            "bob@@example.org",
            "bob@example..org",
            ".bob@example.org",
            "bob@example.org.",
            "<bob@example.org> trailing",
            "bob smith@example.org",
            "<bob@example.org",
            "bób@example.org",
        ] {
            assert!(Address::parse(text).is_none(), "{text:?} should not parse");
        }
    }

    #[test]
    fn classification() {
        let classifier =
            Classifier::new("mail.example.org", r"\w+\.lan").expect("valid pattern");

        assert_eq!(
            classifier.classify("mail.example.org"),
            RouteClass::ServerLocal
        );
        assert_eq!(classifier.classify("printer.lan"), RouteClass::NetworkLocal);
        assert_eq!(classifier.classify("a.printer.lan"), RouteClass::External);
        assert_eq!(classifier.classify("printer.lan.com"), RouteClass::External);
        assert_eq!(classifier.classify("example.com"), RouteClass::External);
        assert_eq!(classifier.network_pattern(), r"\w+\.lan");
    }

    #[test]
    fn hostname_beats_network_pattern() {
        let classifier = Classifier::new("box.lan", r"\w+\.lan").expect("valid pattern");
        assert_eq!(classifier.classify("box.lan"), RouteClass::ServerLocal);
    }

    #[test]
    fn invalid_network_pattern() {
        let err = Classifier::new("host", "(unclosed").expect_err("invalid pattern");
        assert!(matches!(err, ProtocolError::InvalidConfiguration { .. }));
    }
}
