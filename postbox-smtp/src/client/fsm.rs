use core::fmt::{self, Display, Formatter};

use postbox_common::{status::Status, traits::fsm::FiniteStateMachine};

/// A command the relay client wants written to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Helo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message text, dot-stuffed, followed by the lone `.` terminator.
    Body(String),
    Quit,
}

impl Display for ClientCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(host) => write!(f, "HELO {host}"),
            Self::MailFrom(sender) => write!(f, "MAIL FROM:<{sender}>"),
            Self::RcptTo(recipient) => write!(f, "RCPT TO:<{recipient}>"),
            Self::Data => f.write_str("DATA"),
            Self::Body(payload) => {
                for line in payload.split_inclusive('\n') {
                    if line.starts_with('.') {
                        f.write_str(".")?;
                    }
                    f.write_str(line)?;
                }
                if !payload.is_empty() && !payload.ends_with("\r\n") {
                    f.write_str("\r\n")?;
                }
                f.write_str(".")
            }
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

/// Where the relay conversation stands, named after what the next reply
/// from the peer answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    /// Awaiting the greeting.
    #[default]
    Helo,
    /// Awaiting the `HELO` reply.
    From,
    /// Awaiting the `MAIL FROM` reply.
    Rcpt,
    /// Awaiting the `RCPT TO` reply.
    To,
    /// Awaiting the `DATA` go-ahead; the body is sent from here.
    Data1,
    /// Awaiting acceptance of the body.
    Data2,
    /// Awaiting the `QUIT` acknowledgement.
    Quit,
    End,
}

/// Inputs and outputs of one relay transfer.
#[derive(Debug, Clone)]
pub struct RelayTransaction {
    pub hostname: String,
    pub sender: String,
    pub recipient: String,
    pub payload: String,
    /// Set by each transition; `None` means send nothing and keep reading.
    pub outgoing: Option<ClientCommand>,
    /// The peer accepted the message body.
    pub accepted: bool,
}

impl RelayTransaction {
    pub fn new(
        hostname: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            payload: payload.into(),
            outgoing: None,
            accepted: false,
        }
    }
}

impl FiniteStateMachine for RelayState {
    /// The reply's status code, `None` if the line carried none.
    type Input = Option<Status>;
    type Context = RelayTransaction;

    fn transition(self, status: Option<Status>, tx: &mut RelayTransaction) -> Self {
        tx.outgoing = None;

        if status == Some(Status::Unavailable) && self != Self::Data1 {
            return Self::End;
        }

        let (next, command) = match (self, status) {
            (Self::Helo, Some(Status::ServiceReady)) => {
                (Self::From, Some(ClientCommand::Helo(tx.hostname.clone())))
            }
            (Self::From, Some(Status::Ok)) => {
                (Self::Rcpt, Some(ClientCommand::MailFrom(tx.sender.clone())))
            }
            (Self::Rcpt, Some(Status::Ok)) => {
                (Self::To, Some(ClientCommand::RcptTo(tx.recipient.clone())))
            }
            (Self::To, Some(Status::Ok | Status::UserNotLocal)) => {
                (Self::Data1, Some(ClientCommand::Data))
            }
            (Self::Data1, Some(Status::StartMailInput)) => {
                (Self::Data2, Some(ClientCommand::Body(tx.payload.clone())))
            }
            (Self::Data2, Some(Status::Ok)) => {
                tx.accepted = true;
                (Self::Quit, Some(ClientCommand::Quit))
            }
            (Self::Quit, Some(Status::GoodBye)) => (Self::End, None),
            (state @ (Self::Data1 | Self::Quit | Self::End), _) => (state, None),
            (_, _) => (Self::Quit, Some(ClientCommand::Quit)),
        };

        tx.outgoing = command;
        next
    }

    fn is_final(&self) -> bool {
        *self == Self::End
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn transaction() -> RelayTransaction {
        RelayTransaction::new(
            "mail.example.org",
            "alice@mail.example.org",
            "bob@example.com",
            "Subject: hi\r\n\r\nhello\r\n",
        )
    }

    fn step(state: RelayState, code: u32, tx: &mut RelayTransaction) -> RelayState {
        state.transition(Some(Status::from(code)), tx)
    }

    #[test]
    fn full_conversation() {
        let mut tx = transaction();
        let mut state = RelayState::default();
        let mut sent = Vec::new();

        for code in [220, 250, 250, 251, 354, 250, 221] {
            state = step(state, code, &mut tx);
            if let Some(command) = tx.outgoing.take() {
                sent.push(command.to_string());
            }
        }

        assert_eq!(state, RelayState::End);
        assert!(state.is_final());
        assert!(tx.accepted);
        assert_eq!(
            sent,
            vec![
                "HELO mail.example.org",
                "MAIL FROM:<alice@mail.example.org>",
                "RCPT TO:<bob@example.com>",
                "DATA",
                "Subject: hi\r\n\r\nhello\r\n.",
                "QUIT",
            ]
        );
    }

    #[test]
    fn refusal_sends_quit() {
        let mut tx = transaction();
        let state = step(RelayState::Helo, 220, &mut tx);
        let state = step(state, 250, &mut tx);
        let state = step(state, 250, &mut tx);

        let state = step(state, 550, &mut tx);
        assert_eq!(state, RelayState::Quit);
        assert_eq!(tx.outgoing, Some(ClientCommand::Quit));
        assert!(!tx.accepted);

        let state = step(state, 221, &mut tx);
        assert_eq!(state, RelayState::End);
        assert_eq!(tx.outgoing, None);
    }

    #[test]
    fn rejected_body_sends_quit() {
        let mut tx = transaction();
        let state = step(RelayState::Data2, 554, &mut tx);
        assert_eq!(state, RelayState::Quit);
        assert_eq!(tx.outgoing, Some(ClientCommand::Quit));
        assert!(!tx.accepted);
    }

    #[test]
    fn unexpected_reply_while_waiting_for_data_sends_nothing() {
        let mut tx = transaction();
        let state = step(RelayState::Data1, 451, &mut tx);
        assert_eq!(state, RelayState::Data1);
        assert_eq!(tx.outgoing, None);

        let state = RelayState::Data1.transition(None, &mut tx);
        assert_eq!(state, RelayState::Data1);
        assert_eq!(tx.outgoing, None);

        let state = step(RelayState::Quit, 250, &mut tx);
        assert_eq!(state, RelayState::Quit);
        assert_eq!(tx.outgoing, None);
    }

    #[test]
    fn service_unavailable_aborts() {
        for state in [
            RelayState::Helo,
            RelayState::From,
            RelayState::Rcpt,
            RelayState::To,
            RelayState::Data2,
            RelayState::Quit,
        ] {
            let mut tx = transaction();
            assert_eq!(step(state, 421, &mut tx), RelayState::End, "{state:?}");
            assert_eq!(tx.outgoing, None);
        }

        let mut tx = transaction();
        assert_eq!(step(RelayState::Data1, 421, &mut tx), RelayState::Data1);
    }

    #[test]
    fn body_terminator() {
        assert_eq!(ClientCommand::Body("a\r\nb".into()).to_string(), "a\r\nb\r\n.");
        assert_eq!(ClientCommand::Body("a\r\n".into()).to_string(), "a\r\n.");
    }

    #[test]
    fn body_lines_starting_with_a_dot_are_doubled() {
        assert_eq!(
            ClientCommand::Body(".x\r\n.\r\nplain .\r\n".into()).to_string(),
            "..x\r\n..\r\nplain .\r\n."
        );
    }
}
