use std::{net::IpAddr, sync::Arc};

use postbox_common::{
    address::{Address, RouteClass},
    internal,
    status::Status,
    traits::fsm::FiniteStateMachine,
};
use postbox_store::{MailboxStore, PendingDelivery, ServerContext};

use crate::{State, command::Command, reply::Reply};

/// Everything a submission session has accumulated so far.
#[derive(Debug)]
pub struct Transaction {
    context: Arc<ServerContext>,
    peer: IpAddr,
    pub helo: Option<String>,
    pub sender: Option<Address>,
    pub recipients: Vec<Address>,
    pub body: String,
    pub response: Option<Reply>,
}

impl Transaction {
    #[must_use]
    pub const fn new(context: Arc<ServerContext>, peer: IpAddr) -> Self {
        Self {
            context,
            peer,
            helo: None,
            sender: None,
            recipients: Vec::new(),
            body: String::new(),
            response: None,
        }
    }

    fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.body.clear();
    }

    fn respond(&mut self, status: Status, text: impl Into<String>) {
        self.response = Some(Reply::new(status, text));
    }

    fn recipient(&mut self, argument: &str) {
        let Some(address) = Address::parse(argument) else {
            self.respond(Status::SyntaxError, "Email address invalid");
            return;
        };

        match self.context.classifier().classify_address(&address) {
            RouteClass::ServerLocal => {
                if self
                    .context
                    .mailboxes()
                    .find_user(address.local_part())
                    .is_ok()
                {
                    self.respond(Status::Ok, format!("{address}... Recipient ok (local)"));
                    self.recipients.push(address);
                } else {
                    self.respond(
                        Status::MailboxUnavailable,
                        format!("{address}... No such local user"),
                    );
                }
            }
            class => {
                self.respond(
                    Status::Ok,
                    format!("{address}... Recipient ok ({class}, will forward)"),
                );
                self.recipients.push(address);
            }
        }
    }
}

impl FiniteStateMachine for State {
    type Input = Command;
    type Context = Transaction;

    fn transition(self, command: Command, tx: &mut Transaction) -> Self {
        match (self, command) {
            (_, Command::Quit) => {
                let hostname = tx.context.hostname().to_string();
                tx.respond(Status::GoodBye, format!("{hostname} closing connection"));
                Self::End
            }

            (Self::Helo | Self::From | Self::To, Command::Helo(Some(name))) => {
                let hostname = tx.context.hostname().to_string();
                let peer = tx.peer;
                tx.respond(
                    Status::Ok,
                    format!("{hostname} Hello {name} [{peer}], pleased to meet you"),
                );
                tx.helo = Some(name);
                tx.reset();
                Self::From
            }
            (state, Command::Helo(None)) => {
                tx.respond(Status::SyntaxError, "HELO requires domain address");
                state
            }

            (Self::From, Command::MailFrom(Some(argument))) => {
                if let Some(sender) = Address::parse(&argument) {
                    tx.respond(Status::Ok, format!("{sender}... Sender ok"));
                    tx.sender = Some(sender);
                    tx.recipients.clear();
                    Self::To
                } else {
                    tx.respond(Status::SyntaxError, "Email address invalid");
                    Self::From
                }
            }
            (Self::From, Command::MailFrom(None)) => {
                tx.respond(Status::SyntaxError, "Syntax error in parameters");
                Self::From
            }

            (Self::To, Command::RcptTo(Some(argument))) => {
                tx.recipient(&argument);
                Self::To
            }
            (Self::To, Command::RcptTo(None)) => {
                tx.respond(Status::SyntaxError, "Syntax error in parameters");
                Self::To
            }

            (Self::To, Command::Data) if !tx.recipients.is_empty() => {
                tx.respond(
                    Status::StartMailInput,
                    "Enter mail, end with \".\" on a line by itself",
                );
                Self::Data
            }

            (state, Command::Rset) => {
                tx.reset();
                tx.respond(Status::Ok, "Reset state");
                if state == Self::Helo {
                    Self::Helo
                } else {
                    Self::From
                }
            }
            (state, Command::Noop) => {
                tx.respond(Status::Ok, "OK");
                state
            }
            (state, Command::Unknown(_)) => {
                tx.respond(Status::Unrecognised, "Syntax error, command unrecognised");
                state
            }
            (state, _) => {
                tx.respond(Status::InvalidCommandSequence, "Bad sequence of commands");
                state
            }
        }
    }

    fn is_final(&self) -> bool {
        *self == Self::End
    }
}

/// Protocol logic for one mail-submission connection, independent of I/O.
#[derive(Debug)]
pub struct SubmissionSession {
    state: State,
    transaction: Transaction,
    banner: Arc<str>,
}

impl SubmissionSession {
    #[must_use]
    pub const fn new(context: Arc<ServerContext>, peer: IpAddr, banner: Arc<str>) -> Self {
        Self {
            state: State::Helo,
            transaction: Transaction::new(context, peer),
            banner,
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_final()
    }

    #[must_use]
    pub fn greeting(&self) -> Reply {
        let context = &self.transaction.context;
        if context.is_online() {
            Reply::new(
                Status::ServiceReady,
                format!(
                    "{} {}; {}",
                    context.hostname(),
                    self.banner,
                    chrono::Local::now().to_rfc2822()
                ),
            )
        } else {
            unavailable()
        }
    }

    /// Feed one line. `None` means the line was absorbed into a message body.
    pub fn handle(&mut self, line: &str) -> Option<Reply> {
        if self.state == State::Data {
            if line == "." {
                return Some(self.finish());
            }

            // A leading dot was doubled by the sender.
            let line = line
                .strip_prefix('.')
                .filter(|rest| rest.starts_with('.'))
                .unwrap_or(line);

            self.transaction.body.push_str(line);
            self.transaction.body.push_str("\r\n");
            return None;
        }

        let command = Command::from(line);

        if command != Command::Quit && !self.transaction.context.is_online() {
            return Some(unavailable());
        }

        self.state = self.state.transition(command, &mut self.transaction);
        self.transaction.response.take()
    }

    fn finish(&mut self) -> Reply {
        let tx = &mut self.transaction;
        let size = tx.body.len();

        if let Some(sender) = tx.sender.take() {
            let delivery = PendingDelivery::new(
                sender,
                std::mem::take(&mut tx.recipients),
                std::mem::take(&mut tx.body),
                tx.helo.clone().unwrap_or_default(),
                tx.peer,
            );
            let id = tx.context.queue().enqueue(delivery);
            internal!(level = INFO, "Queued message {id} ({size} bytes)");
        }

        tx.reset();
        self.state = State::From;
        Reply::new(
            Status::Ok,
            format!("{size} bytes received. Message accepted"),
        )
    }
}

fn unavailable() -> Reply {
    Reply::new(Status::Unavailable, "Service not available")
}
