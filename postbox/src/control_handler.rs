//! Answers administrative requests arriving on the control socket.

use std::sync::Arc;

use async_trait::async_trait;
use postbox_common::internal;
use postbox_control::{
    CommandHandler, ControlError, DrainSummary, MessageSummary, QueueCommand, Request,
    RequestCommand, Response, ResponseData, SystemCommand, SystemInfo, UserCommand, UserDetails,
    UserSummary,
};
use postbox_delivery::{DeliveryProcessor, DrainReport};
use postbox_store::{Mailbox, MarkState, ServerContext, StoreError};

/// Handler for control commands
pub struct PostboxControlHandler {
    context: Arc<ServerContext>,
    delivery: Arc<DeliveryProcessor>,
    pop3_socket: String,
    smtp_socket: String,
}

impl PostboxControlHandler {
    #[must_use]
    pub fn new(
        context: Arc<ServerContext>,
        delivery: Arc<DeliveryProcessor>,
        pop3_socket: impl Into<String>,
        smtp_socket: impl Into<String>,
    ) -> Self {
        Self {
            context,
            delivery,
            pop3_socket: pop3_socket.into(),
            smtp_socket: smtp_socket.into(),
        }
    }

    fn system(&self, command: SystemCommand) -> Response {
        match command {
            SystemCommand::Ping => Response::data(ResponseData::Message("pong".to_string())),
            SystemCommand::Info => Response::data(ResponseData::SystemInfo(self.info())),
            SystemCommand::Online(Some(online)) => {
                let was = self.context.set_online(online);
                if was != online {
                    internal!(
                        level = INFO,
                        "Server is now {}",
                        if online { "online" } else { "offline" }
                    );
                }
                Response::data(ResponseData::Online(online))
            }
            SystemCommand::Online(None) => {
                Response::data(ResponseData::Online(self.context.is_online()))
            }
        }
    }

    fn info(&self) -> SystemInfo {
        SystemInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: self.context.hostname().to_string(),
            online: self.context.is_online(),
            pop3_connections: self.context.pop3_connections().count(),
            smtp_connections: self.context.smtp_connections().count(),
            pop3_socket: self.pop3_socket.clone(),
            smtp_socket: self.smtp_socket.clone(),
            queue_length: self.context.queue().len(),
            drain_interval_ms: self.delivery.interval_ms,
            network_pattern: self.context.classifier().network_pattern().to_string(),
            relay_host: self.delivery.relay_host.clone(),
            relay_port: self.delivery.relay_port,
        }
    }

    async fn queue(&self, command: QueueCommand) -> postbox_control::Result<Response> {
        match command {
            QueueCommand::Length => Ok(Response::data(ResponseData::QueueLength(
                self.context.queue().len(),
            ))),
            QueueCommand::Flush => {
                let report = self
                    .delivery
                    .drain()
                    .await
                    .map_err(|e| ControlError::ServerError(format!("Drain failed: {e}")))?;
                internal!(level = INFO, "Flush requested: {report}");
                Ok(Response::data(ResponseData::Drain(summary(report))))
            }
        }
    }

    async fn user(&self, command: UserCommand) -> postbox_control::Result<Response> {
        let store = self.context.mailboxes();

        match command {
            UserCommand::List => {
                let users = store
                    .users()
                    .iter()
                    .map(|mailbox| UserSummary {
                        name: mailbox.name().to_string(),
                        messages: mailbox.message_count(),
                        locked: mailbox.is_locked(),
                    })
                    .collect();
                Ok(Response::data(ResponseData::Users(users)))
            }
            UserCommand::Show(name) => {
                let mailbox = store.find_user(&name).map_err(server_error)?;
                Ok(Response::data(ResponseData::User(details(&mailbox))))
            }
            UserCommand::Add { name, password } => {
                let mailbox = store.add_user(&name, &password).map_err(server_error)?;
                store.persist().await.map_err(server_error)?;
                internal!(level = INFO, "Added user {}", mailbox.name());
                Ok(Response::data(ResponseData::Message(format!(
                    "Added user {}",
                    mailbox.name()
                ))))
            }
            UserCommand::Reset(name) => {
                let mailbox = store.find_user(&name).map_err(server_error)?;
                let message = if mailbox.is_locked() {
                    mailbox.release_owner();
                    format!("Released {}", mailbox.name())
                } else {
                    format!("{} was not in use", mailbox.name())
                };
                Ok(Response::data(ResponseData::Message(message)))
            }
            UserCommand::Retrieve { name, message } => {
                let mailbox = store.find_user(&name).map_err(server_error)?;
                let index = message
                    .checked_sub(1)
                    .ok_or_else(|| server_error(StoreError::NoSuchMessage(message)))?;
                let stored = mailbox.message(index).map_err(|_| {
                    ControlError::ServerError(format!("No such message: {message}"))
                })?;
                Ok(Response::data(ResponseData::Message(stored.text())))
            }
        }
    }
}

#[async_trait]
impl CommandHandler for PostboxControlHandler {
    async fn handle_request(&self, request: Request) -> postbox_control::Result<Response> {
        match request.command {
            RequestCommand::System(command) => Ok(self.system(command)),
            RequestCommand::Queue(command) => self.queue(command).await,
            RequestCommand::User(command) => self.user(command).await,
        }
    }
}

fn server_error(error: StoreError) -> ControlError {
    ControlError::ServerError(error.to_string())
}

const fn summary(report: DrainReport) -> DrainSummary {
    DrainSummary {
        attempted: report.attempted,
        delivered: report.delivered,
        removed: report.removed,
        skipped: report.skipped,
    }
}

fn details(mailbox: &Mailbox) -> UserDetails {
    let messages = mailbox
        .sizes()
        .into_iter()
        .enumerate()
        .map(|(index, size)| MessageSummary {
            size,
            marked: matches!(mailbox.message_state(index), Ok(MarkState::Marked)),
        })
        .collect();

    UserDetails {
        name: mailbox.name().to_string(),
        locked: mailbox.is_locked(),
        messages,
    }
}
