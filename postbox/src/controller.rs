use std::{
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use postbox_common::{
    Signal, address::Classifier, controller::Controller, internal, listener::Listener, logging,
    traits::protocol::Protocol,
};
use postbox_control::ControlServer;
use postbox_delivery::DeliveryProcessor;
use postbox_pop3::Pop3;
use postbox_smtp::Smtp;
use postbox_store::ServerContext;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{
    config::{StoreConfig, resolve_hostname},
    control_handler::PostboxControlHandler,
};

pub const DEFAULT_POP3_SOCKET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2110);
pub const DEFAULT_SMTP_SOCKET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2025);

/// The daemon configuration document.
#[derive(Default, Deserialize)]
pub struct Postbox {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    pop3: Controller<Pop3>,
    #[serde(default)]
    smtp: Controller<Smtp>,
    #[serde(default)]
    delivery: DeliveryProcessor,
    #[serde(default)]
    store: StoreConfig,
    /// Unix socket for `postboxctl`; no admin interface without one
    #[serde(default)]
    control: Option<PathBuf>,
}

/// Everything [`Postbox::build`] wired together, ready to serve.
pub struct Daemon {
    context: Arc<ServerContext>,
    pop3: Controller<Pop3>,
    smtp: Controller<Smtp>,
    delivery: Arc<DeliveryProcessor>,
    control: Option<ControlServer>,
}

#[tracing::instrument(level = tracing::Level::TRACE)]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    };

    Ok(())
}

fn sockets<Proto: Protocol>(controller: &Controller<Proto>) -> String {
    controller
        .listeners()
        .iter()
        .map(|listener: &Listener<Proto>| listener.socket().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Postbox {
    /// Run the daemon until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be opened, a listener cannot be configured
    /// or bound, or the control socket cannot be created.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let daemon = self.build().await?;
        daemon.serve(shutdown()).await
    }

    /// Open the store and wire up every service without starting any.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn build(self) -> anyhow::Result<Daemon> {
        let hostname = resolve_hostname(self.hostname);
        let classifier = Classifier::new(hostname, &self.delivery.network_pattern)?;
        let mailboxes = self.store.open().await?;

        let context = Arc::new(ServerContext::new(classifier, mailboxes));
        internal!(level = INFO, "Mail exchange for {}", context.hostname());

        let mut pop3 = self
            .pop3
            .or_listen_on(DEFAULT_POP3_SOCKET)
            .map_args(|args| args.with_context(Arc::clone(&context)));
        pop3.init()?;

        let mut smtp = self
            .smtp
            .or_listen_on(DEFAULT_SMTP_SOCKET)
            .map_args(|args| args.with_context(Arc::clone(&context)));
        smtp.init()?;

        let mut delivery = self.delivery;
        delivery.init(Arc::clone(&context));
        let delivery = Arc::new(delivery);

        let control = self.control.map(|path| {
            let handler = PostboxControlHandler::new(
                Arc::clone(&context),
                Arc::clone(&delivery),
                sockets(&pop3),
                sockets(&smtp),
            );
            ControlServer::new(path, Arc::new(handler))
        });

        Ok(Daemon {
            context,
            pop3,
            smtp,
            delivery,
            control,
        })
    }
}

impl Daemon {
    #[must_use]
    pub const fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    #[must_use]
    pub const fn delivery(&self) -> &Arc<DeliveryProcessor> {
        &self.delivery
    }

    /// Serve until `stop` resolves, then broadcast [`Signal::Shutdown`] and
    /// wait for every service to wind down.
    ///
    /// A service failing first (a listener that cannot bind, say) ends the
    /// daemon with its error.
    pub async fn serve(self, stop: impl Future<Output = anyhow::Result<()>>) -> anyhow::Result<()> {
        let Self {
            pop3,
            smtp,
            delivery,
            control,
            ..
        } = self;
        let (sender, _) = broadcast::channel(64);

        let pop3 = pop3.control(sender.subscribe());
        let smtp = smtp.control(sender.subscribe());
        let delivery = delivery.serve(sender.subscribe());
        let control = {
            let signal = sender.subscribe();
            async move {
                match control {
                    Some(server) => server.serve(signal).await,
                    None => Ok(()),
                }
            }
        };

        let services = async {
            tokio::try_join!(
                async { pop3.await.map_err(anyhow::Error::from) },
                async { smtp.await.map_err(anyhow::Error::from) },
                async { delivery.await.map_err(anyhow::Error::from) },
                async { control.await.map_err(anyhow::Error::from) },
            )
            .map(|_| ())
        };
        tokio::pin!(services);

        internal!("Controller running");

        tokio::select! {
            r = &mut services => {
                internal!(level = INFO, "Services stopped");
                return r;
            }
            r = stop => r?,
        }

        internal!(level = INFO, "Shutting down...");
        let _ = sender.send(Signal::Shutdown);

        services.await
    }
}
