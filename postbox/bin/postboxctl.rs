//! Command-line utility for administering a running postbox daemon
//!
//! Every command is one request over the daemon's control socket:
//! - System status, and taking the server on or offline
//! - Queue length, and forcing a drain pass
//! - Listing, creating and inspecting users

use clap::{Parser, Subcommand, ValueEnum};
use postbox_control::{
    ControlClient, DEFAULT_CONTROL_SOCKET, QueueCommand, Request, RequestCommand, ResponseData,
    ResponsePayload, SystemCommand, UserCommand,
};

/// Command-line utility for administering postbox
#[derive(Parser, Debug)]
#[command(name = "postboxctl")]
#[command(about = "Manage a running postbox daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Server status and availability
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
    /// Pending deliveries
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Mailbox accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check the daemon is responding
    Ping,
    /// Show configuration and live counters
    Info,
    /// Show or change whether sessions are accepted
    Online {
        #[arg(value_enum)]
        state: Option<Toggle>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// Number of pending deliveries
    Length,
    /// Run a drain pass now
    Flush,
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// List every user with their message count
    List,
    /// Show one user's mailbox
    Show { name: String },
    /// Create a user
    Add { name: String, password: String },
    /// Release a user's mailbox lock left behind by a dead session
    Reset { name: String },
    /// Print one message, numbered from 1
    Retr { name: String, message: usize },
}

impl From<Commands> for RequestCommand {
    fn from(command: Commands) -> Self {
        match command {
            Commands::System { action } => Self::System(match action {
                SystemAction::Ping => SystemCommand::Ping,
                SystemAction::Info => SystemCommand::Info,
                SystemAction::Online { state } => {
                    SystemCommand::Online(state.map(|state| matches!(state, Toggle::On)))
                }
            }),
            Commands::Queue { action } => Self::Queue(match action {
                QueueAction::Length => QueueCommand::Length,
                QueueAction::Flush => QueueCommand::Flush,
            }),
            Commands::User { action } => Self::User(match action {
                UserAction::List => UserCommand::List,
                UserAction::Show { name } => UserCommand::Show(name),
                UserAction::Add { name, password } => UserCommand::Add { name, password },
                UserAction::Reset { name } => UserCommand::Reset(name),
                UserAction::Retr { name, message } => UserCommand::Retrieve { name, message },
            }),
        }
    }
}

fn check_control_socket(socket_path: &str) -> anyhow::Result<ControlClient> {
    let client = ControlClient::new(socket_path);

    if let Err(e) = client.check_socket_exists() {
        anyhow::bail!(
            "Cannot connect to the postbox control socket at {socket_path}.\n\
             Error: {e}\n\
             \n\
             Is postbox running?\n\
             You can configure the socket path with --control-socket or in postbox.config.ron"
        );
    }

    Ok(client)
}

fn print(data: ResponseData) {
    match data {
        ResponseData::SystemInfo(info) => println!("{info}"),
        ResponseData::Online(online) => {
            println!("Server is {}", if online { "online" } else { "offline" });
        }
        ResponseData::QueueLength(length) => println!("{length} pending"),
        ResponseData::Drain(summary) => println!("{summary}"),
        ResponseData::Users(users) => {
            if users.is_empty() {
                println!("No users");
            }
            for user in users {
                println!("{user}");
            }
        }
        ResponseData::User(details) => println!("{details}"),
        ResponseData::Message(message) => println!("{message}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = check_control_socket(&cli.control_socket)?;

    let response = client
        .send_request(Request::new(cli.command.into()))
        .await?;

    match response.payload {
        ResponsePayload::Ok => println!("OK"),
        ResponsePayload::Data(data) => print(*data),
        ResponsePayload::Error(error) => anyhow::bail!(error),
    }

    Ok(())
}
