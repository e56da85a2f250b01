//! Minimal SMTP peer for relay tests.
//!
//! Accepts any number of connections, answers each command with the
//! configured reply and records what it received.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Helo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Message(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct Replies {
    greeting: String,
    rcpt: String,
    data_end: String,
}

impl Default for Replies {
    fn default() -> Self {
        Self {
            greeting: "220 mock.lan ready".to_string(),
            rcpt: "250 Recipient ok".to_string(),
            data_end: "250 Message accepted".to_string(),
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
    task: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            replies: Replies::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn received(&self) -> Vec<Received> {
        self.received.lock().await.clone()
    }

    async fn handle_client(
        stream: TcpStream,
        replies: Arc<Replies>,
        received: Arc<Mutex<Vec<Received>>>,
    ) -> std::io::Result<()> {
        let mut stream = BufReader::new(stream);
        let mut line = String::new();

        stream
            .write_all(format!("{}\r\n", replies.greeting).as_bytes())
            .await?;

        loop {
            line.clear();
            if stream.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let text = line.trim_end().to_string();
            let (verb, rest) = text.split_once(' ').unwrap_or((text.as_str(), ""));

            let (entry, reply) = match verb.to_uppercase().as_str() {
                "HELO" => (Received::Helo(rest.to_string()), "250 mock.lan Hello".to_string()),
                "MAIL" => (Received::MailFrom(rest.to_string()), "250 Sender ok".to_string()),
                "RCPT" => (Received::RcptTo(rest.to_string()), replies.rcpt.clone()),
                "DATA" => (Received::Data, "354 Go ahead".to_string()),
                "QUIT" => (Received::Quit, "221 Bye".to_string()),
                _ => (Received::Other(text.clone()), "500 Unknown command".to_string()),
            };

            let data = entry == Received::Data;
            let quit = entry == Received::Quit;
            received.lock().await.push(entry);
            stream.write_all(format!("{reply}\r\n").as_bytes()).await?;

            if quit {
                return Ok(());
            }

            if data {
                let mut message = String::new();
                loop {
                    line.clear();
                    if stream.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line.trim_end() == "." {
                        break;
                    }
                    message.push_str(&line);
                }

                received.lock().await.push(Received::Message(message));
                stream
                    .write_all(format!("{}\r\n", replies.data_end).as_bytes())
                    .await?;
            }
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct MockSmtpServerBuilder {
    replies: Replies,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_rcpt_response(mut self, reply: impl Into<String>) -> Self {
        self.replies.rcpt = reply.into();
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, reply: impl Into<String>) -> Self {
        self.replies.data_end = reply.into();
        self
    }

    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let replies = Arc::new(self.replies);
        let received = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let received = Arc::clone(&received);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(Self::client(stream, Arc::clone(&replies), Arc::clone(&received)));
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            received,
            task,
        })
    }

    async fn client(stream: TcpStream, replies: Arc<Replies>, received: Arc<Mutex<Vec<Received>>>) {
        if let Err(e) = MockSmtpServer::handle_client(stream, replies, received).await {
            eprintln!("mock client error: {e}");
        }
    }
}
