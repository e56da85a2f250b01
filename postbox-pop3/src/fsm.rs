use std::sync::Arc;

use postbox_common::internal;
use postbox_store::{Mailbox, MailboxStore, MarkState, ServerContext};

use crate::{State, command::Command, reply::Reply};

/// Protocol logic for one mailbox-access connection, independent of I/O.
///
/// Dropping the session while in `Transaction` discards every deletion mark
/// and releases the mailbox owner lock.
#[derive(Debug)]
pub struct AccessSession {
    context: Arc<ServerContext>,
    banner: Arc<str>,
    state: State,
}

impl AccessSession {
    #[must_use]
    pub fn new(context: Arc<ServerContext>, banner: Arc<str>) -> Self {
        Self {
            context,
            banner,
            state: State::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, State::End)
    }

    #[must_use]
    pub fn greeting(&self) -> Reply {
        if self.context.is_online() {
            Reply::ok(format!("{} ready on {}", self.banner, self.context.hostname()))
        } else {
            unavailable()
        }
    }

    pub async fn handle(&mut self, line: &str) -> Reply {
        let command = Command::from(line);

        if self.is_finished() {
            return Reply::err("session has ended");
        }

        if command != Command::Quit && !self.context.is_online() {
            return unavailable();
        }

        if command == Command::Quit {
            return self.quit().await;
        }

        let state = std::mem::take(&mut self.state);
        let (state, reply) = self.transition(state, command);
        self.state = state;
        reply
    }

    fn transition(&self, state: State, command: Command) -> (State, Reply) {
        match (state, command) {
            (State::AuthUser | State::AuthPass { .. }, Command::User(Some(user))) => {
                let reply = Reply::ok(format!("{user} selected"));
                (State::AuthPass { user }, reply)
            }
            (state @ (State::AuthUser | State::AuthPass { .. }), Command::User(None)) => {
                (state, Reply::err("USER requires arg"))
            }
            (state @ State::Transaction { .. }, Command::User(_)) => {
                (state, Reply::err("Not in AUTH State"))
            }

            (State::AuthPass { user }, Command::Pass(Some(password))) => {
                self.login(user, &password)
            }
            (state @ State::AuthPass { .. }, Command::Pass(None)) => {
                (state, Reply::err("PASS requires arg"))
            }
            (State::AuthUser, Command::Pass(_)) => (State::AuthUser, Reply::err("USER first")),
            (state @ State::Transaction { .. }, Command::Pass(_)) => {
                (state, Reply::err("Not in AUTH State"))
            }

            (State::Transaction { mailbox }, command) => {
                let reply = transaction(&mailbox, command);
                (State::Transaction { mailbox }, reply)
            }

            (state, Command::Unknown(_)) => (state, Reply::err("Command unrecognised")),
            (state, _) => (state, Reply::err("AUTH first")),
        }
    }

    fn login(&self, user: String, password: &str) -> (State, Reply) {
        let mailbox = match self.context.mailboxes().find_user(&user) {
            Ok(mailbox) if mailbox.check_password(password) => mailbox,
            _ => {
                internal!(level = INFO, "Login failure for {user}");
                let reply = Reply::err(format!("{user} login failure"));
                return (State::AuthPass { user }, reply);
            }
        };

        if !mailbox.try_lock_owner() {
            return (
                State::AuthUser,
                Reply::err(format!("{user} already logged in; try again later")),
            );
        }

        internal!(level = INFO, "{user} logged in");
        (
            State::Transaction { mailbox },
            Reply::ok(format!("{user} login success")),
        )
    }

    async fn quit(&mut self) -> Reply {
        let state = std::mem::replace(&mut self.state, State::End);
        let hostname = self.context.hostname();

        let State::Transaction { mailbox } = state else {
            return Reply::ok(format!("{hostname} signing off"));
        };

        let removed = mailbox.commit_marked();
        mailbox.release_owner();

        if removed > 0
            && let Err(err) = self.context.mailboxes().persist().await
        {
            internal!(level = ERROR, "Failed to persist mailboxes: {err}");
        }

        internal!(level = INFO, "{} logged out, {removed} deleted", mailbox.name());
        Reply::ok(format!("{hostname} signing off ({removed} deleted)"))
    }
}

impl Drop for AccessSession {
    fn drop(&mut self) {
        if let State::Transaction { mailbox } = &self.state {
            internal!(
                level = DEBUG,
                "{} disconnected mid-transaction, discarding marks",
                mailbox.name()
            );
            mailbox.reset_marks();
            mailbox.release_owner();
        }
    }
}

fn unavailable() -> Reply {
    Reply::err("Service not available")
}

/// Resolve a one-based message number to an index.
fn position(mailbox: &Mailbox, arg: Option<&str>) -> Result<usize, Reply> {
    arg.and_then(|arg| arg.parse::<usize>().ok())
        .filter(|n| (1..=mailbox.message_count()).contains(n))
        .map(|n| n - 1)
        .ok_or_else(|| Reply::err("no such message"))
}

fn unmarked(mailbox: &Mailbox, arg: Option<&str>) -> Result<usize, Reply> {
    let index = position(mailbox, arg)?;
    match mailbox.message_state(index) {
        Ok(MarkState::Unmarked) => Ok(index),
        Ok(MarkState::Marked) => Err(Reply::err("message marked for deletion")),
        Err(_) => Err(Reply::err("no such message")),
    }
}

fn transaction(mailbox: &Mailbox, command: Command) -> Reply {
    let result = match command {
        Command::Stat => {
            let (count, size) = mailbox.unmarked_summary();
            Ok(Reply::ok(format!("{count} {size}")))
        }
        Command::List(None) => Ok(list(mailbox)),
        Command::List(Some(arg)) => unmarked(mailbox, Some(arg.as_str())).and_then(|index| {
            mailbox
                .message_size(index)
                .map(|size| Reply::ok(format!("{arg} {size}")))
                .map_err(|_| Reply::err("no such message"))
        }),
        Command::Retr(arg) => unmarked(mailbox, arg.as_deref()).and_then(|index| {
            mailbox
                .message(index)
                .map(|message| Reply::Listing {
                    status: format!("{} octets", message.size()),
                    body: message.text(),
                })
                .map_err(|_| Reply::err("no such message"))
        }),
        Command::Top(arg, lines) => top(mailbox, arg.as_deref(), lines.as_deref()),
        Command::Dele(arg) => dele(mailbox, arg.as_deref()),
        Command::Rset => {
            mailbox.reset_marks();
            Ok(Reply::ok(""))
        }
        Command::Noop => Ok(Reply::ok("")),
        Command::Unknown(_) => Ok(Reply::err("Command unrecognised")),
        Command::User(_) | Command::Pass(_) | Command::Quit => {
            Ok(Reply::err("Not in AUTH State"))
        }
    };

    result.unwrap_or_else(|reply| reply)
}

fn list(mailbox: &Mailbox) -> Reply {
    let sizes = mailbox.unmarked_sizes();
    let total: usize = sizes.iter().map(|(_, size)| size).sum();
    let body = sizes
        .iter()
        .map(|(index, size)| format!("{} {size}\n", index + 1))
        .collect();

    Reply::Listing {
        status: format!("{} messages ({total} octets)", sizes.len()),
        body,
    }
}

fn top(mailbox: &Mailbox, arg: Option<&str>, lines: Option<&str>) -> Result<Reply, Reply> {
    let index = unmarked(mailbox, arg)?;
    let count = lines
        .and_then(|lines| lines.parse::<usize>().ok())
        .ok_or_else(|| Reply::err("TOP requires a message number and line count"))?;
    let message = mailbox
        .message(index)
        .map_err(|_| Reply::err("no such message"))?;

    let body = message
        .body()
        .lines()
        .take_while(|line| *line != ".")
        .take(count)
        .fold(format!("{}\n\n", message.headers()), |mut text, line| {
            text.push_str(line);
            text.push('\n');
            text
        });

    Ok(Reply::Listing {
        status: format!("Header plus top {count} lines of body"),
        body,
    })
}

fn dele(mailbox: &Mailbox, arg: Option<&str>) -> Result<Reply, Reply> {
    let index = position(mailbox, arg)?;

    match mailbox.message_state(index) {
        Ok(MarkState::Marked) => Err(Reply::err("DELE already deleted")),
        Ok(MarkState::Unmarked) => mailbox
            .set_message_state(index, MarkState::Marked)
            .map(|()| Reply::ok(format!("DELE marked message {}", index + 1)))
            .map_err(|_| Reply::err("no such message")),
        Err(_) => Err(Reply::err("no such message")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use postbox_common::address::Classifier;
    use postbox_store::{MailboxStore, MemoryStore, ServerContext};
    use pretty_assertions::assert_eq;

    use super::*;

    fn context() -> Arc<ServerContext> {
        let store = MemoryStore::new();
        let alice = store.add_user("alice", "secret").unwrap();
        alice.append_message("Subject: one\n\nfirst body\n");
        alice.append_message("Subject: two\n\nsecond\nbody\n.\nafter dot\n");
        store.add_user("bob", "hunter").unwrap();

        Arc::new(ServerContext::new(
            Classifier::new("mail.example.org", r"\w+\.lan").unwrap(),
            Arc::new(store),
        ))
    }

    fn session(context: &Arc<ServerContext>) -> AccessSession {
        AccessSession::new(Arc::clone(context), Arc::from("POP3 server"))
    }

    async fn login(session: &mut AccessSession, user: &str, password: &str) -> Reply {
        assert!(session.handle(&format!("USER {user}")).await.is_ok());
        session.handle(&format!("PASS {password}")).await
    }

    fn size(text: &str) -> usize {
        text.len()
    }

    #[tokio::test]
    async fn greeting() {
        let context = context();
        let session = session(&context);
        assert_eq!(
            session.greeting(),
            Reply::ok("POP3 server ready on mail.example.org")
        );

        context.set_online(false);
        assert_eq!(session.greeting(), Reply::err("Service not available"));
    }

    #[tokio::test]
    async fn login_and_stat() {
        let context = context();
        let mut session = session(&context);

        let reply = login(&mut session, "alice", "secret").await;
        assert_eq!(reply, Reply::ok("alice login success"));
        assert_eq!(session.state().name(), "Transaction");

        let total = size("Subject: one\n\nfirst body\n")
            + size("Subject: two\n\nsecond\nbody\n.\nafter dot\n");
        assert_eq!(
            session.handle("STAT").await,
            Reply::ok(format!("2 {total}"))
        );
    }

    #[tokio::test]
    async fn failed_logins() {
        let context = context();
        let mut session = session(&context);

        assert_eq!(session.handle("USER").await, Reply::err("USER requires arg"));
        assert_eq!(session.handle("PASS x").await, Reply::err("USER first"));

        let reply = login(&mut session, "nobody", "x").await;
        assert_eq!(reply, Reply::err("nobody login failure"));
        assert_eq!(session.state().name(), "AuthPass");

        assert_eq!(session.handle("PASS").await, Reply::err("PASS requires arg"));
        assert_eq!(session.handle("STAT").await, Reply::err("AUTH first"));

        let mut session = self::session(&context);
        let reply = login(&mut session, "alice", "wrong").await;
        assert_eq!(reply, Reply::err("alice login failure"));
        assert_eq!(session.state().name(), "AuthPass");
    }

    #[tokio::test]
    async fn user_can_be_changed_after_failed_password() {
        let context = context();
        let mut session = session(&context);

        let reply = login(&mut session, "alice", "wrong").await;
        assert_eq!(reply, Reply::err("alice login failure"));

        assert_eq!(session.handle("USER").await, Reply::err("USER requires arg"));
        assert_eq!(session.state().name(), "AuthPass");
        assert_eq!(session.handle("USER bob").await, Reply::ok("bob selected"));
        assert_eq!(session.state().name(), "AuthPass");
        assert_eq!(
            session.handle("PASS hunter").await,
            Reply::ok("bob login success")
        );
        assert_eq!(session.state().name(), "Transaction");
        assert!(!context.mailboxes().find_user("alice").unwrap().is_locked());
    }

    #[tokio::test]
    async fn retr_returns_headers_blank_line_body() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;

        let reply = session.handle("RETR 1").await;
        assert_eq!(reply.body(), Some("Subject: one\n\nfirst body\n"));
        assert_eq!(reply.status(), format!("{} octets", size("Subject: one\n\nfirst body\n")));

        assert_eq!(session.handle("RETR 3").await, Reply::err("no such message"));
        assert_eq!(session.handle("RETR x").await, Reply::err("no such message"));
        assert_eq!(session.handle("RETR 0").await, Reply::err("no such message"));
    }

    #[tokio::test]
    async fn dele_is_idempotent_until_quit() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;

        assert_eq!(session.handle("DELE 1").await, Reply::ok("DELE marked message 1"));
        assert_eq!(session.handle("DELE 1").await, Reply::err("DELE already deleted"));
        assert_eq!(
            session.handle("RETR 1").await,
            Reply::err("message marked for deletion")
        );
        assert_eq!(
            session.handle("LIST 1").await,
            Reply::err("message marked for deletion")
        );

        let second = size("Subject: two\n\nsecond\nbody\n.\nafter dot\n");
        assert_eq!(session.handle("LIST 2").await, Reply::ok(format!("2 {second}")));

        let mailbox = context.mailboxes().find_user("alice").unwrap();
        assert_eq!(mailbox.message_count(), 2);

        let reply = session.handle("QUIT").await;
        assert!(reply.is_ok());
        assert!(session.is_finished());
        assert_eq!(mailbox.message_count(), 1);
        assert_eq!(mailbox.message_body(0).unwrap(), "second\nbody\n.\nafter dot\n");
        assert!(!mailbox.is_locked());
    }

    #[tokio::test]
    async fn rset_clears_marks() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;

        session.handle("DELE 1").await;
        session.handle("DELE 2").await;
        assert_eq!(session.handle("RSET").await, Reply::ok(""));
        session.handle("QUIT").await;

        let mailbox = context.mailboxes().find_user("alice").unwrap();
        assert_eq!(mailbox.message_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_rolls_back() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;
        session.handle("DELE 1").await;
        drop(session);

        let mailbox = context.mailboxes().find_user("alice").unwrap();
        assert_eq!(mailbox.message_count(), 2);
        assert_eq!(mailbox.message_state(0).unwrap(), MarkState::Unmarked);
        assert!(!mailbox.is_locked());
    }

    #[tokio::test]
    async fn second_login_rejected_while_first_active() {
        let context = context();
        let mut first = session(&context);
        let mut second = session(&context);

        login(&mut first, "alice", "secret").await;
        let reply = login(&mut second, "alice", "secret").await;
        assert_eq!(
            reply,
            Reply::err("alice already logged in; try again later")
        );
        assert_eq!(second.state().name(), "AuthUser");

        first.handle("QUIT").await;
        let reply = login(&mut second, "alice", "secret").await;
        assert_eq!(reply, Reply::ok("alice login success"));
    }

    #[tokio::test]
    async fn stat_skips_marked_until_reset() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;

        let first = size("Subject: one\n\nfirst body\n");
        let second = size("Subject: two\n\nsecond\nbody\n.\nafter dot\n");

        session.handle("DELE 1").await;
        assert_eq!(
            session.handle("STAT").await,
            Reply::ok(format!("1 {second}"))
        );

        session.handle("RSET").await;
        assert_eq!(
            session.handle("STAT").await,
            Reply::ok(format!("2 {}", first + second))
        );
    }

    #[tokio::test]
    async fn list_skips_marked_messages() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;
        assert!(matches!(session.handle("DELE 1").await, Reply::Ok(_)));

        let second = size("Subject: two\n\nsecond\nbody\n.\nafter dot\n");
        let reply = session.handle("LIST").await;

        assert_eq!(
            reply,
            Reply::Listing {
                status: format!("1 messages ({second} octets)"),
                body: format!("2 {second}\n"),
            }
        );
    }

    #[tokio::test]
    async fn top_stops_at_dot_line() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;

        let reply = session.handle("TOP 2 10").await;
        assert_eq!(reply.body(), Some("Subject: two\n\nsecond\nbody\n"));

        let reply = session.handle("TOP 2 1").await;
        assert_eq!(reply.body(), Some("Subject: two\n\nsecond\n"));

        assert!(!session.handle("TOP 2").await.is_ok());
    }

    #[tokio::test]
    async fn offline_allows_only_quit() {
        let context = context();
        let mut session = session(&context);
        login(&mut session, "alice", "secret").await;

        context.set_online(false);
        assert_eq!(session.handle("STAT").await, Reply::err("Service not available"));
        assert_eq!(session.handle("NOOP").await, Reply::err("Service not available"));
        assert!(session.handle("QUIT").await.is_ok());
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn unknown_and_out_of_state_commands() {
        let context = context();
        let mut session = session(&context);

        assert_eq!(session.handle("XYZZY").await, Reply::err("Command unrecognised"));
        assert_eq!(session.handle("LIST").await, Reply::err("AUTH first"));
        assert_eq!(session.state().name(), "AuthUser");

        login(&mut session, "bob", "hunter").await;
        assert_eq!(session.handle("USER bob").await, Reply::err("Not in AUTH State"));
        assert_eq!(session.handle("NOOP").await, Reply::ok(""));
        assert_eq!(session.handle("XYZZY").await, Reply::err("Command unrecognised"));
    }
}
