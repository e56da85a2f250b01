#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Waiting for `HELO`.
    #[default]
    Helo,
    /// Waiting for `MAIL FROM`.
    From,
    /// Collecting recipients.
    To,
    /// Reading the message body.
    Data,
    End,
}
