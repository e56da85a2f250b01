//! Text prepended to a message as it leaves the queue.

use postbox_common::address::Address;
use postbox_store::PendingDelivery;

/// The four-line `Received:` trace header for one recipient, CRLF
/// terminated.
#[must_use]
pub fn trace_header(delivery: &PendingDelivery, recipient: &Address, hostname: &str) -> String {
    format!(
        "Received: from {helo} ({host} [{ip}])\r\n by {hostname} (postbox)\r\n with SMTP id <{id}@{hostname}>\r\n for {recipient}; {date}\r\n",
        helo = delivery.helo_name,
        host = delivery.submitting_host,
        ip = delivery.submitting_address,
        id = delivery.id,
        recipient = recipient.parsed(),
        date = delivery.received_at.to_rfc2822(),
    )
}

/// Trace header followed by the body, as handed to a relay peer.
#[must_use]
pub fn relay_payload(delivery: &PendingDelivery, recipient: &Address, hostname: &str) -> String {
    let mut payload = trace_header(delivery, recipient, hostname);
    payload.push_str(&delivery.body);
    payload
}

/// A relay payload with `Return-Path` on top, as stored in a local mailbox.
#[must_use]
pub fn local_message(delivery: &PendingDelivery, recipient: &Address, hostname: &str) -> String {
    format!(
        "Return-Path: <{}>\r\n{}",
        delivery.sender.parsed(),
        relay_payload(delivery, recipient, hostname)
    )
}
