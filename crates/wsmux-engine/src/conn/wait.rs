//! Wait tokens correlating replies with blocked callers.
//!
//! Client tokens are `#<n>`, server tokens are `<n>`, so each side can tell
//! a reply to its own request from a request made by the peer.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;

use wsmux_core::Message;

pub(crate) struct Waits {
    is_client: bool,
    seq: AtomicU64,
    pending: DashMap<String, oneshot::Sender<Message>>,
}

impl Waits {
    pub(crate) fn new(is_client: bool) -> Self {
        Self {
            is_client,
            seq: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    fn next_token(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        if self.is_client {
            format!("#{n}")
        } else {
            n.to_string()
        }
    }

    /// True when `wait` was generated by this side.
    pub(crate) fn is_reply(&self, wait: &str) -> bool {
        !wait.is_empty() && wait.starts_with('#') == self.is_client
    }

    /// Register a waiter. The entry lives as long as the returned guard.
    pub(crate) fn register(&self) -> (Pending<'_>, oneshot::Receiver<Message>) {
        let token = self.next_token();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(token.clone(), tx);
        (Pending { waits: self, token }, rx)
    }

    /// Hand a reply to its waiter. Gives the message back when nobody
    /// waits for it.
    pub(crate) fn resolve(&self, msg: Message) -> Option<Message> {
        match self.pending.remove(&msg.wait) {
            Some((_, tx)) => tx.send(msg).err(),
            None => Some(msg),
        }
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub(crate) fn clear(&self) {
        self.pending.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }
}

pub(crate) struct Pending<'a> {
    waits: &'a Waits,
    token: String,
}

impl Pending<'_> {
    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.waits.pending.remove(&self.token);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn tokens_tell_sides_apart() {
        let client = Waits::new(true);
        let server = Waits::new(false);

        let (p, _rx) = client.register();
        assert!(p.token().starts_with('#'));
        assert!(client.is_reply(p.token()));
        assert!(!server.is_reply(p.token()));

        let (p, _rx) = server.register();
        assert!(server.is_reply(p.token()));
        assert!(!client.is_reply(p.token()));
        assert!(!server.is_reply(""));
    }

    #[tokio::test]
    async fn resolve_delivers_once_and_guard_cleans_up() {
        let waits = Waits::new(false);
        let (pending, rx) = waits.register();
        let mut reply = Message::new("default", "ping", "pong");
        reply.wait = pending.token().to_owned();

        assert!(waits.resolve(reply.clone()).is_none());
        assert_eq!(waits.resolve(reply.clone()), Some(reply));
        assert_eq!(rx.await.unwrap().body.as_ref(), b"pong");

        let (pending, _rx) = waits.register();
        assert_eq!(waits.len(), 1);
        drop(pending);
        assert_eq!(waits.len(), 0);
    }
}
