//! Endpoint - Badged request/response channel
//!
//! Endpoints carry synchronous calls across protection domains. The owner
//! mints badged capabilities for its clients; a client `call` blocks until
//! the server replies, and the server sees the badge of the capability that
//! was used.
//!
//! ## Flow
//!
//! ```text
//! EndpointCap::call(msg)            EndpointServer::recv()
//!   └─> queue (badge, msg, reply) ──> Call { badge, msg }
//!   └─> block on reply <──────────── Call::reply(msg)
//! ```

use crate::cspace::Badge;
use crate::message::Message;
use crate::{PlatformError, Result};
use crossbeam::channel::{self, Receiver, Sender};

struct Envelope<C> {
    badge: Badge,
    msg: Message<C>,
    reply: Sender<Message<C>>,
}

/// Endpoint object, held by its owner to mint client capabilities
pub struct Endpoint<C> {
    tx: Sender<Envelope<C>>,
    rx: Receiver<Envelope<C>>,
}

impl<C: Send> Endpoint<C> {
    /// Create a new endpoint
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// Mint a client capability carrying `badge`
    pub fn mint(&self, badge: Badge) -> EndpointCap<C> {
        EndpointCap {
            tx: self.tx.clone(),
            badge,
        }
    }

    /// Receiving side, handed to the server thread
    ///
    /// The server's `recv` fails with `EndpointClosed` once this endpoint
    /// and every minted capability have been dropped.
    pub fn server(&self) -> EndpointServer<C> {
        EndpointServer {
            rx: self.rx.clone(),
        }
    }
}

impl<C: Send> Default for Endpoint<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Client capability to an endpoint
pub struct EndpointCap<C> {
    tx: Sender<Envelope<C>>,
    badge: Badge,
}

impl<C: Send> EndpointCap<C> {
    /// Badge the server will observe for calls through this capability
    #[inline]
    pub fn badge(&self) -> Badge {
        self.badge
    }

    /// Send `msg` and block until the server replies
    ///
    /// # Errors
    /// - `EndpointClosed` if the server side no longer exists
    /// - `CallerAbandoned` if the server dropped the call without replying
    pub fn call(&self, msg: Message<C>) -> Result<Message<C>> {
        let (reply, reply_rx) = channel::bounded(1);
        self.tx
            .send(Envelope {
                badge: self.badge,
                msg,
                reply,
            })
            .map_err(|_| PlatformError::EndpointClosed)?;

        reply_rx.recv().map_err(|_| PlatformError::CallerAbandoned)
    }

    /// Derive a capability to the same endpoint with a different badge
    pub fn mint(&self, badge: Badge) -> Self {
        Self {
            tx: self.tx.clone(),
            badge,
        }
    }
}

impl<C> Clone for EndpointCap<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            badge: self.badge,
        }
    }
}

/// Receiving side of an endpoint
pub struct EndpointServer<C> {
    rx: Receiver<Envelope<C>>,
}

impl<C: Send> EndpointServer<C> {
    /// Block until the next call arrives
    pub fn recv(&self) -> Result<Call<C>> {
        let envelope = self.rx.recv().map_err(|_| PlatformError::EndpointClosed)?;
        Ok(Call {
            badge: envelope.badge,
            msg: envelope.msg,
            reply: envelope.reply,
        })
    }
}

/// An inbound call awaiting its reply
pub struct Call<C> {
    badge: Badge,
    msg: Message<C>,
    reply: Sender<Message<C>>,
}

impl<C: Send> Call<C> {
    /// Badge of the capability the caller used
    #[inline]
    pub fn badge(&self) -> Badge {
        self.badge
    }

    /// Request message
    pub fn message(&self) -> &Message<C> {
        &self.msg
    }

    /// Request message (mutable, e.g. to take the attached capability)
    pub fn message_mut(&mut self) -> &mut Message<C> {
        &mut self.msg
    }

    /// Reply to the caller, consuming the call
    ///
    /// # Errors
    /// Returns `CallerAbandoned` if the caller is gone
    pub fn reply(self, msg: Message<C>) -> Result<()> {
        self.reply
            .send(msg)
            .map_err(|_| PlatformError::CallerAbandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_call_reply_round_trip() {
        let endpoint: Endpoint<()> = Endpoint::new();
        let server = endpoint.server();
        let client = endpoint.mint(666);

        let handle = thread::spawn(move || {
            let call = server.recv().unwrap();
            let badge = call.badge();
            let value = call.message().word(0).unwrap();
            call.reply(Message::new(0, &[value * 2, badge as usize]).unwrap())
                .unwrap();
        });

        let reply = client.call(Message::new(1, &[21]).unwrap()).unwrap();
        assert_eq!(reply.words(), &[42, 666]);
        handle.join().unwrap();
    }

    #[test]
    fn test_cap_transfer() {
        let endpoint: Endpoint<&'static str> = Endpoint::new();
        let server = endpoint.server();
        let client = endpoint.mint(1);

        let handle = thread::spawn(move || {
            let mut call = server.recv().unwrap();
            let cap = call.message_mut().take_cap();
            call.reply(Message::new(0, &[]).unwrap()).unwrap();
            cap
        });

        client
            .call(Message::new(0, &[]).unwrap().with_cap("wake"))
            .unwrap();
        assert_eq!(handle.join().unwrap(), Some("wake"));
    }

    #[test]
    fn test_dropped_call_reports_abandoned() {
        let endpoint: Endpoint<()> = Endpoint::new();
        let server = endpoint.server();
        let client = endpoint.mint(0);

        let handle = thread::spawn(move || {
            let call = server.recv().unwrap();
            drop(call);
        });

        let result = client.call(Message::new(0, &[]).unwrap());
        assert_eq!(result, Err(PlatformError::CallerAbandoned));
        handle.join().unwrap();
    }

    #[test]
    fn test_server_sees_closed_endpoint() {
        let endpoint: Endpoint<()> = Endpoint::new();
        let server = endpoint.server();
        let client = endpoint.mint(0);
        drop(endpoint);
        drop(client);
        assert!(matches!(server.recv(), Err(PlatformError::EndpointClosed)));
    }

    #[test]
    fn test_remint_changes_badge() {
        let endpoint: Endpoint<()> = Endpoint::new();
        let client = endpoint.mint(1);
        assert_eq!(client.mint(2).badge(), 2);
        assert_eq!(client.badge(), 1);
    }
}
