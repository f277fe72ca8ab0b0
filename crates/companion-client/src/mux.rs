//! Pending-request bookkeeping for the protocol multiplexer.
//!
//! Outbound requests park a one-shot resolver here; the transport read loop
//! completes resolvers as frames arrive. Auth (handshake) responses are
//! matched by frame type, OPACK responses by the `_x` transaction id.

use companion_core::error::{Error, ProtocolError, Result};
use companion_core::FrameType;
use companion_opack::Value;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Transaction id generator: monotonically increasing from a random start.
pub struct XidGenerator(AtomicU32);

impl XidGenerator {
    pub fn new() -> Self {
        Self(AtomicU32::new(rand::thread_rng().gen()))
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for XidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Table of in-flight requests awaiting a matching inbound frame.
#[derive(Default)]
pub struct PendingMap {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    auth: HashMap<FrameType, oneshot::Sender<Result<Vec<u8>>>>,
    opack: HashMap<u32, oneshot::Sender<Result<Value>>>,
    stopped: bool,
}

impl PendingMap {
    /// Register a waiter for an auth response frame.
    ///
    /// The handshake is strictly serial; a second waiter on the same frame
    /// type means two handshakes were interleaved, which is an error.
    pub fn register_auth(&self, key: FrameType) -> Result<oneshot::Receiver<Result<Vec<u8>>>> {
        let mut inner = self.inner.lock().expect("pending map poisoned");
        if inner.stopped {
            return Err(ProtocolError::Stopped.into());
        }
        if inner.auth.contains_key(&key) {
            return Err(ProtocolError::HandshakeInFlight.into());
        }
        let (tx, rx) = oneshot::channel();
        inner.auth.insert(key, tx);
        Ok(rx)
    }

    /// Register a waiter for an OPACK response by transaction id.
    pub fn register_xid(&self, xid: u32) -> Result<oneshot::Receiver<Result<Value>>> {
        let mut inner = self.inner.lock().expect("pending map poisoned");
        if inner.stopped {
            return Err(ProtocolError::Stopped.into());
        }
        let (tx, rx) = oneshot::channel();
        inner.opack.insert(xid, tx);
        Ok(rx)
    }

    /// Complete the waiter for an auth frame. Returns false if none waited.
    pub fn resolve_auth(&self, key: FrameType, payload: Result<Vec<u8>>) -> bool {
        let sender = self
            .inner
            .lock()
            .expect("pending map poisoned")
            .auth
            .remove(&key);
        match sender {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Complete the waiter for a transaction id. Returns false if none waited
    /// (a late response after cancellation is dropped silently).
    pub fn resolve_xid(&self, xid: u32, message: Result<Value>) -> bool {
        let sender = self
            .inner
            .lock()
            .expect("pending map poisoned")
            .opack
            .remove(&xid);
        match sender {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for a transaction id (timeout or caller cancellation).
    pub fn remove_xid(&self, xid: u32) {
        self.inner
            .lock()
            .expect("pending map poisoned")
            .opack
            .remove(&xid);
    }

    /// Drop the waiter for an auth frame type.
    pub fn remove_auth(&self, key: FrameType) {
        self.inner
            .lock()
            .expect("pending map poisoned")
            .auth
            .remove(&key);
    }

    /// Fail every in-flight request and refuse new registrations.
    ///
    /// Called when the transport closes or hits a fatal error.
    pub fn fail_all(&self) {
        let mut inner = self.inner.lock().expect("pending map poisoned");
        inner.stopped = true;
        for (_, tx) in inner.auth.drain() {
            let _ = tx.send(Err(Error::Protocol(ProtocolError::Stopped)));
        }
        for (_, tx) in inner.opack.drain() {
            let _ = tx.send(Err(Error::Protocol(ProtocolError::Stopped)));
        }
    }

    /// True once the transport has stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().expect("pending map poisoned").stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auth_register_resolve() {
        let map = PendingMap::default();
        let rx = map.register_auth(FrameType::PairSetupNext).unwrap();
        assert!(map.resolve_auth(FrameType::PairSetupNext, Ok(vec![1, 2, 3])));
        assert_eq!(rx.await.unwrap().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn overlapping_handshakes_are_rejected() {
        let map = PendingMap::default();
        let _rx = map.register_auth(FrameType::PairSetupNext).unwrap();
        assert!(matches!(
            map.register_auth(FrameType::PairSetupNext),
            Err(Error::Protocol(ProtocolError::HandshakeInFlight))
        ));
        // A different handshake type is its own slot.
        assert!(map.register_auth(FrameType::PairVerifyNext).is_ok());
    }

    #[tokio::test]
    async fn xid_register_resolve() {
        let map = PendingMap::default();
        let rx = map.register_xid(7).unwrap();
        assert!(map.resolve_xid(7, Ok(Value::Null)));
        assert_eq!(rx.await.unwrap().unwrap(), Value::Null);
    }

    #[test]
    fn unknown_xid_is_dropped_silently() {
        let map = PendingMap::default();
        assert!(!map.resolve_xid(99, Ok(Value::Null)));
    }

    #[test]
    fn removed_xid_no_longer_resolves() {
        let map = PendingMap::default();
        let _rx = map.register_xid(7).unwrap();
        map.remove_xid(7);
        assert!(!map.resolve_xid(7, Ok(Value::Null)));
    }

    #[tokio::test]
    async fn fail_all_errors_every_waiter_and_stops() {
        let map = PendingMap::default();
        let auth_rx = map.register_auth(FrameType::PairVerifyNext).unwrap();
        let xid_rx = map.register_xid(1).unwrap();

        map.fail_all();

        assert!(matches!(
            auth_rx.await.unwrap(),
            Err(Error::Protocol(ProtocolError::Stopped))
        ));
        assert!(matches!(
            xid_rx.await.unwrap(),
            Err(Error::Protocol(ProtocolError::Stopped))
        ));
        assert!(map.is_stopped());
        assert!(map.register_xid(2).is_err());
    }

    #[test]
    fn xid_generator_is_monotonic() {
        let gen = XidGenerator::new();
        let first = gen.next();
        let second = gen.next();
        assert_eq!(second, first.wrapping_add(1));
    }
}
