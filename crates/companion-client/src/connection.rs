//! Framed TCP connection with request multiplexing.
//!
//! One spawned task owns the read half and the decode buffer; it slices
//! complete frames out of the stream, decrypts them once session keys are
//! installed, and completes pending waiters or forwards events. Writers
//! serialize on the write half so AEAD counter order matches wire order.

use companion_core::error::{CodecError, Error, ProtocolError, Result};
use companion_core::frame::{decode_header, encode_header, AUTH_TAG_LEN, HEADER_LEN};
use companion_core::FrameType;
use companion_crypto::chacha::FrameCipher;
use companion_crypto::keys::SessionKeys;
use companion_opack::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::events::{CompanionEvent, EventReceiver, EventSender};
use crate::mux::{PendingMap, XidGenerator};

/// Default time to wait for a matching response frame.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Message types in the `_t` envelope field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Event = 1,
    Request = 2,
    Response = 3,
}

/// An established Companion connection.
pub struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    cipher: Arc<StdMutex<Option<FrameCipher>>>,
    pending: Arc<PendingMap>,
    xid: XidGenerator,
    request_timeout: Duration,
    events: StdMutex<Option<EventReceiver>>,
    read_task: JoinHandle<()>,
}

impl Connection {
    /// Connect to a device.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Connect with a custom per-request timeout.
    pub async fn connect_with_timeout(addr: SocketAddr, request_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        debug!(%addr, "connected");
        let (read_half, write_half) = stream.into_split();

        let cipher: Arc<StdMutex<Option<FrameCipher>>> = Arc::new(StdMutex::new(None));
        let pending = Arc::new(PendingMap::default());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let read_task = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&cipher),
            Arc::clone(&pending),
            event_tx,
        ));

        Ok(Self {
            writer: Mutex::new(write_half),
            cipher,
            pending,
            xid: XidGenerator::new(),
            request_timeout,
            events: StdMutex::new(Some(event_rx)),
            read_task,
        })
    }

    /// Install the data-channel keys derived by pair-verify.
    ///
    /// Every subsequent non-empty frame in either direction is
    /// authenticated-encrypted with the frame header as associated data.
    pub fn install_session_keys(&self, keys: SessionKeys) {
        let cipher = FrameCipher::new(*keys.tx_key.as_bytes(), *keys.rx_key.as_bytes());
        *self.cipher.lock().expect("cipher lock poisoned") = Some(cipher);
        debug!("session keys installed, channel is now encrypted");
    }

    /// True once session keys are installed.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.lock().expect("cipher lock poisoned").is_some()
    }

    /// Take the event receiver. Yields `None` after the first call.
    pub fn take_events(&self) -> Option<EventReceiver> {
        self.events.lock().expect("events lock poisoned").take()
    }

    /// Send a single frame, sealing it when the channel is keyed.
    pub async fn send_frame(&self, frame_type: FrameType, plaintext: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;

        // Seal under the writer lock: nonce counter order must match the
        // order frames hit the wire.
        let (header, body) = {
            let mut guard = self.cipher.lock().expect("cipher lock poisoned");
            match guard.as_mut() {
                Some(cipher) if !plaintext.is_empty() => {
                    let header = encode_header(frame_type, plaintext.len() + AUTH_TAG_LEN)?;
                    let sealed = cipher.seal(&header, plaintext)?;
                    (header, sealed)
                }
                _ => (encode_header(frame_type, plaintext.len())?, plaintext.to_vec()),
            }
        };

        writer.write_all(&header).await?;
        writer.write_all(&body).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Perform one handshake round trip.
    ///
    /// The pairing data is wrapped as `{_pd: <tlv>, ...extra}`, sent on
    /// `send_type`, and the `_pd` of the response (which arrives on the
    /// corresponding `*Next` frame type) is returned.
    pub async fn exchange_auth(
        &self,
        send_type: FrameType,
        pairing_data: Vec<u8>,
        extra: Vec<(&str, Value)>,
    ) -> Result<Vec<u8>> {
        let response_type = send_type
            .response_type()
            .ok_or(ProtocolError::UnexpectedFrame(send_type as u8))?;

        let mut entries: Vec<(String, Value)> =
            vec![("_pd".to_string(), Value::Bytes(pairing_data))];
        entries.extend(extra.into_iter().map(|(k, v)| (k.to_string(), v)));
        let payload = companion_opack::pack(&Value::Dict(entries))?;

        let receiver = self.pending.register_auth(response_type)?;

        if let Err(e) = self.send_frame(send_type, &payload).await {
            self.pending.remove_auth(response_type);
            return Err(e);
        }

        let response = match timeout(self.request_timeout, receiver).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(ProtocolError::Stopped.into()),
            Err(_) => {
                self.pending.remove_auth(response_type);
                return Err(Error::Timeout);
            }
        };

        let message = companion_opack::unpack(&response)?;
        message
            .get("_pd")
            .and_then(Value::as_bytes)
            .map(|b| b.to_vec())
            .ok_or_else(|| CodecError::MissingField("_pd").into())
    }

    /// Send a request and await the response with the same transaction id.
    ///
    /// Returns the full decoded response map; a `_em` field in the response
    /// is surfaced as [`ProtocolError::Response`].
    pub async fn request(&self, identifier: &str, content: Value) -> Result<Value> {
        let xid = self.xid.next();
        let envelope = Value::dict([
            ("_i", identifier.into()),
            ("_t", Value::Int(MessageType::Request as u64)),
            ("_c", content),
            ("_x", Value::Int(xid as u64)),
        ]);
        let payload = companion_opack::pack(&envelope)?;

        let receiver = self.pending.register_xid(xid)?;

        if let Err(e) = self.send_frame(FrameType::EncryptedOpack, &payload).await {
            self.pending.remove_xid(xid);
            return Err(e);
        }
        debug!(identifier, xid, "request sent");

        match timeout(self.request_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::Stopped.into()),
            Err(_) => {
                self.pending.remove_xid(xid);
                Err(Error::Timeout)
            }
        }
    }

    /// Send a fire-and-forget event message (no transaction id, no reply).
    pub async fn send_event(&self, identifier: &str, content: Value) -> Result<()> {
        let envelope = Value::dict([
            ("_i", identifier.into()),
            ("_t", Value::Int(MessageType::Event as u64)),
            ("_c", content),
        ]);
        let payload = companion_opack::pack(&envelope)?;
        self.send_frame(FrameType::EncryptedOpack, &payload).await
    }

    /// True while the read loop is alive.
    pub fn is_open(&self) -> bool {
        !self.pending.is_stopped()
    }

    /// Tear the connection down, failing any in-flight request.
    pub fn close(&self) {
        self.read_task.abort();
        self.pending.fail_all();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.read_task.abort();
        self.pending.fail_all();
    }
}

/// The transport read loop: accumulate, slice, decrypt, dispatch.
async fn read_loop(
    mut read_half: OwnedReadHalf,
    cipher: Arc<StdMutex<Option<FrameCipher>>>,
    pending: Arc<PendingMap>,
    events: EventSender,
) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    'outer: loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                debug!("connection closed by peer");
                break;
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!("read error: {e}");
                break;
            }
        }

        // Drain every complete frame; partial frames wait for more input.
        while buffer.len() >= HEADER_LEN {
            let header: [u8; HEADER_LEN] = buffer[..HEADER_LEN].try_into().expect("4-byte slice");
            let (raw_type, len) = decode_header(&header);
            if buffer.len() < HEADER_LEN + len {
                break;
            }
            let payload: Vec<u8> = buffer[HEADER_LEN..HEADER_LEN + len].to_vec();
            buffer.drain(..HEADER_LEN + len);

            let Some(frame_type) = FrameType::from_byte(raw_type) else {
                warn!("skipping frame with unknown type 0x{raw_type:02x}");
                continue;
            };

            let payload = if payload.is_empty() {
                payload
            } else {
                let mut guard = cipher.lock().expect("cipher lock poisoned");
                match guard.as_mut() {
                    Some(cipher) => match cipher.open(&header, &payload) {
                        Ok(plaintext) => plaintext,
                        Err(e) => {
                            // Counters are now desynchronized; the session
                            // cannot continue.
                            warn!("frame decryption failed, closing session: {e}");
                            break 'outer;
                        }
                    },
                    None => payload,
                }
            };

            dispatch(frame_type, payload, &pending, &events);
        }
    }

    pending.fail_all();
}

fn dispatch(frame_type: FrameType, payload: Vec<u8>, pending: &PendingMap, events: &EventSender) {
    match frame_type {
        FrameType::NoOp => {}
        t if t.is_auth() => {
            if !pending.resolve_auth(t, Ok(payload)) {
                warn!("unsolicited auth frame 0x{:02x}", t as u8);
            }
        }
        t if t.is_opack() => match companion_opack::unpack(&payload) {
            Ok(message) => dispatch_message(message, pending, events),
            Err(e) => warn!("dropping undecodable OPACK frame: {e}"),
        },
        _ => {}
    }
}

fn dispatch_message(message: Value, pending: &PendingMap, events: &EventSender) {
    match message.get("_t").and_then(Value::as_u64) {
        Some(1) => {
            let name = message
                .get("_i")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let body = message.get("_c").cloned().unwrap_or(Value::Null);
            debug!(name, "event received");
            let _ = events.send(CompanionEvent { name, body });
        }
        Some(3) => {
            let Some(xid) = message.get("_x").and_then(Value::as_u64) else {
                warn!("response without transaction id");
                return;
            };
            let result = match message
                .get("_em")
                .and_then(Value::as_str)
                .map(str::to_string)
            {
                Some(em) => Err(Error::Protocol(ProtocolError::Response(em))),
                None => Ok(message),
            };
            if !pending.resolve_xid(xid as u32, result) {
                // Cancelled or timed out locally; late response is dropped.
                debug!(xid, "response for unknown transaction dropped");
            }
        }
        other => debug!(?other, "ignoring inbound message type"),
    }
}
