//! Message channels between the session engine and a client.
//!
//! [`TcpChannel`] is the production transport: length-prefixed JSON frames
//! over one TCP stream, with per-call wait windows. [`MemoryChannel`] is a
//! socket-free stand-in backed by a pair of crossbeam queues, for tests and
//! in-process clients.
//!
//! A wait of zero polls: the call returns `Ok(None)` immediately when no
//! frame has arrived. Once the first byte of a frame is seen the sender has
//! committed it, so the remainder is read under the channel's frame timeout
//! rather than the zero window.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::framing;
use crate::protocol::{MAX_MESSAGE_SIZE, TransportError};

/// How often the accept loop re-polls its listener.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Frame timeout used before `connect` has supplied the session's own.
const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One ordered, framed, bidirectional message stream.
///
/// `wait` bounds how long a call may block: zero means poll and return
/// `Ok(None)` (reads) or a `WouldBlock` IO fault (writes) when the peer is
/// not ready.
pub trait Channel: Send + 'static {
    /// Establish the connection, waiting up to `timeout` for the peer.
    fn connect(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Read one message. `Ok(None)` means the wait window expired with no
    /// frame started.
    fn read<T: DeserializeOwned>(&mut self, wait: Duration) -> Result<Option<T>, TransportError>;

    /// Write one message within the wait window.
    fn write<T: Serialize>(&mut self, message: &T, wait: Duration) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// TcpChannel
// ---------------------------------------------------------------------------

/// TCP transport carrying length-prefixed JSON frames.
///
/// Built either around a listener (server side, connects on accept) or a
/// dialed stream (client side, already connected).
#[derive(Debug)]
pub struct TcpChannel {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    frame_timeout: Duration,
}

impl TcpChannel {
    /// Bind a listener; the channel connects when a client is accepted.
    ///
    /// # Errors
    ///
    /// Returns an IO fault if the address cannot be bound.
    pub fn listen<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        Self::from_listener(listener)
    }

    /// Wrap an existing listener.
    ///
    /// # Errors
    ///
    /// Returns an IO fault if the listener cannot be switched to
    /// non-blocking accepts.
    pub fn from_listener(listener: TcpListener) -> Result<Self, TransportError> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener: Some(listener),
            stream: None,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        })
    }

    /// Dial a server; the channel is connected immediately.
    ///
    /// # Errors
    ///
    /// Returns an IO fault if the peer cannot be reached.
    pub fn dial<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            listener: None,
            stream: Some(stream),
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        })
    }

    /// The local address of the listener or stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] on a channel with neither.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }
        if let Some(stream) = &self.stream {
            return Ok(stream.local_addr()?);
        }
        Err(TransportError::NotConnected)
    }
}

impl Channel for TcpChannel {
    fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if !timeout.is_zero() {
            self.frame_timeout = timeout;
        }
        if self.stream.is_some() {
            // Dialed channels are already connected.
            return Ok(());
        }
        let listener = self
            .listener
            .as_ref()
            .ok_or(TransportError::NotConnected)?;
        let deadline = Instant::now() + timeout;
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nodelay(true)?;
                    debug!(client = %addr, "client connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::ConnectTimeout(timeout));
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read<T: DeserializeOwned>(
        &mut self,
        wait: Duration,
    ) -> Result<Option<T>, TransportError> {
        let frame_timeout = self.frame_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        if wait.is_zero() {
            stream.set_nonblocking(true)?;
            let first = framing::read_byte(stream);
            stream.set_nonblocking(false)?;
            let Some(first) = first? else {
                return Ok(None);
            };
            // A prefix byte exists, so the peer committed a whole frame;
            // finish it under the frame timeout instead of the zero window.
            stream.set_read_timeout(Some(frame_timeout))?;
            let len = framing::read_prefix_after(stream, first)?;
            framing::read_payload(stream, len).map(Some)
        } else {
            stream.set_read_timeout(Some(wait))?;
            framing::read_message(stream)
        }
    }

    fn write<T: Serialize>(
        &mut self,
        message: &T,
        wait: Duration,
    ) -> Result<(), TransportError> {
        let frame_timeout = self.frame_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let frame = framing::encode_frame(message)?;
        if wait.is_zero() {
            stream.set_nonblocking(true)?;
            let first = stream.write(&frame);
            stream.set_nonblocking(false)?;
            match first {
                Ok(0) => Err(TransportError::Disconnected),
                Ok(n) if n == frame.len() => {
                    stream.flush()?;
                    Ok(())
                }
                Ok(n) => {
                    // The frame is started and must complete; push the rest
                    // through under the frame timeout.
                    stream.set_write_timeout(Some(frame_timeout))?;
                    stream.write_all(&frame[n..])?;
                    stream.flush()?;
                    Ok(())
                }
                // Nothing was sent; a WouldBlock here is a clean retry.
                Err(e) => Err(e.into()),
            }
        } else {
            stream.set_write_timeout(Some(wait))?;
            stream.write_all(&frame)?;
            stream.flush()?;
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryChannel
// ---------------------------------------------------------------------------

/// In-process channel half. One queue element carries one JSON payload; the
/// queue itself provides the framing.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl MemoryChannel {
    /// Create a connected pair of channel halves.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (left_tx, left_rx) = crossbeam_channel::unbounded();
        let (right_tx, right_rx) = crossbeam_channel::unbounded();
        (
            Self {
                tx: left_tx,
                rx: right_rx,
            },
            Self {
                tx: right_tx,
                rx: left_rx,
            },
        )
    }
}

impl Channel for MemoryChannel {
    fn connect(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        // A constructed pair is already connected.
        Ok(())
    }

    fn read<T: DeserializeOwned>(
        &mut self,
        wait: Duration,
    ) -> Result<Option<T>, TransportError> {
        let payload = if wait.is_zero() {
            match self.rx.try_recv() {
                Ok(payload) => payload,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(TransportError::Disconnected),
            }
        } else {
            match self.rx.recv_timeout(wait) {
                Ok(payload) => payload,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Disconnected);
                }
            }
        };
        Ok(Some(serde_json::from_slice(&payload)?))
    }

    fn write<T: Serialize>(
        &mut self,
        message: &T,
        _wait: Duration,
    ) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(message)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.tx
            .send(payload)
            .map_err(|_| TransportError::Disconnected)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
