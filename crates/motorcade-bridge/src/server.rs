//! Episode driver and TCP front door.
//!
//! [`run_session`] drives one full episode over any channel: connect, the
//! four handshake operations, then the control/measurements tick loop, all
//! against a [`SimulationHost`]. [`BridgeServer`] binds a TCP listener once
//! and serves one client at a time through the same driver.
//!
//! A client disconnect inside the tick loop ends the episode cleanly; the
//! same disconnect during the handshake is a session error, because the
//! simulation was never handed over.

use std::fmt;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::time::Duration;

use tracing::{info, warn};

use motorcade_core::traits::SimulationHost;

use crate::channel::{Channel, TcpChannel};
use crate::engine::SessionEngine;
use crate::protocol::{Outcome, SessionError, TransportError};

// ---------------------------------------------------------------------------
// Session results
// ---------------------------------------------------------------------------

/// Limits for one served episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// End the episode cleanly after this many ticks. `None` runs until the
    /// client disconnects.
    pub max_ticks: Option<u64>,
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The client closed its side during the tick loop.
    Disconnected,
    /// The configured tick limit was reached.
    TickLimit,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "client disconnected",
            Self::TickLimit => "tick limit reached",
        })
    }
}

/// What one served episode amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Completed control/measurements exchanges.
    pub ticks: u64,
    /// Effective spawn point index, after clamping.
    pub spawn_index: u32,
    pub end: EndReason,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ticks from spawn {} ({})",
            self.ticks, self.spawn_index, self.end
        )
    }
}

// ---------------------------------------------------------------------------
// Episode driver
// ---------------------------------------------------------------------------

/// Re-issue a blocking operation until it settles.
fn complete<T>(mut operation: impl FnMut() -> Outcome<T>) -> Result<T, SessionError> {
    loop {
        match operation() {
            Outcome::Success(value) => return Ok(value),
            Outcome::TryAgain => {}
            Outcome::Error(e) => return Err(e),
        }
    }
}

/// The spawn index the episode actually starts from.
fn effective_spawn_index(requested: u32, scene_len: usize) -> u32 {
    if scene_len == 0 {
        if requested != 0 {
            warn!(requested, "spawn point selected in an empty scene");
        }
        return 0;
    }
    if (requested as usize) < scene_len {
        return requested;
    }
    #[allow(clippy::cast_possible_truncation)]
    let clamped = (scene_len - 1) as u32;
    warn!(requested, clamped, "spawn point index out of range, clamping");
    clamped
}

/// Drive one full episode: handshake, spawn, then the tick loop.
///
/// The handshake runs blocking, re-issuing operations that report try-again.
/// Each tick reads control with the host's synchronous flag as the blocking
/// flag, steps the host, and sends one measurements snapshot.
///
/// # Errors
///
/// Returns a [`SessionError`] on transport faults and on client disconnect
/// before the tick loop is reached.
pub fn run_session<C: Channel>(
    engine: &mut SessionEngine<C>,
    host: &mut dyn SimulationHost,
    options: &SessionOptions,
) -> Result<SessionSummary, SessionError> {
    complete(|| engine.connect())?;
    complete(|| engine.read_new_episode(host.settings_sink(), true))?;

    let scene_len = host.world().spawn_points().len();
    complete(|| engine.send_scene_description(host.world().spawn_points(), true))?;
    let requested = complete(|| engine.read_episode_start(true))?;

    let spawn_index = effective_spawn_index(requested, scene_len);
    if scene_len > 0 {
        host.restart(spawn_index as usize);
    }
    complete(|| engine.send_episode_ready(true))?;

    let mut ticks = 0;
    let end = loop {
        let synchronous = host.synchronous();
        match engine.read_control(host.controller(), synchronous) {
            Outcome::Success(()) | Outcome::TryAgain => {}
            Outcome::Error(SessionError::Transport(TransportError::Disconnected)) => {
                info!(ticks, "client disconnected, episode over");
                break EndReason::Disconnected;
            }
            Outcome::Error(e) => return Err(e),
        }

        host.step();

        match engine.send_measurements(host.world(), host.player(), host.send_agents(), true) {
            Outcome::Success(()) | Outcome::TryAgain => {}
            Outcome::Error(SessionError::Transport(TransportError::Disconnected)) => {
                info!(ticks, "client disconnected, episode over");
                break EndReason::Disconnected;
            }
            Outcome::Error(e) => return Err(e),
        }

        ticks += 1;
        if let Some(max_ticks) = options.max_ticks {
            if ticks >= max_ticks {
                break EndReason::TickLimit;
            }
        }
    };

    Ok(SessionSummary {
        ticks,
        spawn_index,
        end,
    })
}

// ---------------------------------------------------------------------------
// BridgeServer
// ---------------------------------------------------------------------------

/// TCP server that exposes a [`SimulationHost`] over the session protocol.
///
/// Binds once and serves one client connection at a time; each served
/// episode gets a fresh engine over the shared listener.
#[derive(Debug)]
pub struct BridgeServer {
    listener: TcpListener,
    timeout: Duration,
    options: SessionOptions,
}

impl BridgeServer {
    /// Bind to the given address (e.g. `"127.0.0.1:2000"`).
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the address cannot be bound.
    pub fn bind<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self, TransportError> {
        Self::bind_with_options(addr, timeout, SessionOptions::default())
    }

    /// Bind with explicit session options.
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the address cannot be bound.
    pub fn bind_with_options<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
        options: SessionOptions,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            timeout,
            options,
        })
    }

    /// The local address the server is bound to.
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the listener's address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one client and run one full episode against the host.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if no client connects within the timeout
    /// or the session fails before its tick loop.
    pub fn serve_episode(
        &self,
        host: &mut dyn SimulationHost,
    ) -> Result<SessionSummary, SessionError> {
        let listener = self.listener.try_clone().map_err(TransportError::from)?;
        let channel = TcpChannel::from_listener(listener)?;
        let mut engine = SessionEngine::new(channel, self.timeout);
        run_session(&mut engine, host, &self.options)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
