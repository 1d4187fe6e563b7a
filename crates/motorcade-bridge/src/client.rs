//! Reference client: the client half of the session protocol.
//!
//! [`BridgeClient`] issues the handshake and tick records in order over any
//! [`Channel`]. All reads block up to the client's timeout; an empty wait
//! window is a [`TimedOut`](TransportError::TimedOut) fault here, because a
//! client has nothing useful to do with a half-finished handshake. The
//! tri-state outcome belongs to the server engine.

use std::net::ToSocketAddrs;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::channel::{Channel, TcpChannel};
use crate::protocol::{
    ControlCommand, EpisodeReady, EpisodeRequest, EpisodeStart, MeasurementsSnapshot,
    SceneDescription, TransportError,
};

/// Client side of one episode session.
#[derive(Debug)]
pub struct BridgeClient<C: Channel> {
    channel: C,
    timeout: Duration,
}

impl BridgeClient<TcpChannel> {
    /// Dial a server over TCP.
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the server cannot be reached.
    pub fn dial<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self, TransportError> {
        let mut channel = TcpChannel::dial(addr)?;
        channel.connect(timeout)?;
        Ok(Self::new(channel, timeout))
    }
}

impl<C: Channel> BridgeClient<C> {
    /// Wrap an already constructed channel.
    #[must_use]
    pub fn new(channel: C, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Establish the connection if the channel has not done so already.
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the peer is unreachable.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.channel.connect(self.timeout)
    }

    /// Ask the server for a new episode with the given configuration text.
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the request cannot be sent.
    pub fn request_episode(&mut self, config_text: &str) -> Result<(), TransportError> {
        debug!(bytes = config_text.len(), "requesting new episode");
        self.write(&EpisodeRequest {
            config_text: config_text.to_owned(),
        })
    }

    /// Read the scene description listing the available spawn points.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TimedOut`] if the server sends nothing
    /// within the timeout.
    pub fn scene_description(&mut self) -> Result<SceneDescription, TransportError> {
        self.read()
    }

    /// Tell the server which spawn point to start from.
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the selection cannot be sent.
    pub fn select_spawn(&mut self, index: u32) -> Result<(), TransportError> {
        self.write(&EpisodeStart {
            spawn_point_index: index,
        })
    }

    /// Wait for the server's readiness signal.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TimedOut`] if the server sends nothing
    /// within the timeout.
    pub fn await_ready(&mut self) -> Result<EpisodeReady, TransportError> {
        self.read()
    }

    /// Send one tick's control command.
    ///
    /// # Errors
    ///
    /// Returns a transport fault if the command cannot be sent.
    pub fn send_control(&mut self, command: &ControlCommand) -> Result<(), TransportError> {
        self.write(command)
    }

    /// Read one tick's measurements snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TimedOut`] if the server sends nothing
    /// within the timeout.
    pub fn measurements(&mut self) -> Result<MeasurementsSnapshot<'static>, TransportError> {
        self.read()
    }

    fn read<T: DeserializeOwned>(&mut self) -> Result<T, TransportError> {
        self.channel
            .read(self.timeout)?
            .ok_or(TransportError::TimedOut)
    }

    fn write<T: Serialize>(&mut self, record: &T) -> Result<(), TransportError> {
        self.channel.write(record, self.timeout)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::engine::SessionEngine;
    use crate::server::{SessionOptions, run_session};
    use motorcade_core::types::Transform;
    use motorcade_test_utils::mocks::{MockHost, ScriptedWorld};
    use nalgebra::Vector3;

    const WAIT: Duration = Duration::from_secs(1);

    #[test]
    fn client_runs_an_episode_against_the_session_driver() {
        let (server_half, client_half) = MemoryChannel::pair();

        let server = std::thread::spawn(move || {
            let mut engine = SessionEngine::new(server_half, WAIT);
            let mut host = MockHost::new();
            host.world = ScriptedWorld::new().with_spawn_points(vec![
                Transform::facing(Vector3::zeros(), Vector3::x()),
                Transform::facing(Vector3::new(10.0, 0.0, 0.0), Vector3::y()),
            ]);
            let summary = run_session(&mut engine, &mut host, &SessionOptions::default());
            (summary, host)
        });

        let mut client = BridgeClient::new(client_half, WAIT);
        client.connect().unwrap();
        client.request_episode("[level]\nweather_id = 2\n").unwrap();

        let scene = client.scene_description().unwrap();
        assert_eq!(scene.spawn_points.len(), 2);

        client.select_spawn(1).unwrap();
        assert!(client.await_ready().unwrap().ready);

        for _ in 0..2 {
            client
                .send_control(&ControlCommand {
                    autopilot: false,
                    throttle: 1.0,
                    ..ControlCommand::default()
                })
                .unwrap();
            let snapshot = client.measurements().unwrap();
            assert!(snapshot.player.forward_speed.is_finite());
        }
        drop(client);

        let (summary, host) = server.join().unwrap();
        let summary = summary.unwrap();
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.spawn_index, 1);
        assert_eq!(host.restarts, vec![1]);
        assert_eq!(host.sink.texts, vec!["[level]\nweather_id = 2\n"]);
    }

    #[test]
    fn silent_server_is_a_timed_out_fault() {
        let (_server_half, client_half) = MemoryChannel::pair();
        let mut client = BridgeClient::new(client_half, Duration::from_millis(50));
        client.connect().unwrap();
        client.request_episode("").unwrap();
        assert!(matches!(
            client.scene_description(),
            Err(TransportError::TimedOut)
        ));
    }
}
