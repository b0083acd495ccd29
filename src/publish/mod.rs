pub mod stream;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Sender;
use rumqttc::{Client, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS};

use crate::config::{Settings, Transport};
use crate::types::{AppEvent, GestureState};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
// Enough headroom for a full-resolution JPEG frame; the default limit
// of 10 KiB rejects anything past a thumbnail.
const MAX_PACKET_SIZE: usize = 1024 * 1024;
const REQUEST_CHANNEL_CAP: usize = 10;

/// `gesture-relay-` plus 8 random hex characters, a fresh identity per
/// connection so a stale broker session never collides.
pub fn client_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("gesture-relay-{}", &suffix[..8])
}

fn broker_options(settings: &Settings) -> MqttOptions {
    let id = client_id();
    let mut options = match settings.transport {
        Transport::Tcp => MqttOptions::new(id, settings.host.clone(), settings.tcp_port),
        Transport::Ws => {
            // The broker address doubles as the full URL for websocket
            // transport; `/mqtt` is the usual broker endpoint path.
            let url = format!("ws://{}:{}/mqtt", settings.host, settings.ws_port);
            let mut options = MqttOptions::new(id, url, settings.ws_port);
            options.set_transport(rumqttc::Transport::Ws);
            options
        }
    };
    options.set_keep_alive(KEEP_ALIVE);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    options
}

/// One broker connection. The event loop runs on its own thread and
/// ends on the first error: reconnecting is an operator action, never
/// automatic.
pub struct Session {
    client: Client,
    intentional_stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Session {
    /// Starts the connection thread. The outcome arrives as
    /// `Connected` / `ConnectionFailed` events rather than a return
    /// value; the broker handshake is asynchronous.
    pub fn connect(settings: &Settings, events: Sender<AppEvent>) -> Self {
        let options = broker_options(settings);
        log::info!(
            target: "connect",
            "Connecting to {} as {}",
            settings.broker_display(),
            options.client_id()
        );

        let (client, mut connection) = Client::new(options, REQUEST_CHANNEL_CAP);
        let intentional_stop = Arc::new(AtomicBool::new(false));
        let stop_flag = intentional_stop.clone();

        let handle = thread::spawn(move || {
            let mut connected = false;
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            connected = true;
                            let _ = events.send(AppEvent::Connected);
                        } else {
                            let _ = events.send(AppEvent::ConnectionFailed(format!(
                                "broker refused connection: {:?}",
                                ack.code
                            )));
                            break;
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        let _ = events.send(AppEvent::Disconnected);
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if stop_flag.load(Ordering::SeqCst) {
                            let _ = events.send(AppEvent::Disconnected);
                        } else if connected {
                            let _ = events.send(AppEvent::ConnectionLost(err.to_string()));
                        } else {
                            let _ = events.send(AppEvent::ConnectionFailed(err.to_string()));
                        }
                        break;
                    }
                }
            }
        });

        Session {
            client,
            intentional_stop,
            handle: Some(handle),
        }
    }

    /// Blocking publish for the small, must-not-miss status payloads.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.into())?;
        Ok(())
    }

    /// Non-blocking handle for the frame streamer; a full request
    /// queue drops the frame instead of stalling the timer.
    pub fn frame_publisher(&self) -> FramePublisher {
        FramePublisher {
            client: self.client.clone(),
        }
    }

    pub fn disconnect(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.intentional_stop.store(true, Ordering::SeqCst);
            if let Err(err) = self.client.disconnect() {
                // Already torn down; the thread is on its way out.
                log::debug!("disconnect request failed: {err}");
            }
            let _ = handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone)]
pub struct FramePublisher {
    client: Client,
}

impl FramePublisher {
    pub fn try_publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }
}

/// Publish-on-change latch for the status topic. Remembers the last
/// state actually sent; `reset` forgets it so the next tracked frame
/// re-announces (fresh connection, hand publishing re-enabled).
#[derive(Debug, Default)]
pub struct StatusGate {
    last_published: Option<GestureState>,
}

impl StatusGate {
    /// True when `state` should go out now; latches it as published.
    pub fn should_publish(&mut self, state: GestureState, enabled: bool, connected: bool) -> bool {
        if !enabled || !connected {
            return false;
        }
        if self.last_published == Some(state) {
            return false;
        }
        self.last_published = Some(state);
        true
    }

    pub fn reset(&mut self) {
        self.last_published = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_client_id_shape() {
        let id = client_id();
        assert!(id.starts_with("gesture-relay-"));
        assert_eq!(id.len(), "gesture-relay-".len() + 8);
        assert_ne!(client_id(), client_id());
    }

    #[test]
    fn test_tcp_options_use_host_and_port() {
        let mut settings = Settings::default();
        settings.transport = Transport::Tcp;
        settings.host = "broker.lan".to_string();
        let options = broker_options(&settings);
        assert_eq!(options.broker_address(), ("broker.lan".to_string(), 1883));
        assert_eq!(options.keep_alive(), KEEP_ALIVE);
    }

    #[test]
    fn test_ws_options_carry_the_url() {
        let settings = Settings::default();
        let options = broker_options(&settings);
        let (addr, _) = options.broker_address();
        assert_eq!(addr, "ws://localhost:9001/mqtt");
        assert!(matches!(options.transport(), rumqttc::Transport::Ws));
    }

    #[test]
    fn test_gate_publishes_only_on_change() {
        let mut gate = StatusGate::default();
        assert!(gate.should_publish(GestureState::Open, true, true));
        assert!(!gate.should_publish(GestureState::Open, true, true));
        assert!(gate.should_publish(GestureState::Closed, true, true));
        assert!(gate.should_publish(GestureState::NoHand, true, true));
        assert!(!gate.should_publish(GestureState::NoHand, true, true));
    }

    #[test]
    fn test_gate_ignores_disabled_or_disconnected() {
        let mut gate = StatusGate::default();
        assert!(!gate.should_publish(GestureState::Open, false, true));
        assert!(!gate.should_publish(GestureState::Open, true, false));
        // Nothing latched while gated off.
        assert!(gate.should_publish(GestureState::Open, true, true));
    }

    #[test]
    fn test_gate_reset_reannounces_same_state() {
        let mut gate = StatusGate::default();
        assert!(gate.should_publish(GestureState::Closed, true, true));
        gate.reset();
        assert!(gate.should_publish(GestureState::Closed, true, true));
    }
}
