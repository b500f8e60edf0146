use crate::config::MqttConfig;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum MqttError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("MQTT event loop is not running")]
    Disconnected,
    #[error("MQTT broker not connected: {0:?}")]
    NotConnected(MqttConnectionStatus),
    #[error("Publishing to {topic} failed after {attempts} attempts: {reason}")]
    RetriesExhausted { topic: String, attempts: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MqttConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
    Error(String),
}

/// One encoded message ready for the broker
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

pub fn qos_from_u8(qos: u8) -> Option<QoS> {
    match qos {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

/// Sink for encoded messages
#[allow(async_fn_in_trait)]
pub trait Publisher {
    async fn publish(&self, publication: &Publication) -> Result<(), MqttError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MqttConfig) -> Self {
        RetryPolicy {
            retries: config.publish_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Publish, retrying with doubling backoff. Only the last failure is returned.
pub async fn publish_with_retry<P: Publisher>(publisher: &P, publication: &Publication, policy: &RetryPolicy) -> Result<(), MqttError> {
    let mut attempts: u32 = 0;
    let mut backoff = policy.backoff;

    loop {
        attempts += 1;
        match publisher.publish(publication).await {
            Ok(()) => {
                debug!("Published {} bytes to {}", publication.payload.len(), publication.topic);
                return Ok(());
            }
            Err(e) if attempts <= policy.retries => {
                warn!("Publishing to {} failed ({}), retrying in {:?}", publication.topic, e, backoff);
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => {
                return Err(MqttError::RetriesExhausted {
                    topic: publication.topic.clone(),
                    attempts,
                    reason: e.to_string(),
                });
            }
        }
    }
}

pub struct MqttPublisher {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
    status: Arc<Mutex<MqttConnectionStatus>>,
}

fn set_status(status: &Mutex<MqttConnectionStatus>, new: MqttConnectionStatus) {
    if let Ok(mut status) = status.lock() {
        *status = new;
    }
}

impl MqttPublisher {
    /// Must be called from within a tokio runtime
    pub fn connect(config: &MqttConfig) -> Self {
        info!("MQTT connection to {}:{} starting up", config.host, config.port);
        let mut mqttoptions = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive));
        if let Some(user) = &config.user {
            mqttoptions.set_credentials(user.clone(), config.pass.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);
        let status = Arc::new(Mutex::new(MqttConnectionStatus::Disconnected));

        let loop_status = status.clone();
        let event_loop = tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        set_status(&loop_status, MqttConnectionStatus::Connected);
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("Disconnected from MQTT broker");
                        set_status(&loop_status, MqttConnectionStatus::Disconnected);
                        break;
                    }
                    Ok(_) => {}
                    Err(ConnectionError::RequestsDone) => {
                        debug!("MQTT client dropped, event loop exits");
                        break;
                    }
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting", e);
                        set_status(&loop_status, MqttConnectionStatus::Error(e.to_string()));
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        set_status(&loop_status, MqttConnectionStatus::Reconnecting);
                    }
                }
            }
        });

        MqttPublisher { client, event_loop, status }
    }

    pub fn status(&self) -> MqttConnectionStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or(MqttConnectionStatus::Disconnected)
    }

    /// Flush queued publications and close the connection
    pub async fn shutdown(self) {
        if self.status() != MqttConnectionStatus::Connected {
            debug!("MQTT broker not connected, stopping event loop");
            self.event_loop.abort();
            return;
        }
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect failed: {}", e);
            self.event_loop.abort();
            return;
        }
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.event_loop).await.is_err() {
            warn!("MQTT event loop did not finish within {:?}", SHUTDOWN_TIMEOUT);
        }
    }
}

impl Publisher for MqttPublisher {
    /// Refuses while the broker is not connected. A full request queue is
    /// an error instead of a wait.
    async fn publish(&self, publication: &Publication) -> Result<(), MqttError> {
        if self.event_loop.is_finished() {
            return Err(MqttError::Disconnected);
        }

        let status = self.status();
        if status != MqttConnectionStatus::Connected {
            return Err(MqttError::NotConnected(status));
        }

        self.client.try_publish(publication.topic.clone(), publication.qos, publication.retain, publication.payload.clone())?;
        Ok(())
    }
}
