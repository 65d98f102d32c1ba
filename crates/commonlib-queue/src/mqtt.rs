//! MQTT 3.1.1 publishing.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::MessageQueue;

/// How long [`MqttClient::disconnect`] lets the event loop flush.
pub const DISCONNECT_WAIT: Duration = Duration::from_millis(255);

const REQUEST_CAPACITY: usize = 10;
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct MqttClient {
    client: AsyncClient,
    event_loop: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient").finish_non_exhaustive()
    }
}

impl MqttClient {
    /// Connect to `broker_url` (`tcp://host:1883`, or `ssl://host:8883` for
    /// TLS) with a persistent session.
    pub async fn connect(broker_url: &str, client_id: &str) -> Result<Self> {
        Self::start(broker_options(broker_url, client_id)?).await
    }

    pub async fn connect_with_credentials(
        broker_url: &str,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let mut options = broker_options(broker_url, client_id)?;
        options.set_credentials(username, password);
        Self::start(options).await
    }

    /// Waits for the CONNACK, then leaves the event loop to a background task.
    async fn start(options: MqttOptions) -> Result<Self> {
        let broker = format!("{}:{}", options.broker_address().0, options.broker_address().1);
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    info!(broker, session_present = ack.session_present, "connected to mqtt broker");
                    break;
                }
                event => debug!(?event, "waiting for connack"),
            }
        }

        Ok(Self {
            client,
            event_loop: Some(tokio::spawn(drive(event_loop))),
        })
    }
}

async fn drive(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                warn!(error = %e, "mqtt connection error, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

fn broker_options(broker_url: &str, client_id: &str) -> Result<MqttOptions> {
    if client_id.is_empty() {
        return Err(Error::MissingClientId);
    }
    let url = Url::parse(broker_url).map_err(|_| Error::InvalidUrl(broker_url.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl(broker_url.to_string()))?;
    let (tls, default_port) = match url.scheme() {
        "tcp" | "mqtt" => (false, 1883),
        "ssl" | "tls" | "mqtts" => (true, 8883),
        _ => return Err(Error::InvalidUrl(broker_url.to_string())),
    };

    let mut options = MqttOptions::new(client_id, host, url.port().unwrap_or(default_port));
    options.set_clean_session(false);
    if tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    Ok(options)
}

#[async_trait]
impl MessageQueue for MqttClient {
    /// QoS 0, not retained.
    async fn publish(&mut self, topic: &str, message: &str) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, message.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client.disconnect().await?;
        if let Some(handle) = self.event_loop.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(DISCONNECT_WAIT, handle).await.is_err() {
                abort.abort();
            }
        }
        Ok(())
    }
}
