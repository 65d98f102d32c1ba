//! AMQP 1.0 publishing.

use async_trait::async_trait;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::sasl_profile::SaslProfile;
use fe2o3_amqp::types::messaging::{Message, Outcome};
use fe2o3_amqp::types::primitives::Binary;
use fe2o3_amqp::{Connection, Sender, Session};
use tracing::{debug, info};

use crate::error::{amqp_error, Error, Result};
use crate::MessageQueue;

const CONTAINER_ID: &str = "commonlib-queue";

pub struct AmqpClient {
    connection: ConnectionHandle<()>,
    next_link: u64,
}

impl std::fmt::Debug for AmqpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpClient").finish_non_exhaustive()
    }
}

impl AmqpClient {
    /// Open a connection to `url` (`amqp://host:5672`) authenticating with
    /// SASL PLAIN.
    pub async fn connect(url: &str, username: &str, password: &str) -> Result<Self> {
        let connection = Connection::builder()
            .container_id(CONTAINER_ID)
            .sasl_profile(SaslProfile::Plain {
                username: username.to_string(),
                password: password.to_string(),
            })
            .open(url)
            .await
            .map_err(amqp_error("open"))?;
        info!(url, "connected to amqp broker");
        Ok(Self {
            connection,
            next_link: 0,
        })
    }
}

#[async_trait]
impl MessageQueue for AmqpClient {
    /// Sends `message` as a single data section on a fresh session and
    /// sender link, both closed again afterwards.
    async fn publish(&mut self, topic: &str, message: &str) -> Result<()> {
        self.next_link += 1;
        let link_name = format!("{CONTAINER_ID}-sender-{}", self.next_link);

        let mut session = Session::begin(&mut self.connection)
            .await
            .map_err(amqp_error("begin session"))?;
        let mut sender = Sender::attach(&mut session, link_name, topic)
            .await
            .map_err(amqp_error("attach sender"))?;

        let body = Message::builder()
            .data(Binary::from(message.as_bytes().to_vec()))
            .build();
        let outcome = sender.send(body).await.map_err(amqp_error("send"))?;
        debug!(address = topic, ?outcome, "amqp message settled");

        sender.close().await.map_err(amqp_error("detach sender"))?;
        session.end().await.map_err(amqp_error("end session"))?;

        match outcome {
            Outcome::Accepted(_) => Ok(()),
            other => Err(Error::NotAccepted(format!("{other:?}"))),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connection.close().await.map_err(amqp_error("close"))
    }
}
