use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("amqp {operation} failed: {source}")]
    Amqp {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("message was not accepted by the broker: {0}")]
    NotAccepted(String),

    #[error(transparent)]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("mqtt connection failed: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    /// A persistent MQTT session needs a client id.
    #[error("mqtt client id must not be empty")]
    MissingClientId,

    #[error("invalid broker url {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tls(#[from] rustls::Error),

    #[error("invalid server name {0}")]
    InvalidServerName(String),

    /// Encoding or decoding a STOMP frame failed.
    #[error("stomp: {0}")]
    Stomp(#[source] anyhow::Error),

    /// An ERROR frame from the broker.
    #[error("broker error: {0}")]
    Broker(String),

    #[error("unexpected frame: {0}")]
    Protocol(String),

    /// More than the frame size limit arrived without completing a frame.
    #[error("stomp frame exceeds {0} bytes")]
    FrameTooLarge(usize),

    #[error("connection to broker is closed")]
    Closed,

    #[error("no receipt for {0}")]
    ReceiptTimeout(String),
}

pub(crate) fn amqp_error<E>(operation: &'static str) -> impl FnOnce(E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |source| Error::Amqp {
        operation,
        source: Box::new(source),
    }
}
