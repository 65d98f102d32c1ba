//! STOMP 1.2 over TLS.
//!
//! Frames are encoded and parsed by `tokio-stomp-2`; this module adds the
//! TLS transport, heartbeats and receipts. Every SEND asks for a receipt and
//! waits for it, so a successful [`publish`](StompClient::publish) means the
//! broker has taken the message. A connection found closed is re-established
//! once before giving up.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stomp_2::client::ClientCodec;
use tokio_stomp_2::{FromServer, Message, ToServer};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::MessageQueue;

/// Heartbeat interval offered to the broker in both directions.
pub const HEARTBEAT: Duration = Duration::from_secs(3);

/// How long a SEND or DISCONNECT waits for its RECEIPT.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest frame accepted from the broker.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub(crate) trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Transport for T {}

pub(crate) type BoxedTransport = Box<dyn Transport>;

type Connection = Framed<BoxedTransport, StompCodec>;

/// Opens the byte stream a STOMP session runs over.
#[async_trait]
pub(crate) trait Connector: Send + Sync {
    async fn connect(&self) -> Result<BoxedTransport>;
}

struct TlsConnector {
    host: String,
    port: u16,
    tls: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    fn new(host: &str, port: u16) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            host: host.to_string(),
            port,
            tls: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self) -> Result<BoxedTransport> {
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|_| Error::InvalidServerName(self.host.clone()))?;
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let stream = self.tls.connect(server_name, tcp).await?;
        Ok(Box::new(stream))
    }
}

/// What the client writes: a frame, or a bare EOL heartbeat.
pub(crate) enum Outgoing {
    Frame(Message<ToServer>),
    Heartbeat,
}

impl From<ToServer> for Outgoing {
    fn from(content: ToServer) -> Self {
        Outgoing::Frame(content.into())
    }
}

/// [`ClientCodec`] plus heartbeat handling and a frame size limit.
#[derive(Debug, Default)]
pub(crate) struct StompCodec;

impl Decoder for StompCodec {
    type Item = Message<FromServer>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let heartbeats = src
            .iter()
            .take_while(|b| matches!(b, b'\n' | b'\r'))
            .count();
        src.advance(heartbeats);
        if src.is_empty() {
            return Ok(None);
        }

        check_content_length(src)?;
        let frame = ClientCodec.decode(src).map_err(Error::Stomp)?;
        if frame.is_none() && src.len() > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge(MAX_FRAME_SIZE));
        }
        Ok(frame)
    }
}

impl Encoder<Outgoing> for StompCodec {
    type Error = Error;

    fn encode(&mut self, item: Outgoing, dst: &mut BytesMut) -> Result<()> {
        match item {
            Outgoing::Frame(message) => ClientCodec.encode(message, dst).map_err(Error::Stomp),
            Outgoing::Heartbeat => {
                dst.put_u8(b'\n');
                Ok(())
            }
        }
    }
}

/// Reject a declared `content-length` that is not a number or exceeds
/// [`MAX_FRAME_SIZE`]. Only complete header lines are inspected.
fn check_content_length(src: &[u8]) -> Result<()> {
    let mut lines = src.split_inclusive(|b| *b == b'\n').skip(1);
    while let Some(line) = lines.next().and_then(|l| l.strip_suffix(b"\n")) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            break;
        }
        let Some(value) = line.strip_prefix(b"content-length:") else {
            continue;
        };
        let length = std::str::from_utf8(value)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| Error::Protocol("invalid content-length header".to_string()))?;
        if length > MAX_FRAME_SIZE as u64 {
            return Err(Error::FrameTooLarge(MAX_FRAME_SIZE));
        }
        return Ok(());
    }
    Ok(())
}

#[derive(Clone)]
struct Credentials {
    host: String,
    login: String,
    passcode: String,
}

pub struct StompClient {
    connector: Box<dyn Connector>,
    credentials: Credentials,
    session: Option<Session>,
    next_receipt: u64,
}

impl std::fmt::Debug for StompClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompClient")
            .field("host", &self.credentials.host)
            .field("connected", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl StompClient {
    /// Connect to `host:port` over TLS, verified against the webpki roots.
    pub async fn connect(host: &str, port: u16, login: &str, passcode: &str) -> Result<Self> {
        let connector = TlsConnector::new(host, port)?;
        Self::connect_with(Box::new(connector), host, login, passcode).await
    }

    pub(crate) async fn connect_with(
        connector: Box<dyn Connector>,
        host: &str,
        login: &str,
        passcode: &str,
    ) -> Result<Self> {
        let mut client = Self {
            connector,
            credentials: Credentials {
                host: host.to_string(),
                login: login.to_string(),
                passcode: passcode.to_string(),
            },
            session: None,
            next_receipt: 0,
        };
        client.reconnect().await?;
        Ok(client)
    }

    async fn reconnect(&mut self) -> Result<()> {
        if let Some(old) = self.session.take() {
            old.abort();
        }
        let transport = self.connector.connect().await?;
        self.session = Some(Session::open(transport, &self.credentials).await?);
        info!(host = %self.credentials.host, "connected to stomp broker");
        Ok(())
    }

    fn receipt_id(&mut self) -> String {
        self.next_receipt += 1;
        format!("message-{}", self.next_receipt)
    }

    async fn send(&mut self, destination: &str, message: &str) -> Result<()> {
        let receipt = self.receipt_id();
        let session = self.session.as_mut().ok_or(Error::Closed)?;
        let frame = ToServer::Send {
            destination: destination.to_string(),
            transaction: None,
            headers: Some(vec![
                ("content-type".to_string(), content_type(message).to_string()),
                ("persistent".to_string(), "true".to_string()),
                ("receipt".to_string(), receipt.clone()),
            ]),
            body: Some(message.as_bytes().to_vec()),
        };
        session.write(frame.into()).await?;
        session.await_receipt(&receipt).await
    }
}

/// XML when the body looks like XML, JSON otherwise.
fn content_type(message: &str) -> &'static str {
    if message.starts_with('<') {
        "application/xml;charset=utf-8"
    } else {
        "application/json;charset=utf-8"
    }
}

#[async_trait]
impl MessageQueue for StompClient {
    async fn publish(&mut self, topic: &str, message: &str) -> Result<()> {
        match self.send(topic, message).await {
            Err(Error::Closed) => {
                warn!(destination = topic, "stomp connection closed, reconnecting");
                self.reconnect().await?;
                self.send(topic, message).await
            }
            other => other,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let receipt = self.receipt_id();
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        let frame = ToServer::Disconnect {
            receipt: Some(receipt.clone()),
        };
        let result = match session.write(frame.into()).await {
            Ok(()) => session.await_receipt(&receipt).await,
            Err(e) => Err(e),
        };
        session.abort();
        match result {
            Ok(()) | Err(Error::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// One established connection: a reader task forwarding broker frames and
/// an optional heartbeat task sharing the sink.
struct Session {
    sink: Arc<Mutex<SplitSink<Connection, Outgoing>>>,
    frames: mpsc::Receiver<FromServer>,
    reader: JoinHandle<()>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Session {
    async fn open(transport: BoxedTransport, credentials: &Credentials) -> Result<Self> {
        let mut connection = Framed::new(transport, StompCodec);

        let heartbeat_ms = HEARTBEAT.as_millis() as u32;
        let connect = ToServer::Connect {
            accept_version: "1.2".to_string(),
            host: credentials.host.clone(),
            login: Some(credentials.login.clone()),
            passcode: Some(credentials.passcode.clone()),
            heartbeat: Some((heartbeat_ms, heartbeat_ms)),
        };
        connection.send(connect.into()).await?;

        let send_every = match connection.next().await.ok_or(Error::Closed)??.content {
            FromServer::Connected {
                version, heartbeat, ..
            } => {
                let send_every = outgoing_heartbeat(heartbeat.as_deref());
                debug!(version = %version, ?send_every, "stomp session established");
                send_every
            }
            FromServer::Error { message, body } => return Err(broker_error(message, body)),
            other => return Err(Error::Protocol(format!("expected CONNECTED, got {other:?}"))),
        };

        let (sink, mut stream) = connection.split();
        let sink = Arc::new(Mutex::new(sink));
        let (tx, frames) = mpsc::channel(16);
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(message) => {
                        if tx.send(message.content).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read from stomp broker");
                        break;
                    }
                }
            }
        });
        let heartbeat = send_every.map(|every| {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval(every);
                ticks.tick().await;
                loop {
                    ticks.tick().await;
                    if sink.lock().await.send(Outgoing::Heartbeat).await.is_err() {
                        break;
                    }
                }
            })
        });

        Ok(Self {
            sink,
            frames,
            reader,
            heartbeat,
        })
    }

    async fn write(&mut self, frame: Outgoing) -> Result<()> {
        self.sink.lock().await.send(frame).await.map_err(closed_or_error)
    }

    async fn await_receipt(&mut self, receipt: &str) -> Result<()> {
        loop {
            let frame = tokio::time::timeout(RECEIPT_TIMEOUT, self.frames.recv())
                .await
                .map_err(|_| Error::ReceiptTimeout(receipt.to_string()))?
                .ok_or(Error::Closed)?;
            match frame {
                FromServer::Receipt { receipt_id } if receipt_id == receipt => return Ok(()),
                FromServer::Error { message, body } => return Err(broker_error(message, body)),
                other => debug!(frame = ?other, "ignoring stomp frame"),
            }
        }
    }

    fn abort(self) {
        self.reader.abort();
        if let Some(heartbeat) = self.heartbeat {
            heartbeat.abort();
        }
    }
}

/// How often the client must send heartbeats given the broker's
/// `heart-beat: sx,sy` header, per STOMP 1.2 negotiation.
fn outgoing_heartbeat(header: Option<&str>) -> Option<Duration> {
    let (_, server_wants) = header?.split_once(',')?;
    let server_wants: u64 = server_wants.trim().parse().ok()?;
    let client_offers = HEARTBEAT.as_millis() as u64;
    (server_wants != 0).then(|| Duration::from_millis(client_offers.max(server_wants)))
}

fn broker_error(message: Option<String>, body: Option<Vec<u8>>) -> Error {
    let message = message.unwrap_or_else(|| {
        body.map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    });
    Error::Broker(message)
}

fn closed_or_error(e: Error) -> Error {
    match e {
        Error::Io(io) => match io.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Error::Closed,
            _ => Error::Io(io),
        },
        other => other,
    }
}
