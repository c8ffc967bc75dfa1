//! Test helpers for integration tests
//!
//! Provides a test server bound to an ephemeral port and a WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use relay_broker::MemoryBroker;
use relay_common::AppConfig;
use relay_core::BrokerChannel;
use relay_gateway::{create_app, GatewayState};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// How long a client waits for a frame before failing
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long [`eventually`] polls before failing
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub broker: Arc<MemoryBroker>,
    pub state: GatewayState,
    pub client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server over a fresh in-process broker
    pub async fn start() -> Result<Self> {
        Self::start_with_broker(MemoryBroker::new_shared()).await
    }

    /// Start a test server over a prepared broker
    pub async fn start_with_broker(broker: Arc<MemoryBroker>) -> Result<Self> {
        let config = AppConfig::default();

        // Same bootstrap as the binary: the exchange exists before any client
        broker.declare_exchange(&config.broker.exchange).await?;

        let state = GatewayState::new(broker.clone(), config);
        let app = create_app(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn({
            let broker = state.broker().clone();
            async move {
                relay_gateway::server::serve_with_broker(listener, app, broker)
                    .await
                    .ok();
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            addr,
            broker,
            state,
            client,
            _handle: handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the upgrade URL for a query string
    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/{}", self.addr, query)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Open a WebSocket as `name` without waiting for the session
    pub async fn connect(&self, name: &str) -> Result<TestClient> {
        TestClient::connect(&self.ws_url(&format!("?name={name}"))).await
    }

    /// Open a WebSocket as `name` and wait until its consumer is attached
    pub async fn connect_ready(&self, name: &str) -> Result<TestClient> {
        let client = self.connect(name).await?;
        let broker = self.broker.clone();
        let queue = name.to_string();
        eventually(move || broker.consumer_count(&queue) == 1)
            .await
            .with_context(|| format!("{name} never started consuming"))?;
        Ok(client)
    }

    /// Attempt an upgrade and return the HTTP status of a refusal
    ///
    /// Returns `None` if the upgrade succeeded.
    pub async fn upgrade_status(&self, query: &str) -> Result<Option<u16>> {
        match tokio_tungstenite::connect_async(self.ws_url(query)).await {
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Http(response)) => Ok(Some(response.status().as_u16())),
            Err(e) => Err(e.into()),
        }
    }
}

/// A WebSocket client connected to the relay
pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a WebSocket URL
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;
        Ok(Self { stream })
    }

    /// Send a raw text frame
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a JSON value as a text frame
    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        self.send_text(&value.to_string()).await
    }

    /// Send a binary frame
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.stream.send(Message::Binary(data.to_vec())).await?;
        Ok(())
    }

    /// Receive the next data or close frame
    async fn next_frame(&mut self, wait: Duration) -> Result<Option<Message>> {
        loop {
            let next = match tokio::time::timeout(wait, self.stream.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(None),
            };

            match next {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(message)) => return Ok(Some(message)),
                Some(Err(e)) => return Err(e.into()),
                None => bail!("Connection ended without a close frame"),
            }
        }
    }

    /// Receive the next text frame as JSON
    pub async fn recv_json(&mut self) -> Result<Value> {
        match self.next_frame(RECV_TIMEOUT).await? {
            Some(Message::Text(text)) => Ok(serde_json::from_str(&text)?),
            Some(other) => bail!("Expected a text frame, got {other:?}"),
            None => bail!("No frame within {RECV_TIMEOUT:?}"),
        }
    }

    /// Check that nothing arrives for a while
    pub async fn expect_silence(&mut self, wait: Duration) -> Result<()> {
        match self.next_frame(wait).await? {
            None => Ok(()),
            Some(message) => bail!("Expected silence, got {message:?}"),
        }
    }

    /// Wait for the server's close frame and return its code
    pub async fn expect_close(&mut self) -> Result<u16> {
        match self.next_frame(RECV_TIMEOUT).await? {
            Some(Message::Close(Some(frame))) => Ok(u16::from(frame.code)),
            Some(other) => bail!("Expected a close frame, got {other:?}"),
            None => bail!("No close frame within {RECV_TIMEOUT:?}"),
        }
    }

    /// Close the connection from the client side
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

/// Poll a condition until it holds
pub async fn eventually<F>(condition: F) -> Result<()>
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            bail!("Condition not met within {SETTLE_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
