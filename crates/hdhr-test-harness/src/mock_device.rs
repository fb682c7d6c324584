//! Scripted device speaking the packet protocol over loopback TCP.
//!
//! [`MockDevice`] binds `127.0.0.1:0`, accepts any number of
//! connections, and answers get/set requests from a table of variables.
//! Unknown variables get the same `unknown getset variable` error a real
//! device returns, which is what ends tuner enumeration.
//!
//! # Example
//!
//! ```
//! use hdhr_test_harness::MockDevice;
//!
//! # async fn example() -> hdhr_core::Result<()> {
//! let device = MockDevice::new()
//!     .variable("/sys/model", "hdhomerun4_atsc")
//!     .error("/tuner0/debug", "resource locked")
//!     .start()
//!     .await?;
//!
//! // Connect a client to `device.addr()` ...
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hdhr_core::error::{Error, Result, UNKNOWN_GETSET_VARIABLE};
use hdhr_protocol::consts::{
    HEADER_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, TAG_ERROR_MESSAGE, TAG_GETSET_NAME,
    TAG_GETSET_VALUE, TYPE_GETSET_REQ, TYPE_GETSET_RPY,
};
use hdhr_protocol::{Packet, nul_str, nul_terminated};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How the device answers one variable.
#[derive(Debug, Clone)]
enum Answer {
    Value(String),
    Error(String),
}

type Variables = Arc<Mutex<HashMap<String, Answer>>>;

/// Builder for a [`RunningMockDevice`].
#[derive(Debug, Default)]
pub struct MockDevice {
    variables: HashMap<String, Answer>,
    rename: HashMap<String, String>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `name` with `value`.
    pub fn variable(mut self, name: &str, value: &str) -> Self {
        self.variables
            .insert(name.to_string(), Answer::Value(value.to_string()));
        self
    }

    /// Answer `name` with an error message (the `ERROR: ` prefix is added).
    pub fn error(mut self, name: &str, message: &str) -> Self {
        self.variables
            .insert(name.to_string(), Answer::Error(message.to_string()));
        self
    }

    /// Echo `echoed` instead of `name` in replies to `name`, as a confused
    /// device would.
    pub fn echo_as(mut self, name: &str, echoed: &str) -> Self {
        self.rename.insert(name.to_string(), echoed.to_string());
        self
    }

    /// Answer every `/tunerN/debug` for `N < count` with `debug`.
    pub fn tuners(mut self, count: usize, debug: &str) -> Self {
        for i in 0..count {
            self.variables
                .insert(format!("/tuner{i}/debug"), Answer::Value(debug.to_string()));
        }
        self
    }

    /// Bind a loopback listener and start serving.
    pub async fn start(self) -> Result<RunningMockDevice> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock device: {}", e)))?;
        let addr = listener.local_addr()?;

        let variables: Variables = Arc::new(Mutex::new(self.variables));
        let rename = Arc::new(self.rename);
        let requests = Arc::new(AtomicUsize::new(0));

        tracing::debug!(addr = %addr, "Mock device listening");

        let task = {
            let variables = variables.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, peer)) = listener.accept().await else {
                        break;
                    };
                    tracing::debug!(peer = %peer, "Mock device accepted connection");
                    tokio::spawn(serve(
                        stream,
                        variables.clone(),
                        rename.clone(),
                        requests.clone(),
                    ));
                }
            })
        };

        Ok(RunningMockDevice {
            addr,
            variables,
            requests,
            task,
        })
    }
}

/// A mock device serving on loopback. Stops when dropped.
#[derive(Debug)]
pub struct RunningMockDevice {
    addr: SocketAddr,
    variables: Variables,
    requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl RunningMockDevice {
    /// The address clients should connect to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of get/set requests answered so far, across connections.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Current value of `name`, including anything written by a client.
    pub async fn value(&self, name: &str) -> Option<String> {
        match self.variables.lock().await.get(name) {
            Some(Answer::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }
}

impl Drop for RunningMockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Answer requests on one connection until the client goes away.
async fn serve(
    mut stream: TcpStream,
    variables: Variables,
    rename: Arc<HashMap<String, String>>,
    requests: Arc<AtomicUsize>,
) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        let request = match read_packet(&mut stream, &mut buf).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Mock device dropping connection");
                return;
            }
        };

        let reply = answer(&request, &variables, &rename).await;
        requests.fetch_add(1, Ordering::SeqCst);

        let bytes = match reply.encode() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "Mock device failed to encode reply");
                return;
            }
        };
        if stream.write_all(&bytes).await.is_err() {
            return;
        }
    }
}

/// Read one whole packet, or `None` on a clean disconnect.
async fn read_packet(stream: &mut TcpStream, buf: &mut [u8]) -> Result<Option<Packet>> {
    if stream.read(&mut buf[..1]).await? == 0 {
        return Ok(None);
    }
    stream.read_exact(&mut buf[1..HEADER_SIZE]).await?;

    let payload_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let len = MIN_PACKET_SIZE + payload_len;
    if len > buf.len() {
        return Err(Error::Protocol(format!("request of {len} bytes too large")));
    }
    stream.read_exact(&mut buf[HEADER_SIZE..len]).await?;

    Ok(Some(Packet::decode(&buf[..len])?))
}

async fn answer(
    request: &Packet,
    variables: &Variables,
    rename: &HashMap<String, String>,
) -> Packet {
    if request.packet_type != TYPE_GETSET_REQ {
        return error_reply(None, "invalid packet type");
    }
    let Some(name) = request.find_tag(TAG_GETSET_NAME).map(nul_str) else {
        return error_reply(None, "missing getset name");
    };

    let mut variables = variables.lock().await;
    if let Some(value) = request.find_tag(TAG_GETSET_VALUE).map(nul_str) {
        variables.insert(name.clone(), Answer::Value(value));
    }

    let echoed: &str = rename.get(&name).map(String::as_str).unwrap_or(&name);
    match variables.get(&name) {
        Some(Answer::Value(value)) => Packet::new(TYPE_GETSET_RPY)
            .with_tag(TAG_GETSET_NAME, nul_terminated(echoed))
            .with_tag(TAG_GETSET_VALUE, nul_terminated(value)),
        Some(Answer::Error(message)) => error_reply(Some(echoed), message),
        None => error_reply(Some(echoed), UNKNOWN_GETSET_VARIABLE),
    }
}

fn error_reply(name: Option<&str>, message: &str) -> Packet {
    let mut reply = Packet::new(TYPE_GETSET_RPY);
    if let Some(name) = name {
        reply = reply.with_tag(TAG_GETSET_NAME, nul_terminated(name));
    }
    reply.with_tag(
        TAG_ERROR_MESSAGE,
        nul_terminated(&format!("ERROR: {message}")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdhr_protocol::Client;
    use hdhr_transport::TcpTransport;

    async fn connect(device: &RunningMockDevice) -> Client {
        let transport = TcpTransport::connect(&device.addr().to_string())
            .await
            .unwrap();
        Client::new(transport)
    }

    #[tokio::test]
    async fn answers_known_variable() {
        let device = MockDevice::new()
            .variable("/sys/model", "hdhomerun3_cablecard")
            .start()
            .await
            .unwrap();
        let client = connect(&device).await;

        assert_eq!(client.model().await.unwrap(), "hdhomerun3_cablecard");
        assert_eq!(device.requests(), 1);
    }

    #[tokio::test]
    async fn unknown_variable_is_not_exist() {
        let device = MockDevice::new().start().await.unwrap();
        let client = connect(&device).await;

        let err = client.query("/sys/nope").await.unwrap_err();
        assert!(err.is_not_exist(), "got {err:?}");
    }

    #[tokio::test]
    async fn set_updates_variable() {
        let device = MockDevice::new()
            .variable("/tuner0/channel", "none")
            .start()
            .await
            .unwrap();
        let client = connect(&device).await;

        let echoed = client.set("/tuner0/channel", "auto:7").await.unwrap();
        assert_eq!(echoed, b"auto:7\0");
        assert_eq!(
            device.value("/tuner0/channel").await.as_deref(),
            Some("auto:7")
        );
    }

    #[tokio::test]
    async fn serves_multiple_connections() {
        let device = MockDevice::new()
            .variable("/sys/model", "hdhomerun4_atsc")
            .start()
            .await
            .unwrap();

        for _ in 0..3 {
            let client = connect(&device).await;
            assert_eq!(client.model().await.unwrap(), "hdhomerun4_atsc");
        }
        assert_eq!(device.requests(), 3);
    }
}
