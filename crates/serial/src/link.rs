use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{sleep, timeout};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, trace};

use crate::config::{ReadPolicy, SerialConfig};
use crate::probe::find_port;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no serial device matching {patterns:?}")]
    NotFound { patterns: Vec<String> },
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("serial connection closed")]
    Closed,
    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Byte-oriented line to the board.
#[async_trait]
pub trait DeviceLink: Send {
    /// Write a single command byte and wait for the board to settle.
    async fn send(&mut self, byte: u8) -> Result<(), LinkError>;

    /// Drop whatever the board already sent, so the next reply starts clean.
    /// Returns the number of bytes discarded.
    async fn discard_input(&mut self) -> Result<usize, LinkError>;

    /// Wait for one reply line within `policy`; `Ok(None)` when nothing arrived.
    async fn read_line(&mut self, policy: ReadPolicy) -> Result<Option<String>, LinkError>;

    fn port_name(&self) -> &str;
}

pub struct SerialLink<T = SerialStream> {
    port_name: String,
    stream: BufReader<T>,
    settle: Duration,
}

impl SerialLink<SerialStream> {
    /// Resolve the port (explicit or probed), open it 8N1 and wait for the board to boot.
    pub async fn open(config: &SerialConfig) -> Result<Self, LinkError> {
        let port = match &config.port {
            Some(port) => port.clone(),
            None => find_port(&config.descriptor_patterns).ok_or_else(|| LinkError::NotFound {
                patterns: config.descriptor_patterns.clone(),
            })?,
        };

        let stream = tokio_serial::new(&port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|source| LinkError::Open { port: port.clone(), source })?;

        sleep(config.open_settle).await;
        info!(%port, baud = config.baud_rate, "Serial device connected");
        Ok(Self::from_stream(port, stream, config.settle))
    }
}

impl<T> SerialLink<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn from_stream(port_name: impl Into<String>, stream: T, settle: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            stream: BufReader::new(stream),
            settle,
        }
    }
}

#[async_trait]
impl<T> DeviceLink for SerialLink<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn send(&mut self, byte: u8) -> Result<(), LinkError> {
        let port = self.stream.get_mut();
        port.write_all(&[byte]).await?;
        port.flush().await?;
        debug!(port = %self.port_name, byte = %char::from(byte), "Sent command byte");
        sleep(self.settle).await;
        Ok(())
    }

    async fn discard_input(&mut self) -> Result<usize, LinkError> {
        let mut dropped = 0;
        loop {
            // A zero timeout still polls the read once, so only already-buffered bytes are taken
            let available = match timeout(Duration::ZERO, self.stream.fill_buf()).await {
                Ok(Ok(buf)) => buf.len(),
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => break,
            };
            if available == 0 {
                break;
            }
            self.stream.consume(available);
            dropped += available;
        }
        if dropped > 0 {
            debug!(port = %self.port_name, dropped, "Discarded stale input");
        }
        Ok(dropped)
    }

    async fn read_line(&mut self, policy: ReadPolicy) -> Result<Option<String>, LinkError> {
        // Bytes from an interrupted attempt stay in `buf` and the next attempt continues the line
        let mut buf = Vec::new();
        for attempt in 1..=policy.attempts {
            match timeout(policy.interval, self.stream.read_until(b'\n', &mut buf)).await {
                Ok(Ok(0)) if buf.is_empty() => return Err(LinkError::Closed),
                Ok(Ok(_)) => {
                    let line = String::from_utf8_lossy(&buf).trim().to_string();
                    debug!(port = %self.port_name, attempt, %line, "Received line");
                    return Ok(Some(line));
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => trace!(port = %self.port_name, attempt, "No reply yet"),
            }
        }
        if !buf.is_empty() {
            debug!(port = %self.port_name, partial = %String::from_utf8_lossy(&buf), "Dropping incomplete line");
        }
        Ok(None)
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}
