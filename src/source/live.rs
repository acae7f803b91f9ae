use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};

use super::{ChannelKind, DepthImage, ImageSource};
use crate::error::SourceError;

/// Request opcode: open a hologram by name
pub const OP_OPEN: u8 = 1;
/// Request opcode: reconstruct one depth and channel
pub const OP_FETCH: u8 = 2;
/// Response status for success; anything else is a refusal
pub const STATUS_OK: u8 = 0;

// Upper bound on samples in one reply, rejects corrupt headers before allocating
const MAX_SAMPLES: usize = 1 << 28;

enum FetchReply {
    Refused(u8),
    Image {
        width: u32,
        height: u32,
        samples: Vec<f32>,
    },
}

/// Blocking client for a device that reconstructs depth slices on demand.
///
/// Owns a current-thread tokio runtime; every request is bounded by the
/// configured timeout and failures are reported without retrying.
pub struct LiveClient {
    address: String,
    timeout: Duration,
    // declared before the runtime so it is dropped first
    stream: Option<TcpStream>,
    location: Option<String>,
    runtime: Runtime,
}

impl LiveClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to start I/O runtime: {e}")))?;
        Ok(Self {
            address: address.into(),
            timeout,
            stream: None,
            location: None,
            runtime,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect and send OPEN; a refusal is reported as `Ok(Err(status))`
    fn handshake(&self, location: &str) -> io::Result<Result<TcpStream, u8>> {
        let timeout = self.timeout;
        let address = self.address.as_str();
        self.runtime.block_on(async move {
            let mut stream = with_timeout(timeout, TcpStream::connect(address)).await?;
            stream.set_nodelay(true)?;
            let status = with_timeout(timeout, request_open(&mut stream, location)).await?;
            Ok(if status == STATUS_OK {
                Ok(stream)
            } else {
                Err(status)
            })
        })
    }
}

impl ImageSource for LiveClient {
    fn open(&mut self, location: &str) -> Result<(), SourceError> {
        self.stream = None;
        self.location = None;

        match self.handshake(location) {
            Ok(Ok(stream)) => {
                log::info!("device at {} opened {:?}", self.address, location);
                self.stream = Some(stream);
                self.location = Some(location.to_string());
                Ok(())
            }
            Ok(Err(status)) => Err(SourceError::Unavailable(format!(
                "device at {} refused {:?} (status {status})",
                self.address, location
            ))),
            Err(e) => Err(SourceError::Unavailable(format!(
                "cannot reach device at {}: {e}",
                self.address
            ))),
        }
    }

    fn fetch(&mut self, depth: f64, channel: ChannelKind) -> Result<DepthImage, SourceError> {
        let Some(location) = self.location.clone() else {
            return Err(SourceError::NotOpened);
        };

        // a previous failure left the stream mid-frame; start a fresh session
        if self.stream.is_none() {
            let stream = match self.handshake(&location) {
                Ok(Ok(stream)) => stream,
                Ok(Err(status)) => {
                    return Err(SourceError::retrieval(
                        depth,
                        channel,
                        format!("device refused reopen (status {status})"),
                    ));
                }
                Err(e) => {
                    return Err(SourceError::retrieval(depth, channel, format!("reconnect failed: {e}")));
                }
            };
            log::debug!("reconnected to {}", self.address);
            self.stream = Some(stream);
        }

        let timeout = self.timeout;
        let reply = match self.stream.as_mut() {
            Some(stream) => self.runtime.block_on(with_timeout(
                timeout,
                request_fetch(stream, depth, channel),
            )),
            None => return Err(SourceError::NotOpened),
        };

        match reply {
            Ok(FetchReply::Image {
                width,
                height,
                samples,
            }) => DepthImage::from_raw(depth, channel, width, height, samples).ok_or_else(|| {
                SourceError::retrieval(depth, channel, "sample count does not match dimensions")
            }),
            Ok(FetchReply::Refused(status)) => Err(SourceError::retrieval(
                depth,
                channel,
                format!("device returned status {status}"),
            )),
            Err(e) => {
                self.stream = None;
                Err(SourceError::retrieval(depth, channel, e.to_string()))
            }
        }
    }

    fn is_live(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "live"
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no reply within {timeout:?}"),
        )),
    }
}

async fn request_open(stream: &mut TcpStream, location: &str) -> io::Result<u8> {
    let name = location.as_bytes();
    let len = u32::try_from(name.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "location too long"))?;

    let mut frame = Vec::with_capacity(5 + name.len());
    frame.push(OP_OPEN);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(name);
    stream.write_all(&frame).await?;
    stream.read_u8().await
}

async fn request_fetch(
    stream: &mut TcpStream,
    depth: f64,
    channel: ChannelKind,
) -> io::Result<FetchReply> {
    let mut frame = Vec::with_capacity(10);
    frame.push(OP_FETCH);
    frame.push(channel.to_wire());
    frame.extend_from_slice(&depth.to_le_bytes());
    stream.write_all(&frame).await?;

    let status = stream.read_u8().await?;
    if status != STATUS_OK {
        return Ok(FetchReply::Refused(status));
    }

    let width = stream.read_u32_le().await?;
    let height = stream.read_u32_le().await?;
    let count = (width as usize)
        .checked_mul(height as usize)
        .filter(|&n| n <= MAX_SAMPLES)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible slice size {width}x{height}"),
            )
        })?;

    let mut raw = vec![0u8; count * 4];
    stream.read_exact(&mut raw).await?;
    let samples = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(FetchReply::Image {
        width,
        height,
        samples,
    })
}
