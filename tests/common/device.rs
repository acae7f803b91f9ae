use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use holocontours::source::live::{OP_FETCH, OP_OPEN, STATUS_OK};
use holocontours::{ChannelKind, MemorySource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Scripted stand-in for the reconstruction device
#[derive(Clone, Default)]
pub struct FakeDevice {
    /// Hologram name accepted by OPEN
    pub hologram: String,
    /// Slices served by FETCH; anything else gets a non-zero status
    pub stack: MemorySource,
    /// FETCH at this depth never answers
    pub stall_depth: Option<f64>,
    /// FETCH at this depth sends a header and then hangs up
    pub truncate_depth: Option<f64>,
}

/// Run the device on a background thread and return its address
pub fn spawn_device(device: FakeDevice) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake device");
    let addr = listener.local_addr().expect("Failed to read device address");
    listener
        .set_nonblocking(true)
        .expect("Failed to make listener non-blocking");

    let device = Arc::new(device);
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("Failed to start device runtime");
        runtime.block_on(async move {
            let listener = TcpListener::from_std(listener).expect("Failed to adopt listener");
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&device)));
            }
        });
    });
    addr
}

/// An address nothing listens on
pub fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    listener.local_addr().expect("Failed to read address")
}

fn matches_depth(target: Option<f64>, depth: f64) -> bool {
    target.is_some_and(|t| (t - depth).abs() < 1e-9)
}

async fn serve(mut stream: TcpStream, device: Arc<FakeDevice>) -> std::io::Result<()> {
    loop {
        let op = stream.read_u8().await?;
        match op {
            OP_OPEN => {
                let len = stream.read_u32_le().await? as usize;
                let mut name = vec![0u8; len];
                stream.read_exact(&mut name).await?;
                let status = if name == device.hologram.as_bytes() {
                    STATUS_OK
                } else {
                    1
                };
                stream.write_u8(status).await?;
            }
            OP_FETCH => {
                let channel = stream.read_u8().await?;
                let depth = stream.read_f64_le().await?;

                if matches_depth(device.stall_depth, depth) {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    return Ok(());
                }

                let slice = ChannelKind::from_wire(channel)
                    .and_then(|channel| device.stack.slice(depth, channel));
                let Some(slice) = slice else {
                    stream.write_u8(2).await?;
                    continue;
                };

                let mut reply = vec![STATUS_OK];
                reply.extend_from_slice(&slice.width().to_le_bytes());
                reply.extend_from_slice(&slice.height().to_le_bytes());
                if matches_depth(device.truncate_depth, depth) {
                    reply.extend_from_slice(&[0u8; 6]);
                    stream.write_all(&reply).await?;
                    return Ok(());
                }
                for v in slice.data.as_raw() {
                    reply.extend_from_slice(&v.to_le_bytes());
                }
                stream.write_all(&reply).await?;
            }
            _ => return Ok(()),
        }
    }
}
