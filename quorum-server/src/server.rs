use crate::router;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use quorum_core::{
    ipc::{QuorumRequest, QuorumResponse},
    QuorumConfig,
};
use sqlx::PgPool;
use std::path::Path;
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Wire format: 4-byte little-endian length prefix + MessagePack payload.
fn le_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

async fn send_response(
    framed_write: &mut FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    response: &QuorumResponse,
) -> bool {
    match rmp_serde::to_vec_named(response) {
        Ok(bytes) => {
            if let Err(e) = framed_write.send(Bytes::from(bytes)).await {
                tracing::error!("Failed to send response: {}", e);
                return false;
            }
            true
        }
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            false
        }
    }
}

/// Serve one client until it disconnects or a frame fails.
async fn handle_connection(stream: UnixStream, pool: PgPool, config: QuorumConfig) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let request: QuorumRequest = match rmp_serde::from_slice(&bytes) {
            Ok(req) => req,
            Err(e) => {
                let resp = QuorumResponse::err(format!("Deserialization error: {}", e));
                if !send_response(&mut framed_write, &resp).await {
                    break;
                }
                continue;
            }
        };

        let response =
            router::handle_request_with_config(request, &pool, Some(config.clone())).await;
        if !send_response(&mut framed_write, &response).await {
            break;
        }
    }
}

pub async fn run_unix_server(
    socket_path: &str,
    pool: PgPool,
    config: QuorumConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                tokio::spawn(handle_connection(stream, pool.clone(), config.clone()));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}
