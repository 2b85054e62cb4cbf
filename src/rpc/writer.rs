//! Connection writer task.
//!
//! Drains the peer's outbound queue and writes each [`Message`] as one
//! `Content-Length` frame. All writes for a connection go through this single
//! task, so frames are never interleaved.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::codec::ContentLengthCodec;
use crate::rpc::peer::Outbound;
use crate::Result;

/// Writer task: frames outbound messages onto `writer` until stopped.
///
/// The task exits cleanly when:
/// - `stop` is triggered (connection teardown or `exit`), or
/// - every sender of the outbound queue has been dropped.
///
/// Messages already queued when `stop` fires are still written, so a
/// response produced before `exit` reaches the peer. Nothing queued after
/// that point is written.
///
/// # Errors
///
/// Returns [`AppError::Io`](crate::AppError::Io) if a write or flush fails
/// (e.g. the remote side closed its read end).
pub(crate) async fn run_writer<W>(
    label: String,
    writer: W,
    outbound: Outbound,
    stop: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut framed = FramedWrite::new(writer, ContentLengthCodec::new());
    let Outbound(mut msg_rx) = outbound;

    loop {
        tokio::select! {
            biased;

            () = stop.cancelled() => {
                debug!(label, "rpc writer: stop requested");
                while let Ok(message) = msg_rx.try_recv() {
                    framed.send(message).await?;
                }
                break;
            }

            msg = msg_rx.recv() => {
                let Some(message) = msg else {
                    debug!(label, "rpc writer: outbound queue closed");
                    break;
                };
                // `send` flushes, so every frame reaches the transport before the next one.
                framed.send(message).await.map_err(|e| {
                    warn!(label, error = %e, "rpc writer: write failed");
                    e
                })?;
            }
        }
    }

    Ok(())
}
