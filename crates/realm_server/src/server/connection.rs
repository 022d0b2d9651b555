//! Per-connection tasks.
//!
//! Every accepted connection gets a reader, which decodes and handles frames
//! one at a time, and a writer, which drains the session's outbound queue to
//! the socket. Either side ending tears the session down. After teardown the
//! writer gets a short grace period to flush what is queued; a writer still
//! blocked on the socket after that is aborted, which closes the socket.

use crate::bootstrap::SessionBootstrap;
use crate::config::ServerConfig;
use crate::connection::Session;
use crate::context::{HandlerContext, ServerContext};
use crate::dispatch::{DispatchOutcome, DispatchTable};
use crate::error::ServerError;
use bytes::Bytes;
use realm_protocol::{FrameReader, FrameWriter};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// How long a torn-down connection's writer may keep flushing.
pub const WRITER_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Per-connection limits taken from [`ServerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_frame_payload: usize,
    pub max_decode_failures: u32,
    pub drain_grace: Duration,
}

impl From<&ServerConfig> for ConnectionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_frame_payload: config.max_frame_payload,
            max_decode_failures: config.max_decode_failures.max(1),
            drain_grace: WRITER_DRAIN_GRACE,
        }
    }
}

/// Runs one connection from bootstrap to teardown.
///
/// `session` must already be registered with the manager in `server`.
pub async fn handle_connection<S>(
    stream: S,
    session: Arc<Session>,
    outbound: mpsc::Receiver<Bytes>,
    server: Arc<ServerContext>,
    dispatch: Arc<DispatchTable>,
    bootstrap: Arc<dyn SessionBootstrap>,
    limits: ConnectionLimits,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);

    let mut writer = tokio::spawn(write_frames(
        FrameWriter::new(write_half),
        outbound,
        session.clone(),
        server.clone(),
    ));

    let result = read_frames(
        FrameReader::new(read_half).max_payload_len(limits.max_frame_payload),
        &session,
        &server,
        &dispatch,
        bootstrap.as_ref(),
        limits,
    )
    .await;

    server.manager.teardown(&session, server.world.as_ref());
    match tokio::time::timeout(limits.drain_grace, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Writer task for connection {} panicked: {}", session.id(), e),
        Err(_) => {
            debug!(
                "Writer for connection {} still blocked after {:?}, dropping socket",
                session.id(),
                limits.drain_grace
            );
            writer.abort();
            let _ = writer.await;
        }
    }
    result
}

async fn read_frames<R>(
    mut reader: FrameReader<R>,
    session: &Arc<Session>,
    server: &Arc<ServerContext>,
    dispatch: &DispatchTable,
    bootstrap: &dyn SessionBootstrap,
    limits: ConnectionLimits,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
{
    let entity = bootstrap.bootstrap(session).await?;
    if let Err(e) = server.manager.attach_entity(session, entity) {
        server.world.detach(entity);
        return Err(e);
    }

    let ctx = HandlerContext::new(session.clone(), server.clone());
    loop {
        let frame = tokio::select! {
            _ = session.closed() => {
                trace!("Connection {} closed while reading", session.id());
                return Ok(());
            }
            read = reader.read_frame() => match read {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("🔌 Client {} disconnected", session.id());
                    return Ok(());
                }
                Err(e) => {
                    return Err(ServerError::Network(format!(
                        "read from connection {} failed: {e}",
                        session.id()
                    )));
                }
            },
        };

        match dispatch.dispatch(&ctx, &frame) {
            DispatchOutcome::Handled | DispatchOutcome::Rejected(_) => {
                session.stats().record_handled();
                session.reset_decode_failures();
            }
            DispatchOutcome::UnknownOpcode { .. } | DispatchOutcome::RevisionMismatch { .. } => {
                session.stats().record_unknown_opcode();
            }
            DispatchOutcome::DecodeFailed(e) => {
                let failures = session.record_decode_failure();
                if failures >= limits.max_decode_failures {
                    warn!(
                        "Closing connection {} after {} consecutive undecodable frames (last: {})",
                        session.id(),
                        failures,
                        e
                    );
                    return Ok(());
                }
            }
        }
    }
}

async fn write_frames<W>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::Receiver<Bytes>,
    session: Arc<Session>,
    server: Arc<ServerContext>,
) where
    W: AsyncWrite + Unpin,
{
    let result = async {
        while let Some(frame) = outbound.recv().await {
            writer.write_encoded(&frame).await?;
            if outbound.is_empty() {
                writer.flush().await?;
            }
        }
        writer.shutdown().await
    }
    .await;

    if let Err(e) = result {
        debug!("Write to connection {} failed: {}", session.id(), e);
        server.manager.teardown(&session, server.world.as_ref());
    }
}
