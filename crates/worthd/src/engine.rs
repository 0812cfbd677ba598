use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use worth_core::{Embedder, FaceNormalizer, PredictError, PredictionResult, Predictor};

/// Pending predictions allowed to queue before callers wait for capacity.
pub const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Predict {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<PredictionResult, PredictError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one prediction on the engine thread.
    pub async fn predict(&self, image: Vec<u8>) -> Result<PredictionResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Predict {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// False once the engine thread has exited, e.g. after a panic.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// A handle whose engine thread is already gone.
    #[cfg(test)]
    pub(crate) fn closed() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the predictor, so inference sessions are only ever
/// touched by one request at a time. It exits once every handle is dropped.
pub fn spawn_engine<N, E>(
    mut predictor: Predictor<N, E>,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError>
where
    N: FaceNormalizer + Send + 'static,
    E: Embedder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("worth-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Predict { image, reply } => {
                        let started = std::time::Instant::now();
                        let result = predictor.predict(&image);
                        tracing::debug!(
                            bytes = image.len(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            ok = result.is_ok(),
                            "engine: prediction finished"
                        );
                        // Receiver gone means the request timed out or was cancelled.
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
