//! Model readiness gate.
//!
//! Wraps the blocking engine bring-up (three ONNX sessions + camera) in an
//! async, idempotent `prepare()`. Success is cached; failure is latched and
//! re-reported without an automatic retry — restarting the session is the
//! only way out of a failed gate.

use crate::engine::EngineError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug, Clone)]
pub enum GateError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("model load timed out after {0:?}")]
    Timeout(Duration),
}

/// Blocking constructor for the engine, run on the blocking thread pool.
pub trait EngineLoader: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    fn load(&self) -> Result<Self::Handle, EngineError>;
}

enum GateState<H> {
    Idle,
    Ready(H),
    Failed(String),
}

/// Idempotent readiness gate over an [`EngineLoader`].
pub struct ModelGate<L: EngineLoader> {
    loader: Arc<L>,
    load_timeout: Option<Duration>,
    state: Mutex<GateState<L::Handle>>,
}

impl<L: EngineLoader> ModelGate<L> {
    pub fn new(loader: L, load_timeout: Option<Duration>) -> Self {
        Self {
            loader: Arc::new(loader),
            load_timeout,
            state: Mutex::new(GateState::Idle),
        }
    }

    /// Resolve the gate: load on first call, return the cached outcome after.
    ///
    /// Holding the state lock for the duration of the load means concurrent
    /// callers wait for the first load instead of racing a second one.
    pub async fn prepare(&self) -> Result<L::Handle, GateError> {
        let mut state = self.state.lock().await;

        match &*state {
            GateState::Ready(handle) => return Ok(handle.clone()),
            GateState::Failed(reason) => return Err(GateError::ModelLoad(reason.clone())),
            GateState::Idle => {}
        }

        let loader = Arc::clone(&self.loader);
        let load = tokio::task::spawn_blocking(move || loader.load());

        let joined = match self.load_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, load).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The blocking load keeps running detached; its eventual
                    // result is discarded.
                    let err = GateError::Timeout(timeout);
                    *state = GateState::Failed(err.to_string());
                    tracing::error!(?timeout, "model load timed out");
                    return Err(err);
                }
            },
            None => load.await,
        };

        match joined {
            Ok(Ok(handle)) => {
                *state = GateState::Ready(handle.clone());
                tracing::info!("model readiness gate resolved");
                Ok(handle)
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                tracing::error!(error = %reason, "model load failed");
                *state = GateState::Failed(reason.clone());
                Err(GateError::ModelLoad(reason))
            }
            Err(join_err) => {
                let reason = format!("model loader panicked: {join_err}");
                tracing::error!(error = %reason, "model load failed");
                *state = GateState::Failed(reason.clone());
                Err(GateError::ModelLoad(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: Arc<AtomicUsize>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl EngineLoader for CountingLoader {
        type Handle = u32;

        fn load(&self) -> Result<u32, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail {
                Err(EngineError::CameraUnavailable)
            } else {
                Ok(7)
            }
        }
    }

    fn loader(fail: bool, delay: Option<Duration>) -> (CountingLoader, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (CountingLoader { calls: Arc::clone(&calls), fail, delay }, calls)
    }

    #[tokio::test]
    async fn prepare_caches_success() {
        let (l, calls) = loader(false, None);
        let gate = ModelGate::new(l, None);

        assert_eq!(gate.prepare().await.unwrap(), 7);
        assert_eq!(gate.prepare().await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "loader must run exactly once");
    }

    #[tokio::test]
    async fn prepare_latches_failure_without_retry() {
        let (l, calls) = loader(true, None);
        let gate = ModelGate::new(l, None);

        assert!(gate.prepare().await.is_err());
        let second = gate.prepare().await;
        assert!(matches!(second, Err(GateError::ModelLoad(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "failure must not trigger a retry");
    }

    #[tokio::test]
    async fn prepare_times_out_slow_loads() {
        let (l, _calls) = loader(false, Some(Duration::from_millis(400)));
        let gate = ModelGate::new(l, Some(Duration::from_millis(10)));

        let first = gate.prepare().await;
        assert!(matches!(first, Err(GateError::Timeout(_))));

        // Timeout is latched like any other gate failure.
        let second = gate.prepare().await;
        assert!(matches!(second, Err(GateError::ModelLoad(_))));
    }
}
