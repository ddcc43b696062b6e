//! Live capture monitor.
//!
//! Polls the camera on a fixed period, classifies the frame into a
//! [`FaceCount`], and publishes it over a `watch` channel. Ticks are
//! serialized: the detection call is awaited inside the loop, so a slow
//! tick delays the next one instead of overlapping it.

use crate::engine::FaceSource;
use facegate_core::FaceCount;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running monitor task.
pub struct CaptureMonitor {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CaptureMonitor {
    /// Start polling `source` every `period`, publishing into `counts`.
    pub fn spawn<S: FaceSource>(
        source: S,
        period: Duration,
        counts: watch::Sender<FaceCount>,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(?period, "capture monitor started");

            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        let count = match source.count_faces().await {
                            Ok(count) => count,
                            Err(e) => {
                                // A failed tick reads as "nobody in view";
                                // the next tick retries.
                                tracing::debug!(error = %e, "face count tick failed");
                                FaceCount::Zero
                            }
                        };
                        counts.send_replace(count);
                    }
                }
            }

            tracing::debug!("capture monitor stopped");
        });

        Self { stop, task }
    }

    /// Stop the monitor and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use facegate_core::Observation;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct ScriptedCounts {
        counts: Arc<Mutex<VecDeque<FaceCount>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        tick_delay: Option<Duration>,
    }

    impl FaceSource for ScriptedCounts {
        fn camera_available(&self) -> bool {
            true
        }

        async fn count_faces(&self) -> Result<FaceCount, EngineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.tick_delay {
                tokio::time::sleep(delay).await;
            }
            let count = self.counts.lock().unwrap().pop_front().unwrap_or(FaceCount::Zero);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(count)
        }

        async fn probe(&self) -> Result<Observation, EngineError> {
            Err(EngineError::CameraUnavailable)
        }

        async fn analyze(&self, _: Vec<u8>, _: u32, _: u32) -> Result<Observation, EngineError> {
            Err(EngineError::CameraUnavailable)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_classification_sequence() {
        let source = ScriptedCounts {
            counts: Arc::new(Mutex::new(
                vec![FaceCount::One, FaceCount::Many, FaceCount::Zero].into(),
            )),
            ..Default::default()
        };

        let (counts_tx, mut counts_rx) = watch::channel(FaceCount::Zero);
        let monitor = CaptureMonitor::spawn(source, Duration::from_millis(500), counts_tx);

        counts_rx.changed().await.unwrap();
        assert_eq!(*counts_rx.borrow(), FaceCount::One);

        counts_rx.changed().await.unwrap();
        assert_eq!(*counts_rx.borrow(), FaceCount::Many);

        counts_rx.changed().await.unwrap();
        assert_eq!(*counts_rx.borrow(), FaceCount::Zero);

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ticks_never_overlap() {
        // Detection takes 3x the poll period; serialized ticks mean at most
        // one count_faces call is ever in flight.
        let source = ScriptedCounts {
            counts: Arc::new(Mutex::new(vec![FaceCount::One; 8].into())),
            tick_delay: Some(Duration::from_millis(1500)),
            ..Default::default()
        };
        let max_in_flight = Arc::clone(&source.max_in_flight);

        let (counts_tx, _counts_rx) = watch::channel(FaceCount::Zero);
        let monitor = CaptureMonitor::spawn(source, Duration::from_millis(500), counts_tx);

        tokio::time::sleep(Duration::from_secs(10)).await;
        monitor.stop().await;

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_reads_as_zero() {
        #[derive(Clone)]
        struct FailingSource;

        impl FaceSource for FailingSource {
            fn camera_available(&self) -> bool {
                false
            }
            async fn count_faces(&self) -> Result<FaceCount, EngineError> {
                Err(EngineError::CameraUnavailable)
            }
            async fn probe(&self) -> Result<Observation, EngineError> {
                Err(EngineError::CameraUnavailable)
            }
            async fn analyze(&self, _: Vec<u8>, _: u32, _: u32) -> Result<Observation, EngineError> {
                Err(EngineError::CameraUnavailable)
            }
        }

        let (counts_tx, mut counts_rx) = watch::channel(FaceCount::One);
        let monitor = CaptureMonitor::spawn(FailingSource, Duration::from_millis(500), counts_tx);

        counts_rx.changed().await.unwrap();
        assert_eq!(*counts_rx.borrow(), FaceCount::Zero);

        monitor.stop().await;
    }
}
