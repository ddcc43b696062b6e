//! Inference engine thread.
//!
//! The ONNX sessions and the camera are owned by one dedicated OS thread;
//! async callers talk to it through a clone-safe [`EngineHandle`]. Model
//! load failures abort the spawn (fatal), a missing camera does not — the
//! engine then serves dataset analysis while live capture stays unavailable.

use facegate_core::{FaceCount, FacePipeline, ModelPaths, Observation, PipelineError};
use facegate_hw::{Camera, CameraError};
use std::future::Future;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera unavailable")]
    CameraUnavailable,
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// The detection collaborator seam.
///
/// The session, the capture monitor, and the priming loop all consume
/// detection through this trait; tests substitute a scripted source.
pub trait FaceSource: Clone + Send + Sync + 'static {
    /// Whether a live camera is attached to this source.
    fn camera_available(&self) -> bool;

    /// Capture a live frame and count faces (locator only).
    fn count_faces(&self) -> impl Future<Output = Result<FaceCount, EngineError>> + Send;

    /// Capture a live frame and run the full pipeline on it.
    fn probe(&self) -> impl Future<Output = Result<Observation, EngineError>> + Send;

    /// Run the full pipeline on a provided grayscale image.
    fn analyze(
        &self,
        data: Vec<u8>,
        width: u32,
        height: u32,
    ) -> impl Future<Output = Result<Observation, EngineError>> + Send;
}

/// Everything needed to bring the engine up.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_paths: ModelPaths,
    pub camera_device: String,
    /// Frames discarded after open for camera AGC/AE stabilization.
    pub warmup_frames: usize,
}

impl crate::gate::EngineLoader for EngineConfig {
    type Handle = EngineHandle;

    fn load(&self) -> Result<EngineHandle, EngineError> {
        spawn_engine(self)
    }
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    CountFaces {
        reply: oneshot::Sender<Result<FaceCount, EngineError>>,
    },
    Probe {
        reply: oneshot::Sender<Result<Observation, EngineError>>,
    },
    Analyze {
        data: Vec<u8>,
        width: u32,
        height: u32,
        reply: oneshot::Sender<Result<Observation, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    camera_ok: bool,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

impl FaceSource for EngineHandle {
    fn camera_available(&self) -> bool {
        self.camera_ok
    }

    async fn count_faces(&self) -> Result<FaceCount, EngineError> {
        self.request(|reply| EngineRequest::CountFaces { reply }).await
    }

    async fn probe(&self) -> Result<Observation, EngineError> {
        self.request(|reply| EngineRequest::Probe { reply }).await
    }

    async fn analyze(
        &self,
        data: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<Observation, EngineError> {
        self.request(|reply| EngineRequest::Analyze { data, width, height, reply })
            .await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads all three models (fail-fast: any failure aborts the spawn), then
/// opens the camera. Camera trouble is logged and tolerated — authentication
/// stays disabled upstream until a camera is present at the next start.
/// The camera is released when the last handle is dropped and the thread
/// drains its queue.
pub fn spawn_engine(config: &EngineConfig) -> Result<EngineHandle, EngineError> {
    let mut pipeline = FacePipeline::load(&config.model_paths)?;

    let camera = match Camera::open(&config.camera_device) {
        Ok(camera) => {
            tracing::info!(
                device = %config.camera_device,
                width = camera.width,
                height = camera.height,
                fourcc = ?camera.fourcc,
                "camera opened"
            );
            // Discard warmup frames for AGC/AE stabilization.
            if config.warmup_frames > 0 {
                tracing::info!(count = config.warmup_frames, "discarding warmup frames");
                for _ in 0..config.warmup_frames {
                    let _ = camera.capture_frame();
                }
            }
            Some(camera)
        }
        Err(e) => {
            tracing::warn!(
                device = %config.camera_device,
                error = %e,
                "camera unavailable; live capture disabled"
            );
            None
        }
    };

    let camera_ok = camera.is_some();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::CountFaces { reply } => {
                        let _ = reply.send(run_count(&camera, &mut pipeline));
                    }
                    EngineRequest::Probe { reply } => {
                        let _ = reply.send(run_probe(&camera, &mut pipeline));
                    }
                    EngineRequest::Analyze { data, width, height, reply } => {
                        let _ = reply.send(
                            pipeline.observe(&data, width, height).map_err(EngineError::from),
                        );
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx, camera_ok })
}

/// Capture one frame and count faces with the locator.
fn run_count(
    camera: &Option<Camera>,
    pipeline: &mut FacePipeline,
) -> Result<FaceCount, EngineError> {
    let camera = camera.as_ref().ok_or(EngineError::CameraUnavailable)?;
    let frame = camera.capture_frame()?;
    Ok(pipeline.count_faces(&frame.data, frame.width, frame.height)?)
}

/// Capture one frame and run the full pipeline on it.
fn run_probe(
    camera: &Option<Camera>,
    pipeline: &mut FacePipeline,
) -> Result<Observation, EngineError> {
    let camera = camera.as_ref().ok_or(EngineError::CameraUnavailable)?;
    let frame = camera.capture_frame()?;

    if frame.is_dark {
        // Poor lighting dominates recognition failures; make it visible.
        tracing::warn!(
            brightness = frame.avg_brightness(),
            "captured frame is dark; check lighting"
        );
    }

    Ok(pipeline.observe(&frame.data, frame.width, frame.height)?)
}
