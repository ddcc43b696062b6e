//! Authentication session state machine.
//!
//! Owns the session state and the descriptor store, and ties together
//! gate → priming → repeated authenticate attempts. State is published
//! through a `watch` channel so the presentation layer only ever sees
//! read-only snapshots; the face-count classification arrives the same way
//! from the capture monitor.

use crate::dataset::DatasetEntry;
use crate::engine::FaceSource;
use crate::gate::GateError;
use crate::store::DescriptorStore;
use facegate_core::{FaceCount, Matcher, NearestMatcher, Observation};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::{watch, RwLock};

/// Identity surfaced to the presentation layer on success.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedIdentity {
    pub label: String,
    pub display: Option<String>,
    pub distance: f32,
}

/// Why an attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The captured frame had no detectable face (it changed between the
    /// monitor tick and the capture).
    NoFaceAtCapture,
    /// The captured frame had more than one face.
    MultipleFacesAtCapture,
    /// A descriptor was extracted but nothing in the store is close enough.
    NoMatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::NoFaceAtCapture => "no-face-at-capture",
            RejectReason::MultipleFacesAtCapture => "multiple-faces-at-capture",
            RejectReason::NoMatch => "no-match",
        })
    }
}

/// Why a trigger never turned into an attempt (a guard, not an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotReady,
    CameraUnavailable,
    /// The live classification is not exactly one face.
    FacesInView(FaceCount),
    SessionClosed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NotReady => "not-ready",
            SkipReason::CameraUnavailable => "camera-unavailable",
            SkipReason::FacesInView(_) => "not-exactly-one-face",
            SkipReason::SessionClosed => "session-closed",
        })
    }
}

/// Result of one authenticate trigger.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Skipped(SkipReason),
    Authenticated(AuthenticatedIdentity),
    Rejected(RejectReason),
}

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    ModelsLoading,
    Priming,
    Ready,
    Capturing,
    Matching,
    Authenticated(AuthenticatedIdentity),
    Rejected(RejectReason),
    /// Terminal; only a full restart leaves this state.
    Error(String),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::ModelsLoading => "models-loading",
            SessionState::Priming => "priming",
            SessionState::Ready => "ready",
            SessionState::Capturing => "capturing",
            SessionState::Matching => "matching",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Rejected(_) => "rejected",
            SessionState::Error(_) => "error",
        }
    }

    /// An attempt may begin from Ready or from a previous outcome; the
    /// session is reusable without re-priming.
    fn may_attempt(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Authenticated(_) | SessionState::Rejected(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error("session already started")]
    AlreadyStarted,
    #[error(transparent)]
    Gate(#[from] GateError),
}

/// The authentication session.
pub struct Session<S: FaceSource> {
    threshold: f32,
    state: watch::Sender<SessionState>,
    face_count: watch::Receiver<FaceCount>,
    store: RwLock<DescriptorStore>,
    source: OnceLock<S>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl<S: FaceSource> Session<S> {
    /// Create a session that reads live face counts from `face_count`.
    pub fn new(threshold: f32, face_count: watch::Receiver<FaceCount>) -> Self {
        let (state, _) = watch::channel(SessionState::ModelsLoading);
        Self {
            threshold,
            state,
            face_count,
            store: RwLock::new(DescriptorStore::new()),
            source: OnceLock::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Latest live face-count classification.
    pub fn face_count(&self) -> FaceCount {
        *self.face_count.borrow()
    }

    pub fn camera_available(&self) -> bool {
        self.source.get().map(S::camera_available).unwrap_or(false)
    }

    pub async fn registered_count(&self) -> usize {
        self.store.read().await.len()
    }

    /// Drive the session to Ready: resolve the readiness gate, then prime
    /// the store from the dataset. A gate failure is terminal — the session
    /// lands in `Error` and stays there.
    ///
    /// Returns the resolved detection source so the caller can hand it to
    /// the capture monitor.
    pub async fn start<F>(&self, prepare: F, entries: Vec<DatasetEntry>) -> Result<S, StartError>
    where
        F: Future<Output = Result<S, GateError>>,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartError::AlreadyStarted);
        }

        self.state.send_replace(SessionState::ModelsLoading);
        let source = match prepare.await {
            Ok(source) => source,
            Err(e) => {
                self.state.send_replace(SessionState::Error(e.to_string()));
                return Err(e.into());
            }
        };

        self.state.send_replace(SessionState::Priming);
        {
            let mut store = self.store.write().await;
            match store.prime(&source, &entries).await {
                Ok(count) => tracing::info!(registered = count, "descriptor store primed"),
                Err(e) => tracing::warn!(error = %e, "priming refused"),
            }
        }

        let _ = self.source.set(source.clone());
        self.state.send_replace(SessionState::Ready);
        tracing::info!("session ready");
        Ok(source)
    }

    /// One authenticate trigger: guard, capture, extract, match, publish.
    pub async fn authenticate(&self) -> AttemptOutcome {
        if self.closed.load(Ordering::SeqCst) {
            return AttemptOutcome::Skipped(SkipReason::SessionClosed);
        }
        let Some(source) = self.source.get() else {
            return AttemptOutcome::Skipped(SkipReason::NotReady);
        };
        if !source.camera_available() {
            return AttemptOutcome::Skipped(SkipReason::CameraUnavailable);
        }
        let count = self.face_count();
        if count != FaceCount::One {
            return AttemptOutcome::Skipped(SkipReason::FacesInView(count));
        }

        // Atomic guard-and-transition: concurrent triggers cannot both enter.
        let entered = self.state.send_if_modified(|state| {
            if state.may_attempt() {
                *state = SessionState::Capturing;
                true
            } else {
                false
            }
        });
        if !entered {
            return AttemptOutcome::Skipped(SkipReason::NotReady);
        }

        let outcome = match source.probe().await {
            Err(e) => {
                tracing::warn!(error = %e, "capture failed during attempt");
                self.publish(SessionState::Ready);
                return AttemptOutcome::Skipped(SkipReason::CameraUnavailable);
            }
            Ok(Observation::NoFace) => AttemptOutcome::Rejected(RejectReason::NoFaceAtCapture),
            Ok(Observation::ManyFaces(faces)) => {
                tracing::debug!(faces, "frame gained faces between tick and capture");
                AttemptOutcome::Rejected(RejectReason::MultipleFacesAtCapture)
            }
            Ok(Observation::OneFace(probe)) => {
                self.publish(SessionState::Matching);
                let store = self.store.read().await;
                let result = NearestMatcher.compare(&probe, store.identities(), self.threshold);
                match result.identity {
                    Some(identity) => AttemptOutcome::Authenticated(AuthenticatedIdentity {
                        label: identity.label,
                        display: identity.display,
                        distance: result.distance,
                    }),
                    None => {
                        tracing::info!(distance = result.distance, "no identity within threshold");
                        AttemptOutcome::Rejected(RejectReason::NoMatch)
                    }
                }
            }
        };

        // An attempt that outlived teardown completes but is discarded
        // rather than written into the closed session.
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!("attempt finished after teardown; result discarded");
            return AttemptOutcome::Skipped(SkipReason::SessionClosed);
        }

        match &outcome {
            AttemptOutcome::Authenticated(identity) => {
                tracing::info!(label = %identity.label, distance = identity.distance, "authenticated");
                self.publish(SessionState::Authenticated(identity.clone()));
            }
            AttemptOutcome::Rejected(reason) => {
                tracing::info!(reason = %reason, "attempt rejected");
                self.publish(SessionState::Rejected(*reason));
            }
            AttemptOutcome::Skipped(_) => unreachable!("skips return early"),
        }

        outcome
    }

    /// Tear the session down. In-flight attempts finish and discard.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("session closed");
    }

    fn publish(&self, state: SessionState) {
        if !self.closed.load(Ordering::SeqCst) {
            self.state.send_replace(state);
        }
    }
}
