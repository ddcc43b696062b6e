use crate::engine::EngineHandle;
use crate::session::{AttemptOutcome, Session, SessionState};
use std::sync::Arc;
use zbus::interface;

/// D-Bus interface for the FaceGate authentication daemon.
///
/// Bus name: org.freedesktop.FaceGate1
/// Object path: /org/freedesktop/FaceGate1
pub struct FaceGateService {
    session: Arc<Session<EngineHandle>>,
}

impl FaceGateService {
    pub fn new(session: Arc<Session<EngineHandle>>) -> Self {
        Self { session }
    }
}

#[interface(name = "org.freedesktop.FaceGate1")]
impl FaceGateService {
    /// Run one authentication attempt.
    ///
    /// Returns (matched, label, distance, detail); `detail` carries the
    /// rejection or skip reason when `matched` is false.
    async fn authenticate(&self) -> zbus::fdo::Result<(bool, String, f64, String)> {
        tracing::info!("authenticate requested");
        Ok(match self.session.authenticate().await {
            AttemptOutcome::Authenticated(identity) => (
                true,
                identity.label,
                identity.distance as f64,
                "authenticated".to_string(),
            ),
            AttemptOutcome::Rejected(reason) => {
                (false, String::new(), 0.0, reason.to_string())
            }
            AttemptOutcome::Skipped(reason) => (false, String::new(), 0.0, reason.to_string()),
        })
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = self.session.state();
        let matched = match &state {
            SessionState::Authenticated(identity) => Some(identity.label.clone()),
            _ => None,
        };
        let detail = match &state {
            SessionState::Error(reason) => Some(reason.clone()),
            SessionState::Rejected(reason) => Some(reason.to_string()),
            _ => None,
        };

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "state": state.name(),
            "detail": detail,
            "camera": self.session.camera_available(),
            "faces_in_view": self.session.face_count().as_str(),
            "registered": self.session.registered_count().await,
            "matched": matched,
        })
        .to_string())
    }

    /// Latest live face-count classification ("zero", "one", "many").
    async fn face_count(&self) -> zbus::fdo::Result<String> {
        Ok(self.session.face_count().as_str().to_string())
    }
}
