//! Descriptor store and dataset priming.
//!
//! The store holds the registered identities for the lifetime of the
//! session. Priming runs at most once, strictly after the readiness gate
//! resolves, and treats every bad dataset entry as a skip — an unreadable
//! image, a crowd shot, or an empty frame costs one identity, never the
//! whole store.

use crate::dataset::{self, DatasetEntry};
use crate::engine::FaceSource;
use facegate_core::{Observation, RegisteredIdentity};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("descriptor store is already primed")]
    AlreadyPrimed,
}

/// In-memory set of registered identities, in dataset order.
#[derive(Default)]
pub struct DescriptorStore {
    identities: Vec<RegisteredIdentity>,
    primed: bool,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn identities(&self) -> &[RegisteredIdentity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Build the store from the dataset, one entry at a time, in order.
    ///
    /// An entry registers only when its image yields exactly one face.
    /// Returns the number of identities registered; zero is legal (the
    /// caller surfaces it as a warning state, not a failure).
    pub async fn prime<S: FaceSource>(
        &mut self,
        source: &S,
        entries: &[DatasetEntry],
    ) -> Result<usize, StoreError> {
        if self.primed {
            return Err(StoreError::AlreadyPrimed);
        }
        self.primed = true;

        for entry in entries {
            if self.identities.iter().any(|i| i.label == entry.label) {
                tracing::warn!(label = %entry.label, "duplicate label in dataset; skipped");
                continue;
            }

            let (data, width, height) = match dataset::load_grayscale(&entry.image) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(
                        label = %entry.label,
                        image = %entry.image.display(),
                        error = %e,
                        "dataset image unreadable; skipped"
                    );
                    continue;
                }
            };

            match source.analyze(data, width, height).await {
                Ok(Observation::OneFace(descriptor)) => {
                    tracing::debug!(label = %entry.label, "identity registered");
                    self.identities.push(RegisteredIdentity {
                        label: entry.label.clone(),
                        descriptor,
                        display: entry
                            .display
                            .as_ref()
                            .map(|p| p.to_string_lossy().into_owned()),
                    });
                }
                Ok(Observation::NoFace) => {
                    tracing::warn!(label = %entry.label, "no face in dataset image; skipped");
                }
                Ok(Observation::ManyFaces(count)) => {
                    tracing::warn!(
                        label = %entry.label,
                        count,
                        "multiple faces in dataset image; skipped"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        label = %entry.label,
                        error = %e,
                        "dataset image analysis failed; skipped"
                    );
                }
            }
        }

        if self.identities.is_empty() {
            tracing::warn!("descriptor store is empty; authentication cannot succeed");
        }

        Ok(self.identities.len())
    }
}
