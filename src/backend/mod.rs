//! Generation Backend Abstraction
//!
//! The batch core only needs one capability from the outside world: perform a single
//! generation call and report success bytes or a classified [`OperationError`]. Transport,
//! authentication and payload encoding live behind this trait.

use crate::error::OperationError;
use crate::job::{Artifact, AuxiliaryInput, JobPayload};
use async_trait::async_trait;

pub mod http;
pub mod simulated;

pub use http::HttpBackend;
pub use simulated::SimulatedBackend;

/// Backend client trait
///
/// Implementations must be safe to call again with the same input: the retry executor
/// may repeat a call after a transient failure.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Perform one generation call.
    async fn perform(
        &self,
        payload: &JobPayload,
        auxiliary: &[AuxiliaryInput],
    ) -> Result<Artifact, OperationError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
