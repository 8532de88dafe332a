//! Query orchestration
//!
//! The [`Explorer`] turns "search" and "expand" intents into at most one
//! authoritative request at a time. It answers from the history store when
//! it can, shares identical requests that are already running, cancels
//! superseded ones, and broadcasts the resulting navigation state.

mod engine;
mod inflight;
mod prefetch;
pub mod prompt;
mod state;

pub use engine::Explorer;
pub use inflight::{Lease, Outcome};
pub use prefetch::Prefetcher;
pub use state::{ExplorerState, Phase};
pub use tokio_util::sync::CancellationToken;

use crate::llm::LlmError;
use crate::segment::{RecordId, Segment};

/// Errors from exploration requests.
///
/// Clonable so one outcome can be handed to every waiter sharing a request.
/// `Cancelled` and `Exhausted` never reach the user: public operations
/// turn them into an empty segment list.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExploreError {
    #[error("the explanation service failed: {0}")]
    Transport(#[from] LlmError),

    #[error("the explanation service returned unusable output after {attempts} attempts: {reason}")]
    MalformedOutput { attempts: usize, reason: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("no further segments available")]
    Exhausted,

    #[error("request ended without a result")]
    Interrupted,
}

/// A finished request, already written to the history store
#[derive(Debug, Clone)]
pub struct Completed {
    pub record_id: RecordId,
    pub query: String,
    pub segments: Vec<Segment>,
}
