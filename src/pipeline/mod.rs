//! The ingestion pipeline and retrieval path.
//!
//! Three components own the pipeline's state transitions:
//!
//! - [`IntakeCoordinator`] accepts a document, persists it, and enqueues a
//!   processing job (UPLOADED→QUEUED).
//! - [`IngestionWorker`] consumes jobs, extracts content, embeds it, and
//!   finalizes the record (QUEUED→PROCESSING→{PROCESSED,FAILED}).
//! - [`QueryService`] resolves searches via cache-aside against the vector
//!   index.
//!
//! Every component receives its collaborators as trait handles at
//! construction, so tests substitute in-memory fakes freely.

mod extract;
mod intake;
mod search;
mod types;
mod worker;

pub use intake::IntakeCoordinator;
pub use search::QueryService;
pub use types::{FailureKind, SearchError, SearchHit, SubmitError};
pub use worker::{IngestionWorker, WorkerOptions};
