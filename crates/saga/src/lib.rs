//! Pallet reservation and print transaction saga.
//!
//! A [`PrintSaga`] takes a validated [`domain::PrintBatch`] through these stages:
//! 1. Reserve identifiers from the [`IdentifierPool`]
//! 2. Write pallet records, one item at a time
//! 3. Render and upload a PDF label per item, in parallel
//! 4. Confirm the identifiers of successful items, release the rest
//! 5. Update order progress, stock and work levels
//! 6. Send one merged print job
//!
//! Any batch-level failure releases every identifier that was not confirmed.

pub mod artifact;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod outcome;
pub mod pool;
pub mod record;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod writer;

pub use artifact::{ArtifactGenerator, ArtifactRef, PdfArtifact};
pub use config::SagaConfig;
pub use coordinator::PrintSaga;
pub use error::{ArtifactError, FailureCategory, Result, SagaError, WriteError};
pub use events::{BatchEvent, ProgressEvent, ProgressStatus};
pub use outcome::{ItemFailure, PrintOutcome};
pub use pool::IdentifierPool;
pub use record::BatchRecord;
pub use services::{
    BlobStorage, FileBlobStorage, InMemoryBlobStorage, InMemoryPdfRenderer, LabelPrinter,
    PdfRenderer, PrintDispatchFailure, PrintDocument, PrintJob, RecordingPrinter, SpoolPrinter,
    TextPdfRenderer,
};
pub use state::PrintState;
pub use telemetry::{RecordingTelemetry, SagaTelemetry, TelemetryRecord, TracingTelemetry};
pub use writer::{AggregateReport, RecordContext, RecordWriter};
