//! Collaborators reached by the saga: PDF rendering, blob storage and the
//! label printer.

pub mod printer;
pub mod renderer;
pub mod storage;

pub use printer::{LabelPrinter, PrintDispatchFailure, PrintDocument, PrintJob, RecordingPrinter, SpoolPrinter};
pub use renderer::{InMemoryPdfRenderer, PdfRenderer, TextPdfRenderer};
pub use storage::{BlobStorage, FileBlobStorage, InMemoryBlobStorage};
