//! Attachment ingestion.
//!
//! This module provides:
//! * [`RawFile`] — async trait implemented by every input surface
//!   ([`PathFile`], [`MemoryFile`], [`DataUrlFile`]).
//! * [`AttachmentPipeline`] — concurrent, cancellable conversion of raw files
//!   into base64 [`Attachment`]s.
//! * [`clipboard`] — the paste surface (`arboard` + PNG encoding).
//! * Payload helpers: [`encode_payload`], [`decode_payload`],
//!   [`strip_data_url_prefix`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use gemini_chat::attachments::{AttachmentPipeline, InputSurface, PathFile, RawFile};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = AttachmentPipeline::new(20 * 1024 * 1024);
//!     let files: Vec<Box<dyn RawFile>> = vec![Box::new(PathFile::new("cat.png"))];
//!
//!     pipeline.submit_files(InputSurface::Picker, files).unwrap();
//!     pipeline.wait_idle().await;
//!
//!     for att in pipeline.take_attachments() {
//!         println!("{} ({} base64 chars)", att.label(), att.encoded_data.len());
//!     }
//! }
//! ```

pub mod clipboard;
pub mod ingest;
pub mod payload;
pub mod source;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use clipboard::ClipboardError;
pub use ingest::{
    Attachment, AttachmentPipeline, BatchReceipt, ConversionId, IngestError, RejectReason,
    Rejection,
};
pub use payload::{decode_payload, encode_payload, split_data_url, strip_data_url_prefix, PayloadError};
pub use source::{
    is_image_type, mime_for_path, parse_dropped_paths, DataUrlFile, InputSurface, MemoryFile,
    PathFile, RawFile,
};
