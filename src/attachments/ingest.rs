//! Attachment ingestion: raw files in, validated base64 [`Attachment`]s out.
//!
//! # Flow
//!
//! ```text
//! submit_files(files)
//!   ├─ partition: image/* within size limit │ everything else (rejected)
//!   ├─ no image at all → IngestError::Validation (nothing started)
//!   └─ per accepted file:
//!        register PendingConversion (id, CancellationToken)
//!        tokio::spawn ─▶ select! { cancelled │ read → base64 }
//!                          └─▶ finish(id): commit only if id still pending
//! ```
//!
//! Conversions run concurrently, so attachments land in completion order.
//! The processing flag is recomputed under the same lock that edits the
//! pending set, so whichever resolution empties the set clears it.
//!
//! [`AttachmentPipeline::cancel_all`] removes every pending id before the
//! tasks observe their token.  A read that completes after that finds its
//! id gone and its result is dropped, never appended.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::payload::encode_payload;
use super::source::{is_image_type, InputSurface, RawFile};

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// One image ready to be sent with a chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Validated `image/*` MIME type.
    pub mime_type: String,
    /// Base64 of the raw file bytes, never empty.
    pub encoded_data: String,
    /// Opaque preview handle (a path for files on disk).
    pub preview: Option<String>,
    /// Original file name.
    pub name: Option<String>,
    /// Size of the raw bytes.
    pub byte_size: Option<u64>,
}

impl Attachment {
    /// Label for listings: name if known, else the MIME type.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.mime_type)
    }
}

/// Identity of one in-flight conversion.
pub type ConversionId = u64;

// ---------------------------------------------------------------------------
// Errors / receipts
// ---------------------------------------------------------------------------

/// Batch-level ingestion errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    /// The batch was non-empty but nothing in it could be accepted.
    #[error("please select image files only ({rejected} file(s) rejected)")]
    Validation { rejected: usize },
}

/// Why a file was turned away before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NotAnImage,
    TooLarge { size: u64, limit: u64 },
}

/// A file rejected before conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub name: Option<String>,
    pub mime_type: String,
    pub reason: RejectReason,
}

/// Result of a successful [`AttachmentPipeline::submit_files`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReceipt {
    /// Conversions started, one per accepted file.
    pub accepted: Vec<ConversionId>,
    /// Files skipped because they are not images or are too large.
    pub rejected: Vec<Rejection>,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct PendingConversion {
    name: Option<String>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct IngestState {
    attachments: Vec<Attachment>,
    pending: HashMap<ConversionId, PendingConversion>,
}

struct Shared {
    state: Mutex<IngestState>,
    processing: watch::Sender<bool>,
    next_id: AtomicU64,
    max_file_bytes: u64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, IngestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve conversion `id`.  `outcome` is `None` for an abort.
    fn finish(&self, id: ConversionId, outcome: Option<std::io::Result<Attachment>>) {
        let mut state = self.lock();
        let Some(pending) = state.pending.remove(&id) else {
            log::debug!("ingest: conversion {id} no longer tracked, dropping its result");
            return;
        };
        let name = pending.name.as_deref().unwrap_or("<unnamed>");

        match outcome {
            Some(Ok(attachment)) => {
                log::debug!("ingest: conversion {id} ({name}) complete");
                state.attachments.push(attachment);
            }
            Some(Err(e)) => {
                log::warn!("ingest: failed to read {name}: {e}");
            }
            None => {
                log::debug!("ingest: conversion {id} ({name}) aborted");
            }
        }
        self.processing.send_replace(!state.pending.is_empty());
    }
}

// ---------------------------------------------------------------------------
// AttachmentPipeline
// ---------------------------------------------------------------------------

/// Concurrent, cancellable file → [`Attachment`] converter.
///
/// Cheap to clone; clones share the same pending set and attachment list.
/// [`submit_files`](Self::submit_files) spawns onto the current tokio
/// runtime and must be called from within one.
#[derive(Clone)]
pub struct AttachmentPipeline {
    shared: Arc<Shared>,
}

impl AttachmentPipeline {
    /// Create a pipeline.  `max_file_bytes == 0` disables the size limit.
    pub fn new(max_file_bytes: u64) -> Self {
        let (processing, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(IngestState::default()),
                processing,
                next_id: AtomicU64::new(1),
                max_file_bytes,
            }),
        }
    }

    /// Validate `files` and start one conversion per accepted file.
    ///
    /// All accepted files are registered as pending before this returns and
    /// convert concurrently.  An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// [`IngestError::Validation`] when `files` is non-empty and none of
    /// them is an acceptable image.  No conversion is started in that case.
    pub fn submit_files(
        &self,
        surface: InputSurface,
        files: Vec<Box<dyn RawFile>>,
    ) -> Result<BatchReceipt, IngestError> {
        if files.is_empty() {
            return Ok(BatchReceipt::default());
        }

        let mut receipt = BatchReceipt::default();
        let mut valid = Vec::with_capacity(files.len());
        for file in files {
            match self.check(file.as_ref()) {
                Ok(()) => valid.push(file),
                Err(rejection) => receipt.rejected.push(rejection),
            }
        }

        if valid.is_empty() {
            log::info!(
                "ingest: {} file(s) from {surface} rejected, no images in batch",
                receipt.rejected.len()
            );
            return Err(IngestError::Validation {
                rejected: receipt.rejected.len(),
            });
        }

        let limit = self.shared.max_file_bytes;
        let mut state = self.shared.lock();
        for file in valid {
            let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            state.pending.insert(
                id,
                PendingConversion {
                    name: file.name().map(str::to_string),
                    cancel: cancel.clone(),
                },
            );
            receipt.accepted.push(id);

            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = convert(file.as_ref(), limit) => Some(result),
                };
                shared.finish(id, outcome);
            });
        }
        self.shared.processing.send_replace(true);

        log::info!(
            "ingest: {} conversion(s) started from {surface}, {} rejected",
            receipt.accepted.len(),
            receipt.rejected.len()
        );
        Ok(receipt)
    }

    fn check(&self, file: &dyn RawFile) -> Result<(), Rejection> {
        let reject = |reason| Rejection {
            name: file.name().map(str::to_string),
            mime_type: file.declared_type().to_string(),
            reason,
        };

        if !is_image_type(file.declared_type()) {
            return Err(reject(RejectReason::NotAnImage));
        }
        let limit = self.shared.max_file_bytes;
        match file.size_hint() {
            Some(size) if limit > 0 && size > limit => {
                Err(reject(RejectReason::TooLarge { size, limit }))
            }
            _ => Ok(()),
        }
    }

    /// Abort every in-flight conversion.  Returns how many were aborted.
    ///
    /// Idempotent; with nothing pending this is a no-op.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.shared.lock();
        let aborted = state.pending.len();
        for (_, pending) in state.pending.drain() {
            pending.cancel.cancel();
        }
        self.shared.processing.send_replace(false);
        if aborted > 0 {
            log::info!("ingest: aborted {aborted} conversion(s)");
        }
        aborted
    }

    /// Remove the completed attachment at `index`.
    pub fn remove_attachment(&self, index: usize) -> Option<Attachment> {
        let mut state = self.shared.lock();
        (index < state.attachments.len()).then(|| state.attachments.remove(index))
    }

    /// Drop every completed attachment and abort in-flight conversions so
    /// none of them can reappear afterwards.
    pub fn clear_attachments(&self) {
        self.cancel_all();
        self.shared.lock().attachments.clear();
    }

    /// Hand the completed attachments over to an outgoing message.
    pub fn take_attachments(&self) -> Vec<Attachment> {
        std::mem::take(&mut self.shared.lock().attachments)
    }

    /// Snapshot of the completed attachments, in completion order.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.shared.lock().attachments.clone()
    }

    pub fn attachment_count(&self) -> usize {
        self.shared.lock().attachments.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// `true` while at least one conversion is pending.
    pub fn is_processing(&self) -> bool {
        *self.shared.processing.borrow()
    }

    /// Watch the processing flag.
    pub fn subscribe_processing(&self) -> watch::Receiver<bool> {
        self.shared.processing.subscribe()
    }

    /// Resolve once no conversion is pending.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe_processing();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|processing| !*processing).await;
    }
}

/// Read one file and build its attachment.
///
/// The size limit is checked again on the bytes actually read, since not
/// every source knows its size up front.
async fn convert(file: &dyn RawFile, limit: u64) -> std::io::Result<Attachment> {
    let bytes = file.read().await?;
    if bytes.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "file is empty",
        ));
    }
    let byte_size = bytes.len() as u64;
    if limit > 0 && byte_size > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("file is {byte_size} bytes, limit is {limit}"),
        ));
    }

    let encoded_data = tokio::task::spawn_blocking(move || encode_payload(&bytes))
        .await
        .map_err(std::io::Error::other)?;

    Ok(Attachment {
        mime_type: file.declared_type().trim().to_ascii_lowercase(),
        encoded_data,
        preview: file.preview(),
        name: file.name().map(str::to_string),
        byte_size: Some(byte_size),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::payload::decode_payload;
    use crate::attachments::source::MemoryFile;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Blocks in `read` until its gate receives a permit.
    struct GatedFile {
        name: String,
        mime: String,
        bytes: Vec<u8>,
        gate: Arc<Semaphore>,
    }

    impl GatedFile {
        fn new(name: &str, mime: &str, bytes: &[u8]) -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let file = Self {
                name: name.into(),
                mime: mime.into(),
                bytes: bytes.to_vec(),
                gate: Arc::clone(&gate),
            };
            (file, gate)
        }
    }

    #[async_trait]
    impl RawFile for GatedFile {
        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }

        fn declared_type(&self) -> &str {
            &self.mime
        }

        async fn read(&self) -> std::io::Result<Vec<u8>> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(std::io::Error::other)?;
            Ok(self.bytes.clone())
        }
    }

    /// Always fails to read.
    struct BrokenFile;

    #[async_trait]
    impl RawFile for BrokenFile {
        fn name(&self) -> Option<&str> {
            Some("broken.png")
        }

        fn declared_type(&self) -> &str {
            "image/png"
        }

        async fn read(&self) -> std::io::Result<Vec<u8>> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            ))
        }
    }

    fn boxed(file: impl RawFile + 'static) -> Box<dyn RawFile> {
        Box::new(file)
    }

    fn image(name: &str, bytes: &[u8]) -> Box<dyn RawFile> {
        Box::new(MemoryFile::new(Some(name.into()), "image/png", bytes.to_vec()))
    }

    fn text(name: &str) -> Box<dyn RawFile> {
        Box::new(MemoryFile::new(Some(name.into()), "text/plain", b"hi".to_vec()))
    }

    async fn wait_for_attachments(pipeline: &AttachmentPipeline, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while pipeline.attachment_count() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("attachments did not arrive in time");
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let pipeline = AttachmentPipeline::new(0);
        let receipt = pipeline.submit_files(InputSurface::Picker, Vec::new()).unwrap();
        assert!(receipt.accepted.is_empty());
        assert!(!pipeline.is_processing());
    }

    #[tokio::test]
    async fn only_images_become_pending_conversions() {
        let pipeline = AttachmentPipeline::new(0);
        let (a, _gate_a) = GatedFile::new("a.png", "image/png", b"a");
        let (b, _gate_b) = GatedFile::new("b.jpg", "image/jpeg", b"b");
        let (c, _gate_c) = GatedFile::new("c.gif", "image/gif", b"c");
        let files: Vec<Box<dyn RawFile>> =
            vec![Box::new(a), text("x.txt"), Box::new(b), text("y.md"), Box::new(c)];

        let receipt = pipeline.submit_files(InputSurface::Drop, files).unwrap();

        assert_eq!(receipt.accepted.len(), 3);
        assert_eq!(receipt.rejected.len(), 2);
        assert!(receipt
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::NotAnImage));
        assert_eq!(pipeline.pending_count(), 3);
        assert!(pipeline.is_processing());
        pipeline.cancel_all();
    }

    #[tokio::test]
    async fn batch_without_images_is_a_validation_error() {
        let pipeline = AttachmentPipeline::new(0);
        let err = pipeline
            .submit_files(InputSurface::Picker, vec![text("a.txt"), text("b.txt")])
            .unwrap_err();

        assert_eq!(err, IngestError::Validation { rejected: 2 });
        assert_eq!(pipeline.pending_count(), 0);
        assert!(!pipeline.is_processing());
    }

    #[tokio::test]
    async fn mixed_batch_yields_two_attachments() {
        let pipeline = AttachmentPipeline::new(0);
        let files = vec![text("notes.txt"), image("a.png", b"aaa"), image("b.png", b"bbb")];

        let receipt = pipeline.submit_files(InputSurface::Picker, files).unwrap();
        assert_eq!(receipt.accepted.len(), 2);
        assert_eq!(receipt.rejected.len(), 1);

        pipeline.wait_idle().await;

        assert_eq!(pipeline.attachment_count(), 2);
        assert_eq!(pipeline.pending_count(), 0);
        assert!(!pipeline.is_processing());
    }

    #[tokio::test]
    async fn encoded_data_round_trips_to_original_bytes() {
        let pipeline = AttachmentPipeline::new(0);
        let original: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
        pipeline
            .submit_files(InputSurface::Picker, vec![image("big.png", &original)])
            .unwrap();
        pipeline.wait_idle().await;

        let attachments = pipeline.attachments();
        assert_eq!(attachments.len(), 1);
        let att = &attachments[0];
        assert_eq!(decode_payload(&att.encoded_data).unwrap(), original);
        assert_eq!(att.mime_type, "image/png");
        assert_eq!(att.name.as_deref(), Some("big.png"));
        assert_eq!(att.byte_size, Some(original.len() as u64));
    }

    #[tokio::test]
    async fn cancel_all_discards_in_flight_reads() {
        let pipeline = AttachmentPipeline::new(0);
        let mut gates = Vec::new();
        let mut files: Vec<Box<dyn RawFile>> = Vec::new();
        for i in 0..3 {
            let (f, g) = GatedFile::new(&format!("{i}.png"), "image/png", b"data");
            files.push(Box::new(f));
            gates.push(g);
        }
        pipeline.submit_files(InputSurface::Drop, files).unwrap();
        assert_eq!(pipeline.pending_count(), 3);

        assert_eq!(pipeline.cancel_all(), 3);
        assert!(!pipeline.is_processing());
        assert_eq!(pipeline.pending_count(), 0);

        // Let the reads finish anyway; nothing may be appended.
        for g in &gates {
            g.add_permits(1);
        }
        settle().await;

        assert_eq!(pipeline.attachment_count(), 0);
        assert!(!pipeline.is_processing());
    }

    #[tokio::test]
    async fn cancel_all_is_idempotent() {
        let pipeline = AttachmentPipeline::new(0);
        assert_eq!(pipeline.cancel_all(), 0);
        assert_eq!(pipeline.cancel_all(), 0);
        assert!(!pipeline.is_processing());
    }

    #[tokio::test]
    async fn late_result_for_untracked_conversion_is_dropped() {
        let pipeline = AttachmentPipeline::new(0);
        let att = Attachment {
            mime_type: "image/png".into(),
            encoded_data: "AAAA".into(),
            preview: None,
            name: None,
            byte_size: Some(3),
        };
        pipeline.shared.finish(42, Some(Ok(att)));
        assert_eq!(pipeline.attachment_count(), 0);
    }

    #[tokio::test]
    async fn read_failure_does_not_abort_siblings() {
        let pipeline = AttachmentPipeline::new(0);
        let files: Vec<Box<dyn RawFile>> = vec![Box::new(BrokenFile), image("ok.png", b"ok")];

        let receipt = pipeline.submit_files(InputSurface::Picker, files).unwrap();
        assert_eq!(receipt.accepted.len(), 2);

        pipeline.wait_idle().await;
        let attachments = pipeline.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name.as_deref(), Some("ok.png"));
        assert!(!pipeline.is_processing());
    }

    #[tokio::test]
    async fn empty_file_is_treated_as_read_failure() {
        let pipeline = AttachmentPipeline::new(0);
        pipeline
            .submit_files(InputSurface::Clipboard, vec![image("empty.png", b"")])
            .unwrap();
        pipeline.wait_idle().await;
        assert_eq!(pipeline.attachment_count(), 0);
    }

    #[tokio::test]
    async fn attachments_arrive_in_completion_order() {
        let pipeline = AttachmentPipeline::new(0);
        let (first, gate_first) = GatedFile::new("first.png", "image/png", b"1");
        let (second, gate_second) = GatedFile::new("second.png", "image/png", b"2");
        pipeline
            .submit_files(InputSurface::Picker, vec![boxed(first), boxed(second)])
            .unwrap();

        gate_second.add_permits(1);
        wait_for_attachments(&pipeline, 1).await;
        gate_first.add_permits(1);
        pipeline.wait_idle().await;

        let names: Vec<_> = pipeline
            .attachments()
            .into_iter()
            .filter_map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["second.png", "first.png"]);
    }

    #[tokio::test]
    async fn clear_attachments_also_cancels_pending() {
        let pipeline = AttachmentPipeline::new(0);
        pipeline
            .submit_files(InputSurface::Picker, vec![image("done.png", b"d")])
            .unwrap();
        pipeline.wait_idle().await;

        let (late, gate) = GatedFile::new("late.png", "image/png", b"l");
        pipeline
            .submit_files(InputSurface::Picker, vec![boxed(late)])
            .unwrap();

        pipeline.clear_attachments();
        gate.add_permits(1);
        settle().await;

        assert_eq!(pipeline.attachment_count(), 0);
        assert_eq!(pipeline.pending_count(), 0);
        assert!(!pipeline.is_processing());
    }

    #[tokio::test]
    async fn remove_and_take_attachments() {
        let pipeline = AttachmentPipeline::new(0);
        pipeline
            .submit_files(InputSurface::Picker, vec![image("a.png", b"a")])
            .unwrap();
        pipeline.wait_idle().await;
        pipeline
            .submit_files(InputSurface::Picker, vec![image("b.png", b"b")])
            .unwrap();
        pipeline.wait_idle().await;

        assert!(pipeline.remove_attachment(5).is_none());
        let removed = pipeline.remove_attachment(0).unwrap();
        assert_eq!(removed.name.as_deref(), Some("a.png"));

        let taken = pipeline.take_attachments();
        assert_eq!(taken.len(), 1);
        assert_eq!(pipeline.attachment_count(), 0);
    }

    #[tokio::test]
    async fn oversized_image_is_rejected_before_conversion() {
        let pipeline = AttachmentPipeline::new(4);
        let err = pipeline
            .submit_files(InputSurface::Picker, vec![image("huge.png", b"123456")])
            .unwrap_err();
        assert_eq!(err, IngestError::Validation { rejected: 1 });

        let receipt = pipeline
            .submit_files(
                InputSurface::Picker,
                vec![image("huge.png", b"123456"), image("tiny.png", b"1")],
            )
            .unwrap();
        assert_eq!(receipt.accepted.len(), 1);
        assert_eq!(
            receipt.rejected[0].reason,
            RejectReason::TooLarge { size: 6, limit: 4 }
        );
        pipeline.wait_idle().await;
    }

    #[tokio::test]
    async fn size_limit_applies_when_size_is_unknown_up_front() {
        let pipeline = AttachmentPipeline::new(4);
        let (big, big_gate) = GatedFile::new("big.png", "image/png", b"123456");
        let (small, small_gate) = GatedFile::new("small.png", "image/png", b"12");

        let receipt = pipeline
            .submit_files(InputSurface::Drop, vec![boxed(big), boxed(small)])
            .unwrap();
        assert_eq!(receipt.accepted.len(), 2);

        big_gate.add_permits(1);
        small_gate.add_permits(1);
        pipeline.wait_idle().await;

        let names: Vec<_> = pipeline
            .attachments()
            .iter()
            .map(|a| a.label().to_string())
            .collect();
        assert_eq!(names, vec!["small.png"]);
    }

    #[tokio::test]
    async fn pasted_data_url_over_the_limit_is_rejected() {
        use crate::attachments::source::DataUrlFile;

        let pipeline = AttachmentPipeline::new(4);
        // "AAAAAAAA" decodes to 6 bytes.
        let url = DataUrlFile::parse("data:image/png;base64,AAAAAAAA").unwrap();
        let err = pipeline
            .submit_files(InputSurface::Clipboard, vec![boxed(url)])
            .unwrap_err();
        assert_eq!(err, IngestError::Validation { rejected: 1 });
        assert_eq!(pipeline.pending_count(), 0);
    }

    #[tokio::test]
    async fn processing_flag_is_observable() {
        let pipeline = AttachmentPipeline::new(0);
        let mut rx = pipeline.subscribe_processing();
        let (file, gate) = GatedFile::new("w.png", "image/png", b"w");

        pipeline
            .submit_files(InputSurface::Picker, vec![boxed(file)])
            .unwrap();
        rx.wait_for(|p| *p).await.unwrap();

        gate.add_permits(1);
        rx.wait_for(|p| !*p).await.unwrap();
        assert_eq!(pipeline.attachment_count(), 1);
    }
}
