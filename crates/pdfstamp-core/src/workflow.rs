//! End-to-end operations over a blob store
//!
//! Each operation reads its inputs from the store, runs the pipeline and
//! writes the result back before returning the updated [`Document`]. The
//! caller persists that record.

use crate::compositor;
use crate::error::{Result, StampError};
use crate::geometry::{map_client_rect_to_pdf, PlacementRequest};
use crate::lifecycle::{apply_transition, Document, DocumentEvent, Signature, Transition};
use crate::naming::{output_name, Stage};
use crate::rasterizer::Rasterizer;
use crate::render::PageRenderer;
use crate::stamp;
use crate::storage::{self, BlobStore};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// What to flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlattenSource {
    /// The signed artifact (`signed → flattened`)
    SignedArtifact,
    /// The untouched upload (`uploaded → flattened_original`)
    Original,
}

impl FlattenSource {
    fn transition(self) -> Transition {
        match self {
            FlattenSource::SignedArtifact => Transition::Flatten,
            FlattenSource::Original => Transition::FlattenOriginal,
        }
    }

    fn stage(self) -> Stage {
        match self {
            FlattenSource::SignedArtifact => Stage::Flattened,
            FlattenSource::Original => Stage::FlattenedOriginal,
        }
    }
}

/// Runs signing and flattening against stored documents.
///
/// Operations on different documents are independent. Operations on the
/// same document are not serialized here: callers must ensure at most one
/// transformation per document is in flight, or the later result silently
/// wins.
pub struct Workflow<S, R> {
    store: S,
    rasterizer: Rasterizer<R>,
    scratch_dir: Option<PathBuf>,
}

impl<S: BlobStore, R: PageRenderer> Workflow<S, R> {
    pub fn new(store: S, renderer: R) -> Self {
        Self {
            store,
            rasterizer: Rasterizer::new(renderer),
            scratch_dir: None,
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.rasterizer = self.rasterizer.with_dpi(dpi);
        self
    }

    /// Directory for rotated stamps and rasterized output.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.rasterizer = self.rasterizer.with_scratch_dir(dir.clone());
        self.scratch_dir = Some(dir);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store an uploaded PDF and create its document record.
    pub fn upload(
        &self,
        owner: &str,
        title: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Document> {
        let page_count = compositor::page_count(bytes)?;
        if page_count == 0 {
            return Err(StampError::InvalidInput(format!(
                "{} has no pages",
                file_name
            )));
        }

        let id = Uuid::new_v4();
        let original = self.store.put(&storage::original_key(id, file_name), bytes)?;
        tracing::info!(
            "Uploaded document {} for {} ({} pages)",
            id,
            owner,
            page_count
        );
        Ok(Document::new(id, owner, title, original))
    }

    /// Store `owner`'s signature image, replacing any earlier one.
    pub fn register_signature(&self, owner: &str, png: &[u8]) -> Result<Signature> {
        let image = stamp::decode_signature(png)?;
        let file = self.store.put(&storage::signature_key(owner)?, png)?;
        tracing::info!(
            "Registered {}x{} signature for {}",
            image.width(),
            image.height(),
            owner
        );
        Ok(Signature {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            image: file,
        })
    }

    /// Stamp `signature` onto the original as placed by `request`.
    pub fn sign(
        &self,
        document: &Document,
        signature: &Signature,
        request: &PlacementRequest,
    ) -> Result<Document> {
        let started = Instant::now();
        request.validate()?;
        let source = document.transition_source(Transition::Sign)?;
        if signature.owner != document.owner {
            return Err(StampError::PreconditionFailed(format!(
                "Signature of {} cannot sign document {} owned by {}",
                signature.owner, document.id, document.owner
            )));
        }

        let source_path = self.store.local_path(source)?;
        let page_box = compositor::page_box(&source_path, request.page_number)?;
        let rect = map_client_rect_to_pdf(
            page_box.visible_width(),
            page_box.visible_height(),
            request,
        )?;

        let signature_path = self.store.local_path(&signature.image)?;
        let prepared = match &self.scratch_dir {
            Some(dir) => stamp::prepare_stamp_in(dir, &signature_path, request.rotation_degrees)?,
            None => stamp::prepare_stamp(&signature_path, request.rotation_degrees)?,
        };
        let bytes = compositor::composite(&source_path, request.page_number, &rect, prepared.path())?;
        drop(prepared);

        let name = output_name(document.original_file.file_name(), Stage::Signed);
        let output = self.store.put(&storage::signed_key(document.id, &name), &bytes)?;
        let signed = apply_transition(
            document,
            DocumentEvent {
                transition: Transition::Sign,
                output,
            },
        )?;

        tracing::info!(
            "Signed document {} page {} in {:?}",
            document.id,
            request.page_number,
            started.elapsed()
        );
        Ok(signed)
    }

    /// Rasterize the signed artifact or the original.
    pub fn flatten(&self, document: &Document, source: FlattenSource) -> Result<Document> {
        let transition = source.transition();
        let input = document.transition_source(transition)?;
        let input_path = self.store.local_path(input)?;

        let raster = self.rasterizer.rasterize(&input_path)?;
        let name = output_name(document.original_file.file_name(), source.stage());
        let output = self
            .store
            .put(&storage::signed_key(document.id, &name), &raster.bytes()?)?;

        apply_transition(document, DocumentEvent { transition, output })
    }

    /// Page count of the original upload.
    pub fn page_count(&self, document: &Document) -> Result<u32> {
        compositor::page_count(&self.store.get(&document.original_file)?)
    }
}
