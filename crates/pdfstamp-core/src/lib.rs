//! Visual signature stamping for PDF documents
//!
//! The pipeline, leaf first:
//! - [`geometry`]: map an editor rectangle from preview pixels to page points
//! - [`stamp`]: rotate the signature image onto an expanded transparent canvas
//! - [`compositor`]: embed the stamp into a page and emit new PDF bytes
//! - [`rasterizer`]: flatten every page to a bitmap-only page
//! - [`lifecycle`]: the `uploaded → signed → flattened` status machine
//!
//! [`workflow::Workflow`] strings these together over a [`storage::BlobStore`].

pub mod compositor;
pub mod error;
pub mod geometry;
pub mod lifecycle;
pub mod naming;
mod page;
pub mod rasterizer;
pub mod render;
pub mod stamp;
pub mod storage;
pub mod workflow;
mod xobject;

pub use compositor::{composite, page_count};
pub use error::{Result, StampError};
pub use geometry::{map_client_rect_to_pdf, PageBox, PdfRect, PlacementRequest};
pub use lifecycle::{
    apply_transition, Document, DocumentEvent, DocumentStatus, Signature, Transition,
};
pub use naming::{output_name, Stage};
pub use rasterizer::{RasterizedPdf, Rasterizer, DEFAULT_DPI};
pub use render::{BlankRenderer, PageRenderer};
#[cfg(feature = "pdfium")]
pub use render::PdfiumRenderer;
pub use stamp::{prepare_stamp, PreparedStamp};
pub use storage::{BlobStore, FileRef, FsBlobStore};
pub use workflow::{FlattenSource, Workflow};
