//! XFA datasets packet handling.
//!
//! XFA forms keep their field values in an XML "datasets" packet stored in
//! a stream referenced from the document catalog's AcroForm dictionary.
//! This module extracts that packet, addresses nodes by slash-separated
//! paths, rewrites values, and repacks the stream into an output PDF.
pub mod checkbox;
pub mod extract;
pub mod fill;
pub mod inject;

use thiserror::Error;

pub use checkbox::{discover_checkbox_paths, normalize_checkboxes, to_on_off};
pub use extract::{extract_datasets, extract_packets};
pub use fill::update_datasets;
pub use inject::inject_datasets;

/// Recursion limit for XML tree walks. Real forms nest a few dozen levels
/// at most; anything deeper is treated as hostile input.
pub(crate) const MAX_DEPTH: usize = 128;

#[derive(Error, Debug)]
pub enum XfaError {
    #[error("corrupted PDF: no document catalog")]
    MissingRoot,

    #[error("PDF has no AcroForm dictionary (not a fillable form)")]
    MissingAcroForm,

    #[error("AcroForm has no XFA entry (not an XFA form)")]
    MissingXfa,

    #[error("XFA packet list is malformed")]
    MalformedPacketList,

    #[error("XFA form has no datasets packet")]
    MissingDatasets,

    #[error("cannot repack: XFA packet list in output form is malformed")]
    RepackMalformedPacketList,

    #[error("cannot repack: output form has no datasets packet")]
    RepackMissingDatasets,

    #[error("failed to parse datasets XML: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("failed to serialize datasets XML: {0}")]
    XmlWrite(#[from] xmltree::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
