//! Page Loading
//!
//! Turns one source file into an ordered sequence of page-level text units
//! with provenance metadata. PDF text extraction itself sits behind the
//! `TextExtractor` trait so the rest of the pipeline never touches PDF
//! internals.

mod pdf;

pub use pdf::{
    derive_collection_id, list_pdf_files, LoaderError, PageLoader, PageUnit, PdfTextExtractor,
    TextExtractor,
};
