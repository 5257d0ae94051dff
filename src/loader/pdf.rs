//! PDF Page Loader
//!
//! Loads a PDF as one text unit per page, each carrying complete
//! provenance metadata, and derives the collection identifier from the
//! filename.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),
    #[error("No text extracted from {0}")]
    EmptyExtraction(String),
    #[error("Extraction failed for {0}: {1}")]
    Extraction(String, String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One page of extracted text plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUnit {
    pub text: String,
    /// 1-indexed page number.
    pub page: u32,
    pub total_pages: u32,
    pub filename: String,
    pub file_path: String,
    pub collection: String,
}

/// Opaque page-text extraction: file in, ordered page texts out.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, LoaderError>;
}

/// Production extractor backed by lopdf. Pages come back in document
/// order; extraction quality is whatever the PDF's text layer provides.
#[derive(Debug, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, LoaderError> {
        let display = path.display().to_string();
        let doc = lopdf::Document::load(path)
            .map_err(|e| LoaderError::Extraction(display.clone(), e.to_string()))?;

        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            let text = doc
                .extract_text(&[*page_number])
                .map_err(|e| LoaderError::Extraction(display.clone(), e.to_string()))?;
            pages.push(text);
        }
        Ok(pages)
    }
}

/// Derive a collection identifier from a source filename.
///
/// Lower-cased filename stem with every non-alphanumeric character
/// replaced by `_`. Substitutions are not collapsed:
/// `"Special!@#$%Chars.pdf"` becomes `"special_____chars"`.
/// Pure and deterministic; this string is the external index key.
pub fn derive_collection_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

/// Loads source files into page units.
pub struct PageLoader<E: TextExtractor> {
    extractor: E,
}

impl<E: TextExtractor> PageLoader<E> {
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }

    /// Load one file as ordered page units.
    ///
    /// Fails with `SourceNotFound` if the path does not resolve and
    /// `EmptyExtraction` if no text at all was recovered.
    pub fn load(&self, path: &Path) -> Result<Vec<PageUnit>, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::SourceNotFound(path.display().to_string()));
        }

        let pages = self.extractor.extract_pages(path)?;
        if pages.is_empty() || pages.iter().all(|p| p.trim().is_empty()) {
            return Err(LoaderError::EmptyExtraction(path.display().to_string()));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let file_path = path
            .canonicalize()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string());
        let collection = derive_collection_id(path);
        let total_pages = pages.len() as u32;

        let units: Vec<PageUnit> = pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageUnit {
                text,
                page: i as u32 + 1,
                total_pages,
                filename: filename.clone(),
                file_path: file_path.clone(),
                collection: collection.clone(),
            })
            .collect();

        info!(file = %filename, pages = units.len(), collection = %collection, "Loaded source");
        Ok(units)
    }
}

/// All PDF files in a directory, sorted by path for a stable sweep order.
pub fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    if !dir.is_dir() {
        return Err(LoaderError::NotADirectory(dir.display().to_string()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    debug!(dir = %dir.display(), count = files.len(), "Listed PDF files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeExtractor(Vec<String>);

    impl TextExtractor for FakeExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<String>, LoaderError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_derive_collection_id_special_chars() {
        let id = derive_collection_id(Path::new("Special!@#$%Chars.pdf"));
        assert_eq!(id, "special_____chars");
    }

    #[test]
    fn test_derive_collection_id_is_pure() {
        let a = derive_collection_id(Path::new("Annual Report (2024).pdf"));
        let b = derive_collection_id(Path::new("Annual Report (2024).pdf"));
        assert_eq!(a, b);
        assert_eq!(a, "annual_report__2024_");
    }

    #[test]
    fn test_load_missing_file() {
        let loader = PageLoader::new(FakeExtractor(vec![]));
        let err = loader.load(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert!(matches!(err, LoaderError::SourceNotFound(_)));
    }

    #[test]
    fn test_load_empty_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let loader = PageLoader::new(FakeExtractor(vec!["".to_string(), "  ".to_string()]));
        let err = loader.load(&path).unwrap_err();
        assert!(matches!(err, LoaderError::EmptyExtraction(_)));
    }

    #[test]
    fn test_load_page_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Two Pages.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let loader = PageLoader::new(FakeExtractor(vec![
            "first page".to_string(),
            "second page".to_string(),
        ]));
        let units = loader.load(&path).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].page, 1);
        assert_eq!(units[1].page, 2);
        assert!(units.iter().all(|u| u.total_pages == 2));
        assert!(units.iter().all(|u| u.collection == "two_pages"));
        assert!(units.iter().all(|u| u.filename == "Two Pages.pdf"));
    }

    #[test]
    fn test_list_pdf_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = list_pdf_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].file_name().unwrap().to_string_lossy().starts_with('a'));
    }
}
