//! Dispatches an uploaded file to the matching chapter extractor.

use crate::error::ImportError;
use crate::models::RawChapter;
use crate::services::{epub, splitter};
use tracing::info;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Epub,
    Text,
}

impl SourceKind {
    /// Classify a file by its extension, case-insensitively.
    pub fn from_file_name(file_name: &str) -> Result<Self, ImportError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "epub" => Ok(SourceKind::Epub),
            "txt" => Ok(SourceKind::Text),
            _ => Err(ImportError::UnsupportedFileType { extension }),
        }
    }
}

/// Parse the raw bytes of an uploaded file into chapters.
///
/// Either every chapter is returned or an error is; an empty result is
/// reported as a parse failure.
pub fn load_chapters(file_name: &str, bytes: &[u8]) -> Result<Vec<RawChapter>, ImportError> {
    let kind = SourceKind::from_file_name(file_name)?;
    info!(file = %file_name, ?kind, bytes = bytes.len(), "Loading chapters");

    let chapters = match kind {
        SourceKind::Epub => epub::extract_epub_chapters(bytes)?,
        SourceKind::Text => splitter::split_text_chapters(&decode_text(bytes)?),
    };

    if chapters.is_empty() {
        return Err(ImportError::no_chapters());
    }
    Ok(chapters)
}

fn decode_text(bytes: &[u8]) -> Result<String, ImportError> {
    let bytes = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ImportError::parse("The text file is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::epub::fixtures::{build_archive, chapter_page, long_text};

    #[test]
    fn classifies_extensions_case_insensitively() {
        assert_eq!(SourceKind::from_file_name("book.EPUB"), Ok(SourceKind::Epub));
        assert_eq!(SourceKind::from_file_name("notes.v2.Txt"), Ok(SourceKind::Text));
    }

    #[test]
    fn rejects_other_extensions_before_parsing() {
        assert_eq!(
            load_chapters("scan.pdf", b"%PDF-1.4"),
            Err(ImportError::UnsupportedFileType {
                extension: "pdf".to_string()
            })
        );
        assert!(matches!(
            load_chapters("README", b"text"),
            Err(ImportError::UnsupportedFileType { .. })
        ));
    }

    #[test]
    fn text_files_strip_the_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"Just some words in a file.");
        let chapters = load_chapters("story.txt", &bytes).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].original_text, "Just some words in a file.");
    }

    #[test]
    fn invalid_utf8_is_a_parse_failure() {
        let err = load_chapters("story.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ImportError::ParseFailure { .. }));
    }

    #[test]
    fn blank_text_file_has_no_chapters() {
        assert_eq!(
            load_chapters("empty.txt", b"   \n"),
            Err(ImportError::no_chapters())
        );
    }

    #[test]
    fn epub_files_go_through_the_archive_extractor() {
        let page = chapter_page("Opening", &long_text("word"));
        let bytes = build_archive(&[("OEBPS/ch1.xhtml", &page)]);
        let chapters = load_chapters("novel.epub", &bytes).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Opening");
    }
}
