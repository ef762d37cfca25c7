use thiserror::Error;

pub const IMPORT_FAILURE_FALLBACK: &str = "Failed to import chapters";

/// Failures a user can see and recover from during an import session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("Unsupported file type: .{extension}. Please use EPUB or TXT files.")]
    UnsupportedFileType { extension: String },

    #[error("{message}")]
    ParseFailure { message: String },

    #[error("All selected chapters already exist in this project.")]
    AllChaptersConflict,

    #[error("{message}")]
    ImportFailure { message: String },

    #[error("No chapters selected for import.")]
    NothingSelected,

    #[error("No chapter at position {index}")]
    NoSuchChapter { index: usize },

    #[error("Import session not found")]
    SessionNotFound,

    #[error("cannot {action} while the session is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: crate::models::Phase,
    },
}

impl ImportError {
    pub fn parse(message: impl Into<String>) -> Self {
        ImportError::ParseFailure {
            message: message.into(),
        }
    }

    pub fn no_chapters() -> Self {
        ImportError::parse("No chapters could be extracted from the file")
    }

    /// Wraps an importer message, substituting the generic one when it is blank.
    pub fn import_failure(message: Option<String>) -> Self {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| IMPORT_FAILURE_FALLBACK.to_string());
        ImportError::ImportFailure { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_failure_keeps_message_verbatim() {
        let err = ImportError::import_failure(Some("quota exceeded".to_string()));
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[test]
    fn import_failure_falls_back_on_blank_message() {
        assert_eq!(
            ImportError::import_failure(Some("   ".to_string())).to_string(),
            IMPORT_FAILURE_FALLBACK
        );
        assert_eq!(
            ImportError::import_failure(None).to_string(),
            IMPORT_FAILURE_FALLBACK
        );
    }

    #[test]
    fn unsupported_type_names_extension() {
        let err = ImportError::UnsupportedFileType {
            extension: "pdf".to_string(),
        };
        assert!(err.to_string().contains(".pdf"));
    }
}
