use serde::{Deserialize, Serialize};

/// A chapter as produced by one of the extractors, before any user edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChapter {
    pub title: String,
    pub original_text: String,
}

impl RawChapter {
    pub fn new(title: impl Into<String>, original_text: impl Into<String>) -> Self {
        RawChapter {
            title: title.into(),
            original_text: original_text.into(),
        }
    }
}

/// A parsed chapter awaiting review. Its index in the session is its only identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCandidate {
    pub title: String,
    pub original_text: String,
    pub translated_text: String,
    pub selected: bool,
}

impl From<RawChapter> for ImportCandidate {
    fn from(raw: RawChapter) -> Self {
        ImportCandidate {
            title: raw.title,
            original_text: raw.original_text,
            translated_text: String::new(),
            selected: true,
        }
    }
}

/// One chapter of the outgoing bulk-import request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatchItem {
    pub title: String,
    pub original_text: String,
    pub translated_text: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Loading,
    Previewing,
    Importing,
    Error,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Previewing => "previewing",
            Phase::Importing => "importing",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

/// Latest `(current, total)` pair reported by the importer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Snapshot of a session, as returned to HTTP clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub project_id: String,
    pub phase: Phase,
    pub file_name: Option<String>,
    pub candidates: Vec<ImportCandidate>,
    pub selected_count: usize,
    pub error: Option<String>,
    pub progress: Progress,
    pub skipped_count: usize,
}
