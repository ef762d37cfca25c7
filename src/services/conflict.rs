//! Screening of selected chapters against numbers already in the project.
//!
//! The chapter number is read from the title text only. Titles that carry no
//! recognizable number are never treated as conflicts.

use crate::models::{ImportBatchItem, ImportCandidate};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NUMBER_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)(?:chapter|ch\.|part)\s*(\d+)").expect("chapter number regex"),
        Regex::new(r"第\s*(\d+)\s*章").expect("cjk chapter number regex"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScreenedBatch {
    pub items: Vec<ImportBatchItem>,
    pub skipped_count: usize,
}

/// Read a chapter number out of a title such as "Chapter 12" or "第12章".
pub fn chapter_number_from_title(title: &str) -> Option<u32> {
    NUMBER_PATTERNS
        .iter()
        .find_map(|re| re.captures(title))
        .and_then(|caps| caps[1].parse().ok())
}

/// Build the outgoing batch from the selected candidates, skipping any whose
/// title number already exists.
pub fn screen_conflicts(
    candidates: &[ImportCandidate],
    existing: &HashSet<u32>,
    project_id: &str,
) -> ScreenedBatch {
    let mut batch = ScreenedBatch::default();
    for candidate in candidates.iter().filter(|c| c.selected) {
        if chapter_number_from_title(&candidate.title).is_some_and(|n| existing.contains(&n)) {
            batch.skipped_count += 1;
            continue;
        }
        batch.items.push(ImportBatchItem {
            title: candidate.title.clone(),
            original_text: candidate.original_text.clone(),
            translated_text: candidate.translated_text.clone(),
            project_id: project_id.to_string(),
        });
    }
    batch
}
