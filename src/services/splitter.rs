//! Heading-based chapter splitting for plain text files.

use crate::models::RawChapter;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

pub const FALLBACK_TITLE: &str = "Imported Text Content";
pub const PROLOGUE_TITLE: &str = "Prologue";

const MIN_SEGMENT_CHARS: usize = 50;
const MIN_PROLOGUE_CHARS: usize = 100;

/// Heading patterns in declaration order. When two patterns match at the same
/// position the earlier one supplies the title.
///
/// `(?m)^` matches after every newline and also at offset 0, so a heading on
/// the first line of the file starts a chapter and leaves no prologue.
pub const HEADING_PATTERNS: [&str; 4] = [
    r"(?m)^(Chapter\s+\d+[^\r\n]*)",
    r"(?m)^(CHAPTER\s+\d+[^\r\n]*)",
    r"(?m)^(第[0-9０-９一二三四五六七八九十百千万零〇两]+章[^\r\n]*)",
    r"(?m)^(Part\s+\d+[^\r\n]*)",
];

static HEADINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    HEADING_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("heading regex"))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    position: usize,
    title: String,
}

/// Split plain text into chapters at heading lines.
///
/// Text with no usable headings comes back as a single chapter; only blank
/// input yields an empty list.
pub fn split_text_chapters(text: &str) -> Vec<RawChapter> {
    let headings = find_headings(text);
    debug!(headings = headings.len(), "Scanned text for chapter headings");

    let mut chapters = Vec::new();
    if let Some(first) = headings.first() {
        let prefix = &text[..first.position];
        if prefix.chars().count() > MIN_PROLOGUE_CHARS {
            let prologue = prefix.trim();
            if prologue.chars().count() > MIN_PROLOGUE_CHARS {
                chapters.push(RawChapter::new(PROLOGUE_TITLE, prologue));
            }
        }

        for (idx, heading) in headings.iter().enumerate() {
            let end = headings
                .get(idx + 1)
                .map(|next| next.position)
                .unwrap_or(text.len());
            let segment = text[heading.position..end].trim();
            if segment.chars().count() <= MIN_SEGMENT_CHARS {
                debug!(title = %heading.title, "Dropping near-empty segment");
                continue;
            }
            chapters.push(RawChapter::new(heading.title.clone(), segment));
        }
    }

    if chapters.is_empty() {
        let whole = text.trim();
        if whole.is_empty() {
            return chapters;
        }
        chapters.push(RawChapter::new(FALLBACK_TITLE, whole));
    }

    info!(chapters = chapters.len(), "Split text into chapters");
    chapters
}

/// All heading matches across patterns, ordered by position, one per position.
fn find_headings(text: &str) -> Vec<Heading> {
    let mut headings: Vec<(usize, usize, Heading)> = HEADINGS
        .iter()
        .enumerate()
        .flat_map(|(order, re)| {
            re.captures_iter(text).filter_map(move |caps| {
                let line = caps.get(1)?;
                Some((
                    line.start(),
                    order,
                    Heading {
                        position: line.start(),
                        title: line.as_str().trim().to_string(),
                    },
                ))
            })
        })
        .collect();

    headings.sort_by_key(|(position, order, _)| (*position, *order));
    headings.dedup_by_key(|(position, _, _)| *position);
    headings.into_iter().map(|(_, _, heading)| heading).collect()
}
