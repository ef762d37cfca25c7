//! EPUB chapter extraction.
//!
//! Opens the zip container, finds the OPF package document, follows the spine
//! in reading order and turns each content document into a chapter. Archives
//! without a usable spine fall back to every HTML entry in path order.

use crate::error::ImportError;
use crate::models::RawChapter;
use crate::utils::markup::strip_markup;
use regex::Regex;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use zip::ZipArchive;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const MIN_CHAPTER_CHARS: usize = 100;

static FULL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"full-path\s*=\s*["']([^"']+)["']"#).expect("full-path regex")
});
static ITEM_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<item\b[^>]*>").expect("item regex"));
static ITEMREF_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<itemref\b[^>]*>").expect("itemref regex"));
static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sid\s*=\s*["']([^"']*)["']"#).expect("id regex"));
static HREF_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\shref\s*=\s*["']([^"']*)["']"#).expect("href regex"));
static IDREF_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sidref\s*=\s*["']([^"']*)["']"#).expect("idref regex"));
// Checked in this order; the first element with visible text wins.
static TITLE_TAGS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").expect("h1 regex"),
        Regex::new(r"(?is)<h2\b[^>]*>(.*?)</h2\s*>").expect("h2 regex"),
        Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("title regex"),
    ]
});

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Extract chapters from the bytes of an EPUB file.
pub fn extract_epub_chapters(bytes: &[u8]) -> Result<Vec<RawChapter>, ImportError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ImportError::parse(format!("Failed to open EPUB: {e}")))?;

    let mut documents = Vec::new();
    if let Some(package_path) = find_package_path(&mut archive) {
        debug!(package = %package_path, "Found package document");
        match read_entry(&mut archive, &package_path) {
            Some(package) => {
                let manifest = parse_manifest(&package);
                let base_dir = parent_dir(&package_path);
                documents = parse_spine(&package)
                    .iter()
                    .filter_map(|idref| manifest.get(idref))
                    .map(|href| resolve_path(base_dir, href))
                    .collect();
                debug!(
                    manifest_items = manifest.len(),
                    spine_items = documents.len(),
                    "Resolved reading order"
                );
            }
            None => warn!(package = %package_path, "Package document is unreadable"),
        }
    }

    if documents.is_empty() {
        documents = fallback_documents(&archive);
        debug!(
            documents = documents.len(),
            "No spine found, using sorted HTML entries"
        );
    }

    let mut chapters = Vec::new();
    for path in &documents {
        let Some(content) = read_entry(&mut archive, path) else {
            debug!(path = %path, "Spine entry missing from archive");
            continue;
        };
        let text = strip_markup(&content);
        if text.chars().count() < MIN_CHAPTER_CHARS {
            debug!(path = %path, chars = text.chars().count(), "Skipping short document");
            continue;
        }
        let title =
            extract_title(&content).unwrap_or_else(|| format!("Chapter {}", chapters.len() + 1));
        chapters.push(RawChapter::new(title, text));
    }

    if chapters.is_empty() {
        return Err(ImportError::no_chapters());
    }

    info!(
        documents = documents.len(),
        chapters = chapters.len(),
        "Extracted EPUB chapters"
    );
    Ok(chapters)
}

/// Locate the OPF package, via `container.xml` first, then by extension.
fn find_package_path(archive: &mut Archive<'_>) -> Option<String> {
    let from_container = read_entry(archive, CONTAINER_PATH)
        .and_then(|xml| FULL_PATH.captures(&xml).map(|c| c[1].to_string()))
        .filter(|path| archive.file_names().any(|name| name == path.as_str()));
    if from_container.is_some() {
        return from_container;
    }

    archive
        .file_names()
        .find(|name| name.to_ascii_lowercase().ends_with(".opf"))
        .map(str::to_string)
}

/// Map manifest item ids to their hrefs, whatever the attribute order.
fn parse_manifest(package: &str) -> HashMap<String, String> {
    ITEM_TAG
        .find_iter(package)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let id = ID_ATTR.captures(tag)?;
            let href = HREF_ATTR.captures(tag)?;
            Some((id[1].to_string(), href[1].to_string()))
        })
        .collect()
}

fn parse_spine(package: &str) -> Vec<String> {
    ITEMREF_TAG
        .find_iter(package)
        .filter_map(|tag| IDREF_ATTR.captures(tag.as_str()).map(|c| c[1].to_string()))
        .collect()
}

fn fallback_documents(archive: &Archive<'_>) -> Vec<String> {
    let mut documents: Vec<String> = archive
        .file_names()
        .filter(|name| {
            let lower = name.to_ascii_lowercase();
            (lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm"))
                && !lower.contains("toc")
                && !lower.contains("nav")
        })
        .map(str::to_string)
        .collect();
    documents.sort();
    documents
}

fn extract_title(content: &str) -> Option<String> {
    TITLE_TAGS.iter().find_map(|re| {
        re.captures_iter(content)
            .map(|c| strip_markup(&c[1]).split_whitespace().collect::<Vec<_>>().join(" "))
            .find(|title| !title.is_empty())
    })
}

fn read_entry(archive: &mut Archive<'_>, path: &str) -> Option<String> {
    let mut file = archive.by_name(path).ok()?;
    let mut bytes = Vec::new();
    if let Err(err) = file.read_to_end(&mut bytes) {
        warn!(path = %path, "Failed to read archive entry: {err}");
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|idx| &path[..idx]).unwrap_or("")
}

/// Join an href onto the package directory, dropping fragments and dot segments.
fn resolve_path(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    /// Build a zip archive from `(path, content)` pairs, in the given order.
    pub fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in entries {
            writer
                .start_file(*path, FileOptions::default())
                .expect("start entry");
            writer.write_all(content.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish archive").into_inner()
    }

    pub fn chapter_page(heading: &str, body: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><html><head><title>Book</title></head>\
             <body><h1>{heading}</h1><p>{body}</p></body></html>"
        )
    }

    pub fn long_text(word: &str) -> String {
        vec![word; 60].join(" ")
    }

    pub const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
}
