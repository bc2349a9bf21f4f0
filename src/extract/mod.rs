//! Format-aware content extraction.
//!
//! Dispatches on file extension (markdown, JSON, YAML, CSV, everything
//! else as plain text), recovers a title and flat string metadata, and
//! can walk a directory tree with glob patterns for batch ingestion.

use crate::error::{ExtractError, Result, ServerError};
use crate::types::FrameRecord;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Result of extracting one file.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub content: String,
    pub title: Option<String>,
    pub source_type: &'static str,
    pub metadata: BTreeMap<String, String>,
}

impl ExtractedContent {
    /// Builds a dataset record from the extraction.
    #[must_use]
    pub fn into_record(self, path: &Path, collection: Option<&str>) -> FrameRecord {
        let mut record = FrameRecord::new(self.content);
        record.metadata.title = self
            .title
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()));
        record.metadata.source = Some(path.to_string_lossy().to_string());
        record.metadata.source_type = Some(self.source_type.to_string());
        record.metadata.custom_metadata = self.metadata;
        if let Some(collection) = collection {
            record.metadata.collection = Some(collection.to_string());
        }
        record
    }
}

/// Extracts one file, dispatching on its extension.
pub fn extract_file(path: &Path) -> Result<ExtractedContent> {
    if !path.is_file() {
        return Err(ServerError::Extract(ExtractError::FileNotFound(
            path.to_string_lossy().to_string(),
        )));
    }
    let raw = std::fs::read_to_string(path).map_err(|source| {
        ServerError::Extract(ExtractError::FileRead {
            path: path.to_string_lossy().to_string(),
            source,
        })
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("md" | "markdown") => extract_markdown(&raw),
        Some("json") => extract_json(path, &raw),
        Some("yaml" | "yml") => extract_yaml(path, &raw),
        Some("csv") => Ok(extract_csv(&raw)),
        _ => Ok(ExtractedContent {
            content: raw,
            title: None,
            source_type: "text",
            metadata: BTreeMap::new(),
        }),
    }
}

/// Walks a directory tree and extracts every file matching one of the
/// glob patterns. Per-file failures are collected, not fatal.
pub fn extract_directory(
    dir: &Path,
    patterns: &[String],
    recursive: bool,
) -> Result<Vec<(PathBuf, Result<ExtractedContent>)>> {
    if !dir.is_dir() {
        return Err(ServerError::Extract(ExtractError::DirectoryNotFound(
            dir.to_string_lossy().to_string(),
        )));
    }
    let compiled: Vec<glob::Pattern> = patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| {
                ServerError::Extract(ExtractError::Pattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
        })
        .collect::<Result<_>>()?;

    let mut walker = ignore::WalkBuilder::new(dir);
    walker.standard_filters(false).hidden(true);
    if !recursive {
        walker.max_depth(Some(1));
    }

    let mut results = Vec::new();
    for entry in walker.build() {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if !compiled.iter().any(|p| p.matches(&name)) {
            continue;
        }
        if crate::security::is_sensitive_file(path).is_some() {
            continue;
        }
        results.push((path.to_path_buf(), extract_file(path)));
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

/// Markdown: YAML front matter becomes metadata, the first heading
/// becomes the title, the body stays as content.
fn extract_markdown(raw: &str) -> Result<ExtractedContent> {
    let (front_matter, body) = split_front_matter(raw);
    let mut metadata = BTreeMap::new();
    let mut title = None;

    if let Some(front_matter) = front_matter {
        if let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(front_matter) {
            if let Some(map) = value.as_mapping() {
                for (key, value) in map {
                    let (Some(key), Some(value)) = (key.as_str(), yaml_scalar(value)) else {
                        continue;
                    };
                    if key == "title" {
                        title = Some(value.clone());
                    }
                    metadata.insert(key.to_string(), value);
                }
            }
        }
    }

    if title.is_none() {
        title = first_heading(body);
    }

    Ok(ExtractedContent {
        content: body.to_string(),
        title,
        source_type: "markdown",
        metadata,
    })
}

fn extract_json(path: &Path, raw: &str) -> Result<ExtractedContent> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        ServerError::Extract(ExtractError::Parse {
            path: path.to_string_lossy().to_string(),
            format: "json",
            reason: e.to_string(),
        })
    })?;

    let mut metadata = BTreeMap::new();
    let mut title = None;
    if let Some(map) = value.as_object() {
        for (key, value) in map {
            let scalar = match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            };
            if let Some(scalar) = scalar {
                if key == "title" || key == "name" {
                    title.get_or_insert_with(|| scalar.clone());
                }
                metadata.insert(key.clone(), scalar);
            }
        }
    }

    Ok(ExtractedContent {
        content: serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        title,
        source_type: "json",
        metadata,
    })
}

fn extract_yaml(path: &Path, raw: &str) -> Result<ExtractedContent> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| {
        ServerError::Extract(ExtractError::Parse {
            path: path.to_string_lossy().to_string(),
            format: "yaml",
            reason: e.to_string(),
        })
    })?;

    let mut metadata = BTreeMap::new();
    let mut title = None;
    if let Some(map) = value.as_mapping() {
        for (key, value) in map {
            let (Some(key), Some(scalar)) = (key.as_str(), yaml_scalar(value)) else {
                continue;
            };
            if key == "title" || key == "name" {
                title.get_or_insert_with(|| scalar.clone());
            }
            metadata.insert(key.to_string(), scalar);
        }
    }

    Ok(ExtractedContent {
        content: raw.to_string(),
        title,
        source_type: "yaml",
        metadata,
    })
}

/// CSV: the raw text stays as content; the header and row count go into
/// metadata so agents can reason about the table without parsing it.
fn extract_csv(raw: &str) -> ExtractedContent {
    let mut lines = raw.lines();
    let header = lines.next().unwrap_or_default();
    let row_count = lines.filter(|l| !l.trim().is_empty()).count();

    let mut metadata = BTreeMap::new();
    metadata.insert("columns".to_string(), header.to_string());
    metadata.insert("row_count".to_string(), row_count.to_string());

    ExtractedContent {
        content: raw.to_string(),
        title: None,
        source_type: "csv",
        metadata,
    }
}

/// Splits `---\n…\n---` front matter off a markdown document.
fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---\n") else {
        return (None, raw);
    };
    match rest.split_once("\n---") {
        Some((front, body)) => (
            Some(front),
            body.strip_prefix('\n').unwrap_or(body),
        ),
        None => (None, raw),
    }
}

/// First H1 (or any first heading) text of a markdown body.
fn first_heading(body: &str) -> Option<String> {
    let mut in_heading = false;
    let mut text = String::new();
    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Heading { level, .. }) if level == HeadingLevel::H1 => {
                in_heading = true;
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                if !text.is_empty() {
                    return Some(text);
                }
                in_heading = false;
            }
            Event::Text(t) | Event::Code(t) if in_heading => text.push_str(&t),
            _ => {}
        }
    }
    None
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
