//! Security checks for the extraction tools.
//!
//! Extraction accepts filesystem paths from agents, so it gets the same
//! protections a file-serving surface needs:
//! - absolute, existing paths only (no ambient working-directory guessing)
//! - no parent-directory traversal components
//! - sensitive files (.env, credentials, keys) are never extracted

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Security-related errors.
#[derive(Error, Debug, Clone)]
pub enum SecurityError {
    #[error("Path must be absolute: '{path}'")]
    RelativePath { path: String },

    #[error("Path traversal blocked: '{path}' contains parent-directory components")]
    PathTraversal { path: String },

    #[error("Access denied: '{path}' is a sensitive file ({reason})")]
    SensitiveFile { path: String, reason: &'static str },
}

impl SecurityError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RelativePath { .. } => "RELATIVE_PATH",
            Self::PathTraversal { .. } => "PATH_TRAVERSAL",
            Self::SensitiveFile { .. } => "SENSITIVE_FILE",
        }
    }
}

/// File name patterns that must never be extracted into the dataset.
const SENSITIVE_NAMES: &[(&str, &str)] = &[
    (".env", "environment file"),
    (".envrc", "environment file"),
    (".netrc", "credentials file"),
    ("id_rsa", "private key"),
    ("id_ed25519", "private key"),
    ("credentials", "credentials file"),
    (".htpasswd", "password file"),
];

/// File extensions that must never be extracted.
const SENSITIVE_EXTENSIONS: &[(&str, &str)] = &[
    ("pem", "private key material"),
    ("key", "private key material"),
    ("p12", "keystore"),
    ("pfx", "keystore"),
];

/// Returns the reason a file is sensitive, or `None` if it is safe.
#[must_use]
pub fn is_sensitive_file(path: &Path) -> Option<&'static str> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        let lower = name.to_ascii_lowercase();
        for (pattern, reason) in SENSITIVE_NAMES {
            if lower == *pattern || lower.starts_with(&format!("{pattern}.")) {
                return Some(reason);
            }
        }
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let lower = ext.to_ascii_lowercase();
        for (pattern, reason) in SENSITIVE_EXTENSIONS {
            if lower == *pattern {
                return Some(reason);
            }
        }
    }
    None
}

/// Validates a user-supplied extraction path.
///
/// The path must be absolute and free of `..` components; sensitive file
/// names are rejected outright. Existence is checked by the caller so a
/// missing file gets a NotFound diagnostic rather than a security error.
pub fn validate_extraction_path(raw: &str) -> Result<PathBuf, SecurityError> {
    let path = Path::new(raw);

    if !path.is_absolute() {
        return Err(SecurityError::RelativePath {
            path: raw.to_string(),
        });
    }

    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(SecurityError::PathTraversal {
                path: raw.to_string(),
            });
        }
    }

    if let Some(reason) = is_sensitive_file(path) {
        return Err(SecurityError::SensitiveFile {
            path: raw.to_string(),
            reason,
        });
    }

    Ok(path.to_path_buf())
}
