use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::document::{read_source, DocumentError, DocumentKind, IcdDocument};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("{0} is not an ICD-10 XML file")]
    NotIcd(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

fn mentions_icd(s: &str) -> bool {
    s.to_ascii_lowercase().contains("icd")
}

/// Classify an XML file as an ICD-10 document.
///
/// The CMS roots are accepted outright. Any other well-formed file passes as
/// [`DocumentKind::Generic`] only when its path mentions `icd` and it holds
/// at least one `chapter`.
pub fn validate_xml_file(path: &Path) -> Result<DocumentKind, DiscoveryError> {
    let text = read_source(path)?;
    let doc = IcdDocument::parse(&text)?;
    match doc.kind() {
        DocumentKind::Generic => {
            if mentions_icd(&path.to_string_lossy()) && doc.has_chapters() {
                Ok(DocumentKind::Generic)
            } else {
                Err(DiscoveryError::NotIcd(path.to_path_buf()))
            }
        }
        kind => Ok(kind),
    }
}

/// Recursively collect `*.xml` files whose name mentions `icd` and which
/// validate. Unreadable or unrecognised files are logged and left out.
pub fn find_xml_files(dir: &Path) -> Vec<DiscoveredFile> {
    let mut found = Vec::new();
    if !dir.exists() {
        return found;
    }
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        let named_icd = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(mentions_icd);
        if !is_xml || !named_icd {
            continue;
        }
        match validate_xml_file(path) {
            Ok(kind) => found.push(DiscoveredFile {
                path: path.to_path_buf(),
                kind,
            }),
            Err(err) => {
                tracing::debug!(
                    target: "icd10_import",
                    event = "discover_skip",
                    path = %path.display(),
                    error = %err
                );
            }
        }
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}
