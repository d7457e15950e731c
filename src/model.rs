use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnosis coding standard a record belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodingSystemVersion {
    Icd9,
    #[default]
    Icd10,
}

impl CodingSystemVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            CodingSystemVersion::Icd9 => "icd9",
            CodingSystemVersion::Icd10 => "icd10",
        }
    }
}

impl fmt::Display for CodingSystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown coding system version: {0}")]
pub struct UnknownVersion(pub String);

impl FromStr for CodingSystemVersion {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "icd9" => Ok(CodingSystemVersion::Icd9),
            "icd10" => Ok(CodingSystemVersion::Icd10),
            other => Err(UnknownVersion(other.to_string())),
        }
    }
}

/// Why a `diag` element was left out of an import run.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum IncompleteEntry {
    #[error("diag has no <name> element")]
    MissingCode,
    #[error("diag has no <desc> element")]
    MissingDescription,
    #[error("diag code is empty")]
    EmptyCode,
    #[error("diag description is empty")]
    EmptyDescription,
}

/// A validated diagnosis entry read from the source document.
///
/// Code and description are trimmed and guaranteed non-empty. The category is
/// the enclosing chapter label and may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisEntry {
    code: String,
    description: String,
    category: String,
}

impl DiagnosisEntry {
    pub fn new(
        code: Option<&str>,
        description: Option<&str>,
        category: &str,
    ) -> Result<Self, IncompleteEntry> {
        let code = code.ok_or(IncompleteEntry::MissingCode)?.trim();
        let description = description
            .ok_or(IncompleteEntry::MissingDescription)?
            .trim();
        if code.is_empty() {
            return Err(IncompleteEntry::EmptyCode);
        }
        if description.is_empty() {
            return Err(IncompleteEntry::EmptyDescription);
        }
        Ok(Self {
            code: code.to_string(),
            description: description.to_string(),
            category: category.to_string(),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

/// A diagnosis row as held by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    pub id: String,
    pub code: String,
    pub description: String,
    pub category: String,
    pub coding_system_version: CodingSystemVersion,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}
