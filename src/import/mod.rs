pub mod execute;
pub mod interrupt;
pub mod observer;
pub mod report;

use serde::Serialize;
use thiserror::Error;

use crate::document::DocumentError;
use crate::model::CodingSystemVersion;
use crate::store::StoreError;

pub use execute::{import_xml, reconcile, run_import};
pub use interrupt::{Interrupt, InterruptTrigger};
pub use observer::{ImportEvent, ImportObserver, ProgressPrinter};
pub use report::write_import_report;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("store rejected the import: {0}")]
    Store(#[from] StoreError),
    #[error("import interrupted")]
    Interrupted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCounts {
    pub created: u64,
    pub updated: u64,
    /// Incomplete `diag` entries left out of the run.
    pub skipped: u64,
}

impl ImportCounts {
    pub fn processed(&self) -> u64 {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    #[serde(flatten)]
    pub counts: ImportCounts,
    pub version: CodingSystemVersion,
    pub dry_run: bool,
    pub duration_ms: u64,
}
