pub mod config;
pub mod db;
pub mod discover;
pub mod document;
pub mod error;
pub mod import;
pub mod importer;
pub mod logging;
mod migrate;
pub mod model;
pub mod store;
mod time;

pub use config::{ImportOptions, StoreConfig};
pub use discover::{find_xml_files, validate_xml_file, DiscoveredFile, DiscoveryError};
pub use document::{read_source, DocumentError, DocumentKind, IcdDocument};
pub use error::{AppError, AppResult};
pub use import::{
    import_xml, reconcile, run_import, ImportCounts, ImportError, ImportEvent, ImportObserver,
    ImportSummary, Interrupt, InterruptTrigger, ProgressPrinter,
};
pub use importer::ImportLogger;
pub use model::{CodingSystemVersion, DiagnosisEntry, DiagnosisRecord, IncompleteEntry};
pub use store::{DiagnosisStore, SqliteDiagnosisStore, StoreError, TransactionBoundary};
