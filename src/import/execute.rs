use std::future::Future;
use std::time::Instant;

use sqlx::SqlitePool;
use tracing::{debug, error, info};

use super::observer::{ImportEvent, ImportObserver};
use super::{ImportCounts, ImportError, ImportSummary};
use crate::config::ImportOptions;
use crate::document::IcdDocument;
use crate::store::{DiagnosisStore, SqliteDiagnosisStore, TransactionBoundary};

/// Walk `document` and create or update one record per complete `diag`.
///
/// Writes go straight to `store`; committing or discarding them is the
/// caller's job. The first store error ends the walk.
pub async fn reconcile<S, O>(
    document: &IcdDocument<'_>,
    store: &mut S,
    options: &ImportOptions,
    observer: &mut O,
) -> Result<ImportCounts, ImportError>
where
    S: DiagnosisStore,
    O: ImportObserver + ?Sized,
{
    let mut counts = ImportCounts::default();
    let interval = options.progress_interval.max(1);

    for chapter in document.chapters() {
        let label = chapter.label();
        observer.on_event(&ImportEvent::Chapter { label });

        for entry in chapter.entries() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(reason) => {
                    counts.skipped += 1;
                    debug!(target: "icd10_import", event = "diag_skipped", reason = %reason);
                    continue;
                }
            };

            match store.find(entry.code(), options.version).await? {
                Some(existing) => {
                    store.update(&existing, &entry).await?;
                    counts.updated += 1;
                }
                None => {
                    store.create(&entry, options.version).await?;
                    counts.created += 1;
                }
            }

            let processed = counts.processed();
            if processed % interval == 0 {
                observer.on_event(&ImportEvent::Progress { processed });
            }
        }
    }

    Ok(counts)
}

/// Import `document` into `pool` as one transaction.
///
/// The walk races `interrupt`, which is polled first; once it resolves the
/// run fails with [`ImportError::Interrupted`]. Any failure rolls the transaction back. A
/// dry run rolls back after a successful walk and still reports its counts.
pub async fn run_import<O, I>(
    pool: &SqlitePool,
    document: &IcdDocument<'_>,
    options: &ImportOptions,
    observer: &mut O,
    interrupt: I,
) -> Result<ImportSummary, ImportError>
where
    O: ImportObserver + ?Sized,
    I: Future<Output = ()>,
{
    let started = Instant::now();
    info!(
        target: "icd10_import",
        event = "import_start",
        version = %options.version,
        dry_run = options.dry_run,
        root = %document.root_tag()
    );

    let mut store = SqliteDiagnosisStore::begin(pool).await?;
    let outcome = tokio::select! {
        biased;
        () = interrupt => Err(ImportError::Interrupted),
        res = reconcile(document, &mut store, options, observer) => res,
    };

    let counts = match outcome {
        Ok(counts) => counts,
        Err(err) => {
            if let Err(rb) = store.rollback().await {
                error!(target: "icd10_import", event = "db_tx_rollback_failed", error = %rb);
            }
            error!(target: "icd10_import", event = "import_failed", error = %err);
            return Err(err);
        }
    };

    if options.dry_run {
        store.rollback().await?;
    } else {
        store.commit().await?;
    }

    let summary = ImportSummary {
        counts,
        version: options.version,
        dry_run: options.dry_run,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        target: "icd10_import",
        event = "import_done",
        created = counts.created,
        updated = counts.updated,
        skipped = counts.skipped,
        dry_run = options.dry_run,
        duration_ms = summary.duration_ms
    );
    Ok(summary)
}

/// Parse `text` and import it. Malformed XML fails before a transaction opens.
pub async fn import_xml<O, I>(
    pool: &SqlitePool,
    text: &str,
    options: &ImportOptions,
    observer: &mut O,
    interrupt: I,
) -> Result<ImportSummary, ImportError>
where
    O: ImportObserver + ?Sized,
    I: Future<Output = ()>,
{
    let document = IcdDocument::parse(text)?;
    run_import(pool, &document, options, observer, interrupt).await
}
