#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use icd10_import_lib::{db, StoreConfig};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Migrated store at `path`, created if missing.
pub async fn open_store(path: &Path) -> SqlitePool {
    db::open_pool(&StoreConfig::new(path))
        .await
        .expect("open diagnosis store")
}

/// Fresh migrated store in a scratch directory. Keep the `TempDir` alive.
pub async fn temp_store() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open_store(&dir.path().join("diagnosis.sqlite3")).await;
    (dir, pool)
}

pub async fn record_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM his_icd_diagnosis")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn diag(code: &str, desc: &str) -> String {
    format!("<diag><name>{code}</name><desc>{desc}</desc></diag>")
}

/// `ICD10CM.tabular` document with one section per chapter.
pub fn tabular(chapters: &[(&str, Vec<String>)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ICD10CM.tabular>\n");
    for (label, diags) in chapters {
        xml.push_str("<chapter><desc>");
        xml.push_str(label);
        xml.push_str("</desc><section>");
        for d in diags {
            xml.push_str(d);
        }
        xml.push_str("</section></chapter>\n");
    }
    xml.push_str("</ICD10CM.tabular>\n");
    xml
}

pub fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| diag(&format!("{prefix}{i:03}"), &format!("Entry {i}")))
        .collect()
}
