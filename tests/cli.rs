use std::fs;
use std::path::Path;
use std::process::Output;

use anyhow::Result;
use assert_cmd::Command;
use tempfile::tempdir;

#[path = "util.rs"]
mod util;

use util::{diag, numbered, open_store, record_count, tabular};

fn run(db: &Path, args: &[&str]) -> Result<Output> {
    Ok(Command::cargo_bin("icd10-import")?
        .env("ICD10_IMPORT_LOG", "off")
        .arg("--db")
        .arg(db)
        .args(args)
        .output()?)
}

fn describe(output: &Output) -> String {
    format!(
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn import_then_stats() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("store").join("diagnosis.sqlite3");
    let xml = tmp.path().join("icd10cm_tabular.xml");
    fs::write(
        &xml,
        tabular(&[(
            "Certain infectious diseases",
            vec![diag("A00", "Cholera"), diag("A01", "Typhoid")],
        )]),
    )?;
    let xml_arg = xml.to_string_lossy().into_owned();

    let output = run(&db, &["import", &xml_arg])?;
    assert!(output.status.success(), "{}", describe(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Import Configuration:"));
    assert!(stdout.contains("Processing: Certain infectious diseases"));
    assert!(stdout.contains("Import completed: 2 created, 0 updated"));

    let output = run(&db, &["import", &xml_arg])?;
    assert!(output.status.success(), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Import completed: 0 created, 2 updated"));

    let output = run(&db, &["stats", "--json"])?;
    assert!(output.status.success(), "{}", describe(&output));
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stats[0]["version"], "icd10");
    assert_eq!(stats[0]["total"], 2);
    assert_eq!(stats[0]["active"], 2);
    Ok(())
}

#[test]
fn dry_run_and_report() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("diagnosis.sqlite3");
    let xml = tmp.path().join("icd10.xml");
    fs::write(&xml, tabular(&[("Neoplasms", numbered("C", 3))]))?;
    let reports = tmp.path().join("reports");

    let output = run(
        &db,
        &[
            "import",
            &*xml.to_string_lossy(),
            "--dry-run",
            "--report-dir",
            &*reports.to_string_lossy(),
        ],
    )?;
    assert!(output.status.success(), "{}", describe(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Import completed: 3 created, 0 updated"));
    assert!(stdout.contains("Dry run: all changes rolled back"));
    assert_eq!(fs::read_dir(&reports)?.count(), 1);

    let output = run(&db, &["stats"])?;
    assert!(output.status.success(), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("No diagnosis records."));
    Ok(())
}

#[test]
fn directory_import_covers_every_icd_file() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("diagnosis.sqlite3");
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("nested"))?;
    fs::write(data.join("icd10_a.xml"), tabular(&[("A", numbered("A", 2))]))?;
    fs::write(data.join("nested").join("ICD10_b.XML"), tabular(&[("B", numbered("B", 3))]))?;
    fs::write(data.join("other.xml"), tabular(&[("X", numbered("X", 4))]))?;

    let output = run(&db, &["import", "--dir", &*data.to_string_lossy()])?;
    assert!(output.status.success(), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("All files: 5 created, 0 updated, 0 skipped"));
    Ok(())
}

#[tokio::test]
async fn directory_import_stops_at_failing_file_and_keeps_earlier_ones() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("diagnosis.sqlite3");
    let pool = open_store(&db).await;
    sqlx::query(
        "CREATE TRIGGER reject_b001 BEFORE INSERT ON his_icd_diagnosis \
         WHEN NEW.code = 'B001' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(&pool)
    .await?;
    pool.close().await;

    let data = tmp.path().join("data");
    fs::create_dir_all(&data)?;
    fs::write(data.join("icd10_a.xml"), tabular(&[("A", numbered("A", 2))]))?;
    fs::write(data.join("icd10_b.xml"), tabular(&[("B", numbered("B", 3))]))?;

    let output = run(&db, &["import", "--dir", &*data.to_string_lossy()])?;
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Import completed: 2 created, 0 updated"));
    assert!(!stdout.contains("All files:"));

    let pool = open_store(&db).await;
    assert_eq!(record_count(&pool).await, 2);
    let b_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM his_icd_diagnosis WHERE code LIKE 'B%'")
            .fetch_one(&pool)
            .await?;
    assert_eq!(b_rows, 0);
    pool.close().await;
    Ok(())
}

#[test]
fn malformed_file_fails_with_exit_one() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("diagnosis.sqlite3");
    let xml = tmp.path().join("icd10_broken.xml");
    fs::write(&xml, "<ICD10CM.tabular><chapter>")?;

    let output = run(&db, &["import", &*xml.to_string_lossy()])?;
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
    Ok(())
}

#[test]
fn validate_and_scan() -> Result<()> {
    let tmp = tempdir()?;
    let db = tmp.path().join("diagnosis.sqlite3");
    let good = tmp.path().join("icd10cm_tabular_2026.xml");
    fs::write(&good, tabular(&[("A", numbered("A", 1))]))?;
    let plain = tmp.path().join("icd_notes.xml");
    fs::write(&plain, "<notes><note>nothing here</note></notes>")?;

    let output = run(&db, &["validate", &*good.to_string_lossy()])?;
    assert!(output.status.success(), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("valid ICD-10 XML (ICD10CM.tabular)"));

    let output = run(&db, &["validate", &*plain.to_string_lossy()])?;
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));

    let output = run(&db, &["scan", &*tmp.path().to_string_lossy(), "--json"])?;
    assert!(output.status.success(), "{}", describe(&output));
    let found: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let found = found.as_array().expect("array");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["kind"], "tabular");
    Ok(())
}
