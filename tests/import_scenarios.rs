use anyhow::Result;
use icd10_import_lib::store::get_record;
use icd10_import_lib::{import_xml, CodingSystemVersion, ImportCounts, ImportOptions};
use std::future::pending;

#[path = "util.rs"]
mod util;

use util::{diag, numbered, record_count, tabular, temp_store};

#[tokio::test]
async fn two_entries_into_empty_store() -> Result<()> {
    let (_dir, pool) = temp_store().await;
    let xml = tabular(&[(
        "Certain infectious diseases",
        vec![diag("A00", "Cholera"), diag("A01", "Typhoid")],
    )]);

    let summary = import_xml(&pool, &xml, &ImportOptions::default(), &mut (), pending()).await?;
    assert_eq!(
        summary.counts,
        ImportCounts {
            created: 2,
            updated: 0,
            skipped: 0
        }
    );
    assert_eq!(record_count(&pool).await, 2);

    for (code, desc) in [("A00", "Cholera"), ("A01", "Typhoid")] {
        let record = get_record(&pool, code, CodingSystemVersion::Icd10)
            .await?
            .expect("record committed");
        assert_eq!(record.description, desc);
        assert_eq!(record.category, "Certain infectious diseases");
        assert_eq!(record.coding_system_version, CodingSystemVersion::Icd10);
        assert!(record.is_active);
    }
    Ok(())
}

#[tokio::test]
async fn rerun_updates_every_entry_and_keeps_state() -> Result<()> {
    let (_dir, pool) = temp_store().await;
    let xml = tabular(&[
        ("Neoplasms", numbered("C", 40)),
        ("Diseases of the blood", numbered("D", 25)),
    ]);
    let opts = ImportOptions::default();

    let first = import_xml(&pool, &xml, &opts, &mut (), pending()).await?;
    assert_eq!((first.counts.created, first.counts.updated), (65, 0));
    let before: Vec<(String, String, String, bool)> = sqlx::query_as(
        "SELECT id, description, category, active FROM his_icd_diagnosis ORDER BY code",
    )
    .fetch_all(&pool)
    .await?;

    let second = import_xml(&pool, &xml, &opts, &mut (), pending()).await?;
    assert_eq!((second.counts.created, second.counts.updated), (0, 65));
    let after: Vec<(String, String, String, bool)> = sqlx::query_as(
        "SELECT id, description, category, active FROM his_icd_diagnosis ORDER BY code",
    )
    .fetch_all(&pool)
    .await?;

    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn category_comes_from_chapter_through_nested_sections() -> Result<()> {
    let (_dir, pool) = temp_store().await;
    let xml = "<ICD10CM.tabular><chapter><desc>Infectious diseases</desc>\
        <section id=\"outer\"><section id=\"inner\"><section id=\"deepest\">\
        <diag><name>A15</name><desc>Respiratory tuberculosis</desc></diag>\
        </section></section></section></chapter></ICD10CM.tabular>";

    let summary = import_xml(&pool, xml, &ImportOptions::default(), &mut (), pending()).await?;
    // Each enclosing section revisits the diag; only the first visit creates.
    assert_eq!((summary.counts.created, summary.counts.updated), (1, 2));
    assert_eq!(record_count(&pool).await, 1);

    let record = get_record(&pool, "A15", CodingSystemVersion::Icd10)
        .await?
        .expect("record committed");
    assert_eq!(record.category, "Infectious diseases");
    Ok(())
}

#[tokio::test]
async fn incomplete_entries_are_skipped_and_run_succeeds() -> Result<()> {
    let (_dir, pool) = temp_store().await;
    let xml = tabular(&[(
        "Mixed",
        vec![
            diag("", "Empty code"),
            "<diag><desc>Missing code</desc></diag>".to_string(),
            diag("E10", "   "),
            diag("E11", "Type 2 diabetes mellitus"),
        ],
    )]);

    let summary = import_xml(&pool, &xml, &ImportOptions::default(), &mut (), pending()).await?;
    assert_eq!(
        summary.counts,
        ImportCounts {
            created: 1,
            updated: 0,
            skipped: 3
        }
    );
    assert_eq!(record_count(&pool).await, 1);
    Ok(())
}

#[tokio::test]
async fn update_replaces_description_category_and_reactivates() -> Result<()> {
    let (_dir, pool) = temp_store().await;
    let opts = ImportOptions::default();
    let old = tabular(&[("Old chapter", vec![diag("J45", "Asthma")])]);
    import_xml(&pool, &old, &opts, &mut (), pending()).await?;
    sqlx::query("UPDATE his_icd_diagnosis SET active = 0")
        .execute(&pool)
        .await?;

    let new = tabular(&[("Diseases of the respiratory system", vec![diag(" J45 ", " Asthma, unspecified ")])]);
    let summary = import_xml(&pool, &new, &opts, &mut (), pending()).await?;
    assert_eq!(summary.counts.updated, 1);

    let record = get_record(&pool, "J45", CodingSystemVersion::Icd10)
        .await?
        .expect("record");
    assert_eq!(record.description, "Asthma, unspecified");
    assert_eq!(record.category, "Diseases of the respiratory system");
    assert!(record.is_active);
    Ok(())
}

#[tokio::test]
async fn dry_run_reports_counts_but_writes_nothing() -> Result<()> {
    let (_dir, pool) = temp_store().await;
    let xml = tabular(&[("Neoplasms", numbered("C", 5))]);
    let opts = ImportOptions {
        dry_run: true,
        ..ImportOptions::default()
    };

    let summary = import_xml(&pool, &xml, &opts, &mut (), pending()).await?;
    assert!(summary.dry_run);
    assert_eq!(summary.counts.created, 5);
    assert_eq!(record_count(&pool).await, 0);
    Ok(())
}

#[tokio::test]
async fn same_code_under_another_version_is_a_separate_record() -> Result<()> {
    let (_dir, pool) = temp_store().await;
    let xml = tabular(&[("Chapter", vec![diag("A00", "Cholera")])]);

    import_xml(&pool, &xml, &ImportOptions::default(), &mut (), pending()).await?;
    let icd9 = ImportOptions {
        version: CodingSystemVersion::Icd9,
        ..ImportOptions::default()
    };
    let summary = import_xml(&pool, &xml, &icd9, &mut (), pending()).await?;
    assert_eq!(summary.counts.created, 1);
    assert_eq!(record_count(&pool).await, 2);
    Ok(())
}
