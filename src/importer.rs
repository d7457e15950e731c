use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::{
    fs::{create_dir_all, read_dir, File},
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::config::ImportOptions;
use crate::import::{ImportEvent, ImportObserver, ImportSummary};

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// JSON-lines log of a single import run.
pub struct ImportLogger {
    file: File,
    seq: u64,
    bytes: u64,
    max_bytes: u64,
    truncated: bool,
}

impl ImportLogger {
    pub fn new(dir: &Path) -> anyhow::Result<(Self, PathBuf)> {
        Self::with_limit(dir, MAX_LOG_BYTES)
    }

    pub fn with_limit(dir: &Path, max_bytes: u64) -> anyhow::Result<(Self, PathBuf)> {
        create_dir_all(dir)?;
        let ts = Utc::now().format("%Y%m%d_%H%M%S");
        let mut path = dir.to_path_buf();
        let mut counter = 0;
        loop {
            let name = if counter == 0 {
                format!("import_{}.log", ts)
            } else {
                format!("import_{}_{}.log", ts, counter)
            };
            path.push(&name);
            if !path.exists() {
                break;
            }
            path.pop();
            counter += 1;
        }
        let f = File::create(&path)?;
        Ok((
            Self {
                file: f,
                seq: 0,
                bytes: 0,
                max_bytes,
                truncated: false,
            },
            path,
        ))
    }

    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self.file, "{}", line);
        let _ = self.file.flush();
        self.bytes += line.len() as u64 + 1;
    }

    pub fn record(&mut self, level: &str, event: &str, mut v: Value) -> Option<Value> {
        if self.truncated {
            return None;
        }
        let obj = v.as_object_mut()?;
        obj.insert(
            "ts".into(),
            Utc::now()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );
        self.seq += 1;
        obj.insert("seq".into(), self.seq.into());
        obj.insert("level".into(), level.into());
        obj.insert("event".into(), event.into());
        let line = serde_json::to_string(&v).ok()?;
        let needed = line.len() as u64 + 1;
        if self.bytes + needed > self.max_bytes {
            let warn = json!({
                "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "level": "warn",
                "seq": self.seq,
                "event": "warning",
                "fields": {"reason": "log_truncated"}
            });
            if let Ok(w) = serde_json::to_string(&warn) {
                self.write_line(&w);
            }
            self.truncated = true;
            return None;
        }
        self.write_line(&line);
        Some(v)
    }

    pub fn start(&mut self, source: &Path, options: &ImportOptions) {
        self.record(
            "info",
            "start",
            json!({
                "fields": {
                    "source": source.display().to_string(),
                    "version": options.version,
                    "dry_run": options.dry_run,
                    "platform": std::env::consts::OS,
                }
            }),
        );
    }

    pub fn done(&mut self, summary: &ImportSummary) {
        self.record(
            "info",
            "done",
            json!({
                "duration_ms": summary.duration_ms,
                "fields": {
                    "created": summary.counts.created,
                    "updated": summary.counts.updated,
                    "skipped": summary.counts.skipped,
                    "dry_run": summary.dry_run,
                }
            }),
        );
    }

    pub fn error(&mut self, err: &dyn std::fmt::Display) {
        self.record(
            "error",
            "error",
            json!({"fields": {"source": err.to_string()}}),
        );
    }
}

impl ImportObserver for ImportLogger {
    fn on_event(&mut self, event: &ImportEvent<'_>) {
        match event {
            ImportEvent::Chapter { label } => {
                self.record("info", "chapter", json!({"fields": {"category": label}}));
            }
            ImportEvent::Progress { processed } => {
                self.record("info", "progress", json!({"fields": {"processed": processed}}));
            }
        }
    }
}

/// Keep only the newest `max_files` files in `dir`.
pub fn cleanup_logs(dir: &Path, max_files: usize) {
    if let Ok(entries) = read_dir(dir) {
        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.is_file() {
                    let meta = e.metadata().ok()?;
                    let created = meta.created().or_else(|_| meta.modified()).ok()?;
                    Some((created, path))
                } else {
                    None
                }
            })
            .collect();
        files.sort_by(|(ta, pa), (tb, pb)| ta.cmp(tb).then_with(|| pa.cmp(pb)));
        let len = files.len();
        if len > max_files {
            for (_, p) in files.into_iter().take(len - max_files) {
                let _ = std::fs::remove_file(p);
            }
        }
    }
}
