// src/capture/retention.rs
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};

/// Prunes `YYYY/MM/DD` day directories older than the retention window.
pub struct DateTreeRetention {
    root: PathBuf,
    retention_days: u64,
}

impl DateTreeRetention {
    pub fn new(root: PathBuf, retention_days: u64) -> Self {
        Self {
            root,
            retention_days,
        }
    }

    /// Removes every day directory strictly before `today - retention_days`.
    /// Returns the removed day directories.
    pub fn run(&self, today: NaiveDate) -> anyhow::Result<Vec<PathBuf>> {
        let days = i64::try_from(self.retention_days).unwrap_or(i64::MAX / 2);
        let cutoff = Duration::try_days(days)
            .and_then(|d| today.checked_sub_signed(d))
            .unwrap_or(NaiveDate::MIN);

        let mut removed = Vec::new();

        for year_dir in numeric_dirs(&self.root) {
            for month_dir in numeric_dirs(&year_dir) {
                for day_dir in numeric_dirs(&month_dir) {
                    let Some(date) = date_of(&day_dir) else {
                        continue;
                    };
                    if date >= cutoff {
                        continue;
                    }
                    match fs::remove_dir_all(&day_dir) {
                        Ok(()) => {
                            log::info!("[retention] removed {}", day_dir.display());
                            removed.push(day_dir);
                        }
                        Err(err) => {
                            log::warn!("[retention] failed {}: {}", day_dir.display(), err);
                        }
                    }
                }
                remove_if_empty(&month_dir);
            }
            remove_if_empty(&year_dir);
        }

        Ok(removed)
    }
}

fn numeric_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
        .collect();
    dirs.sort();
    dirs
}

fn date_of(day_dir: &Path) -> Option<NaiveDate> {
    let day = day_dir.file_name()?.to_str()?.parse().ok()?;
    let month_dir = day_dir.parent()?;
    let month = month_dir.file_name()?.to_str()?.parse().ok()?;
    let year = month_dir.parent()?.file_name()?.to_str()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn remove_if_empty(dir: &Path) {
    // remove_dir refuses non-empty directories, which is what we want
    let _ = fs::remove_dir(dir);
}
