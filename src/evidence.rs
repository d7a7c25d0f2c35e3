// src/evidence.rs
//
// Violation evidence persistence and read-side queries. One frame with N
// violations produces exactly one image artifact and one sibling text
// artifact, keyed `violation_{frame_id}_{timestamp}`. Artifacts are
// written once and never mutated; retention/cleanup is somebody else's
// job.

use crate::artifacts::write_atomic;
use crate::types::Violation;
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

pub struct EvidenceWriter {
    violations_dir: PathBuf,
}

impl EvidenceWriter {
    pub fn new(violations_dir: impl Into<PathBuf>) -> Self {
        Self {
            violations_dir: violations_dir.into(),
        }
    }

    /// Persist one frame's violations: the annotated JPEG plus a text
    /// record listing each violation's label and box. Both artifacts are
    /// published atomically so a directory listing never sees a partial
    /// file. Returns the image path.
    pub fn write(&self, frame_jpeg: &[u8], violations: &[Violation]) -> Result<PathBuf> {
        debug_assert!(!violations.is_empty());

        let frame_id = violations[0].frame_id;
        let stamp = violations[0].timestamp.format("%Y%m%d_%H%M%S");
        let stem = format!("violation_{}_{}", frame_id, stamp);

        let img_path = self.violations_dir.join(format!("{}.jpg", stem));
        let txt_path = self.violations_dir.join(format!("{}.txt", stem));

        let mut record = String::new();
        for v in violations {
            let b = v.detection.bbox;
            writeln!(
                record,
                "{} violation: [{}, {}, {}, {}]",
                v.detection.label.as_str(),
                b[0] as i32,
                b[1] as i32,
                b[2] as i32,
                b[3] as i32,
            )?;
        }

        write_atomic(&img_path, frame_jpeg)?;
        write_atomic(&txt_path, record.as_bytes())?;

        info!(
            "💾 Logged {} violation(s) to {}",
            violations.len(),
            img_path.display()
        );
        Ok(img_path)
    }
}

// ============================================================================
// READ-SIDE QUERIES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EvidenceEntry {
    pub file: String,
    pub ts: String,
}

/// Newest-first listing of evidence images, capped at `limit`.
pub fn list_recent(violations_dir: &Path, limit: usize) -> Vec<EvidenceEntry> {
    let mut entries: Vec<(PathBuf, std::time::SystemTime)> = WalkDir::new(violations_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("jpg"))
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let mtime = e.metadata().ok()?.modified().ok()?;
            Some((e.into_path(), mtime))
        })
        .collect();

    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(limit);

    entries
        .into_iter()
        .map(|(path, mtime)| EvidenceEntry {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ts: format_mtime(mtime),
        })
        .collect()
}

/// Daily violation counts for the trailing 7 days, oldest first, keyed
/// "%d.%m" from artifact modification times.
#[derive(Debug, Clone, Serialize)]
pub struct DailyCounts {
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

pub fn daily_counts(violations_dir: &Path) -> DailyCounts {
    let today = Local::now().date_naive();
    let labels: Vec<String> = (0..7)
        .rev()
        .map(|i| {
            (today - chrono::Duration::days(i))
                .format("%d.%m")
                .to_string()
        })
        .collect();
    let mut values = vec![0u64; labels.len()];

    for entry in WalkDir::new(violations_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let is_jpg = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jpg"))
            .unwrap_or(false);
        if !is_jpg {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(mtime) = meta.modified() else { continue };
        let day = DateTime::<Local>::from(mtime).format("%d.%m").to_string();
        if let Some(idx) = labels.iter().position(|l| *l == day) {
            values[idx] += 1;
        }
    }

    DailyCounts { labels, values }
}

fn format_mtime(mtime: std::time::SystemTime) -> String {
    DateTime::<Local>::from(mtime)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, Label};
    use chrono::TimeZone;

    fn violation(frame_id: u64, bbox: [f32; 4], ts: DateTime<Local>) -> Violation {
        Violation {
            detection: Detection {
                label: Label::Car,
                bbox,
                confidence: 0.9,
                light_color: None,
            },
            frame_id,
            timestamp: ts,
        }
    }

    #[test]
    fn test_one_frame_one_image_one_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EvidenceWriter::new(dir.path());
        let ts = Local::now();

        let violations = vec![
            violation(42, [650.0, 400.0, 700.0, 450.0], ts),
            violation(42, [610.0, 360.0, 790.0, 490.0], ts),
            violation(42, [620.0, 370.0, 780.0, 480.0], ts),
        ];
        let jpeg = b"\xff\xd8frame\xff\xd9";
        let img_path = writer.write(jpeg, &violations).unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .collect();
        assert_eq!(files.len(), 2);

        let txt_path = img_path.with_extension("txt");
        let record = std::fs::read_to_string(&txt_path).unwrap();
        assert_eq!(record.lines().count(), 3);
        assert!(record.starts_with("car violation: [650, 400, 700, 450]"));
        assert_eq!(std::fs::read(&img_path).unwrap(), jpeg);
    }

    #[test]
    fn test_artifact_key_format() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EvidenceWriter::new(dir.path());
        let ts = Local
            .with_ymd_and_hms(2026, 8, 30, 14, 5, 9)
            .single()
            .unwrap();
        let img_path = writer
            .write(b"\xff\xd8x\xff\xd9", &[violation(7, [0.0, 0.0, 10.0, 10.0], ts)])
            .unwrap();
        assert_eq!(
            img_path.file_name().unwrap(),
            "violation_7_20260830_140509.jpg"
        );
    }

    #[test]
    fn test_listing_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EvidenceWriter::new(dir.path());
        let ts = Local::now();

        writer
            .write(b"\xff\xd8a\xff\xd9", &[violation(1, [0.0, 0.0, 5.0, 5.0], ts)])
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        writer
            .write(
                b"\xff\xd8b\xff\xd9",
                &[violation(2, [0.0, 0.0, 5.0, 5.0], ts + chrono::Duration::seconds(1))],
            )
            .unwrap();

        let recent = list_recent(dir.path(), 200);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].file.starts_with("violation_2_"));

        let limited = list_recent(dir.path(), 1);
        assert_eq!(limited.len(), 1);

        let counts = daily_counts(dir.path());
        assert_eq!(counts.labels.len(), 7);
        assert_eq!(counts.values.iter().sum::<u64>(), 2);
        assert_eq!(*counts.values.last().unwrap(), 2); // both written today
    }
}
