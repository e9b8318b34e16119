//! Check saved attachments against the manifest.
//!
//! Every entry names a file in the destination directory. Verification
//! rehashes that file and reports entries whose file has gone missing or no
//! longer holds the recorded content.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::digest::{fingerprint_reader, Fingerprint};
use crate::manifest::Manifest;

/// Verification state of one manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ok,
    Missing,
    Mismatch,
    Unreadable,
}

/// One entry that failed verification.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
    pub status: FileStatus,
    /// Underlying I/O error for unreadable files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of verifying a whole manifest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub ok: usize,
    pub problems: Vec<Problem>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.problems.iter().filter(|p| p.status == status).count()
    }
}

/// Rehash every entry's file under `destination`.
pub fn verify(manifest: &Manifest, destination: &Path) -> VerifyReport {
    let mut report = VerifyReport::default();
    for (fp, entry) in manifest.iter() {
        report.checked += 1;
        let path = destination.join(&entry.filename);
        let (status, detail) = check_file(&path, fp);
        debug!(path = %path.display(), status = ?status, "Verified");
        if status == FileStatus::Ok {
            report.ok += 1;
        } else {
            report.problems.push(Problem {
                fingerprint: *fp,
                path,
                status,
                detail,
            });
        }
    }
    report
}

fn check_file(path: &Path, expected: &Fingerprint) -> (FileStatus, Option<String>) {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (FileStatus::Missing, None),
        Err(e) => return (FileStatus::Unreadable, Some(e.to_string())),
    };
    match fingerprint_reader(std::io::BufReader::new(file)) {
        Ok(actual) if actual == *expected => (FileStatus::Ok, None),
        Ok(_) => (FileStatus::Mismatch, None),
        Err(e) => (FileStatus::Unreadable, Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::fingerprint;
    use crate::manifest::ManifestEntry;

    #[test]
    fn test_verify_reports_missing_and_mismatched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.pdf"), b"good").unwrap();
        std::fs::write(dir.path().join("changed.pdf"), b"edited").unwrap();

        let mut manifest = Manifest::new();
        manifest
            .record(fingerprint(b"good"), ManifestEntry::now("good.pdf", "m1"))
            .unwrap();
        manifest
            .record(fingerprint(b"original"), ManifestEntry::now("changed.pdf", "m2"))
            .unwrap();
        manifest
            .record(fingerprint(b"gone"), ManifestEntry::now("gone.pdf", "m3"))
            .unwrap();

        let report = verify(&manifest, dir.path());
        assert_eq!(report.checked, 3);
        assert_eq!(report.ok, 1);
        assert!(!report.is_clean());
        assert_eq!(report.count(FileStatus::Missing), 1);
        assert_eq!(report.count(FileStatus::Mismatch), 1);
        let missing = report
            .problems
            .iter()
            .find(|p| p.status == FileStatus::Missing)
            .unwrap();
        assert_eq!(missing.fingerprint, fingerprint(b"gone"));
        assert_eq!(missing.path, dir.path().join("gone.pdf"));
    }

    #[test]
    fn test_empty_manifest_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let report = verify(&Manifest::new(), dir.path());
        assert!(report.is_clean());
        assert_eq!(report.checked, 0);
    }
}
