//! Manifest querying utilities.

use chrono::{DateTime, Utc};

use crate::digest::Fingerprint;
use crate::manifest::{Manifest, ManifestEntry};

/// Return the first-seen range (oldest, newest) across all entries.
pub fn first_seen_range(manifest: &Manifest) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut iter = manifest.iter().map(|(_, e)| e.timestamp);
    let first = iter.next()?;
    Some(iter.fold((first, first), |(min, max), t| (min.min(t), max.max(t))))
}

/// Return the `n` most recently recorded entries, newest first.
pub fn most_recent(manifest: &Manifest, n: usize) -> Vec<(&Fingerprint, &ManifestEntry)> {
    let mut entries: Vec<_> = manifest.iter().collect();
    entries.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
    entries.truncate(n);
    entries
}

/// Count entries per lowercase file extension, most common first.
pub fn extension_counts(manifest: &Manifest) -> Vec<(String, usize)> {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for (_, entry) in manifest.iter() {
        let ext = std::path::Path::new(&entry.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "(none)".to_string());
        *counts.entry(ext).or_default() += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::fingerprint;
    use chrono::TimeZone;

    fn entry(name: &str, day: u32) -> ManifestEntry {
        ManifestEntry {
            filename: name.to_string(),
            message_id: format!("m-{day}"),
            timestamp: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
        }
    }

    fn manifest() -> Manifest {
        let mut m = Manifest::new();
        m.record(fingerprint(b"a"), entry("a.pdf", 3)).unwrap();
        m.record(fingerprint(b"b"), entry("b.PDF", 1)).unwrap();
        m.record(fingerprint(b"c"), entry("c.docx", 9)).unwrap();
        m
    }

    #[test]
    fn test_first_seen_range() {
        let (min, max) = first_seen_range(&manifest()).unwrap();
        assert_eq!(min, Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(max, Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap());
        assert!(first_seen_range(&Manifest::new()).is_none());
    }

    #[test]
    fn test_most_recent_is_newest_first() {
        let m = manifest();
        let recent = most_recent(&m, 2);
        let names: Vec<_> = recent.iter().map(|(_, e)| e.filename.as_str()).collect();
        assert_eq!(names, vec!["c.docx", "a.pdf"]);
    }

    #[test]
    fn test_extension_counts_are_case_insensitive() {
        let counts = extension_counts(&manifest());
        assert_eq!(counts[0], ("pdf".to_string(), 2));
        assert_eq!(counts[1], ("docx".to_string(), 1));
    }
}
