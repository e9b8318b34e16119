//! Export the manifest as a flat JSON array.
//!
//! Unlike the manifest file itself, each element carries its fingerprint so
//! the output can be fed to tools that expect a list of records.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::digest::Fingerprint;
use crate::manifest::Manifest;

#[derive(Serialize)]
struct Record<'a> {
    fingerprint: &'a Fingerprint,
    filename: &'a str,
    message_id: &'a str,
    first_seen: DateTime<Utc>,
}

/// Export every manifest entry to a pretty-printed JSON file.
pub fn export_json(manifest: &Manifest, output_path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(output_path)?;
    write_json(manifest, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Write the JSON array to any writer.
pub fn write_json<W: Write>(manifest: &Manifest, out: &mut W) -> serde_json::Result<()> {
    let records: Vec<Record<'_>> = manifest
        .iter()
        .map(|(fp, entry)| Record {
            fingerprint: fp,
            filename: &entry.filename,
            message_id: &entry.message_id,
            first_seen: entry.timestamp,
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &records)?;
    out.write_all(b"\n").map_err(serde_json::Error::io)
}
