//! Export the manifest to CSV.
//!
//! Output is UTF-8 with BOM for Excel compatibility.

use std::io::Write;
use std::path::Path;

use crate::manifest::Manifest;

/// Export every manifest entry to a CSV file, ordered by fingerprint.
///
/// Columns: Fingerprint, Filename, Message_ID, First_Seen
pub fn export_csv(manifest: &Manifest, output_path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(output_path)?;
    write_csv(manifest, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Write the CSV document to any writer.
pub fn write_csv<W: Write>(manifest: &Manifest, out: &mut W) -> std::io::Result<()> {
    // UTF-8 BOM for Excel
    out.write_all(&[0xEF, 0xBB, 0xBF])?;
    writeln!(out, "Fingerprint,Filename,Message_ID,First_Seen")?;

    for (fp, entry) in manifest.iter() {
        writeln!(
            out,
            "{},{},{},{}",
            fp,
            csv_escape(&entry.filename),
            csv_escape(&entry.message_id),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )?;
    }
    Ok(())
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
