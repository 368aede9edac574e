use crate::error::HarvestError;
use crate::results::ItemRecord;
use serde::Serialize;
use serde_json::Serializer;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes `records` as a JSON array indented by four spaces, replacing `path`.
///
/// The array goes to a sibling temporary file first and is renamed over
/// the target, so readers never see a half-written file. Non-ASCII text is
/// written as UTF-8, not escaped.
pub fn write_records(path: &Path, records: &[ItemRecord]) -> Result<(), HarvestError> {
    let output_error = |source| HarvestError::Output {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(output_error)?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(output_error)?;
    let written = write_pretty(BufWriter::new(file), records)
        .map_err(|e| {
            if e.is_io() {
                output_error(e.into())
            } else {
                HarvestError::Serialize(e)
            }
        })
        .and_then(|()| fs::rename(&tmp, path).map_err(output_error));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written?;

    ::log::debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

fn write_pretty<W: Write>(mut writer: W, records: &[ItemRecord]) -> Result<(), serde_json::Error> {
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut writer, formatter);
    records.serialize(&mut serializer)?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(serde_json::Error::io)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "items.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
