use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;

/// Write `bytes` to a temporary sibling and atomically rename it over `path`.
/// A concurrent reader never observes a partially-written target.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Render a header plus rows into an in-memory CSV buffer.
pub fn render_csv<R, F>(header: &[&str], rows: R) -> Result<Vec<u8>>
where
    R: IntoIterator<Item = F>,
    F: IntoIterator<Item = String>,
{
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(header)?;
    for row in rows {
        w.write_record(row)?;
    }
    Ok(w.into_inner().context("flush csv buffer")?)
}

/// Rewrite a whole CSV file atomically.
pub fn atomic_write_csv<R, F>(path: &Path, header: &[&str], rows: R) -> Result<()>
where
    R: IntoIterator<Item = F>,
    F: IntoIterator<Item = String>,
{
    atomic_write(path, &render_csv(header, rows)?)
}

/// Append rows to a CSV file, writing the header only when creating it.
pub fn append_csv<R, F>(path: &Path, header: &[&str], rows: R) -> Result<()>
where
    R: IntoIterator<Item = F>,
    F: IntoIterator<Item = String>,
{
    let write_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {} for append", path.display()))?;
    let mut w = WriterBuilder::new().has_headers(false).from_writer(file);
    if write_header {
        w.write_record(header)?;
    }
    for row in rows {
        w.write_record(row)?;
    }
    w.flush()?;
    Ok(())
}
