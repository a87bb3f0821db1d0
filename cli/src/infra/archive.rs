//! Tar packing for container file transfer.
//!
//! Archives are streamed to `docker cp -`, which extracts them into a
//! directory inside the container.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// True if any filter substring occurs in `path`.
fn excluded(path: &Path, filter: &[String]) -> bool {
    let path = path.to_string_lossy();
    filter.iter().any(|f| !f.is_empty() && path.contains(f.as_str()))
}

fn append_tree(
    builder: &mut tar::Builder<Vec<u8>>,
    dir: &Path,
    name: &Path,
    filter: &[String],
) -> Result<()> {
    builder
        .append_dir(name, dir)
        .with_context(|| format!("archiving {}", dir.display()))?;
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("reading directory {}", dir.display()))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let entry_name = name.join(entry.file_name());
        if excluded(&entry_name, filter) {
            continue;
        }
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("reading file type of {}", path.display()))?;
        if file_type.is_dir() {
            append_tree(builder, &path, &entry_name, filter)?;
        } else {
            builder
                .append_path_with_name(&path, &entry_name)
                .with_context(|| format!("archiving {}", path.display()))?;
        }
    }
    Ok(())
}

/// Pack `src` under the single top-level name `arcname`.
///
/// Directories are walked recursively; entries whose archive path contains a
/// `filter` substring are left out, and so is everything beneath them.
///
/// # Errors
///
/// Returns an error if `src` cannot be read.
pub fn pack_path(src: &Path, arcname: &str, filter: &[String]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    if src.is_dir() {
        append_tree(&mut builder, src, Path::new(arcname), filter)?;
    } else {
        builder
            .append_path_with_name(src, arcname)
            .with_context(|| format!("archiving {}", src.display()))?;
    }
    builder.into_inner().context("finishing archive")
}

/// Pack in-memory `contents` as a single file `name` with `mode`.
///
/// # Errors
///
/// Returns an error if `name` is not a valid archive path.
pub fn pack_bytes(name: &str, contents: &[u8], mode: u32) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header
        .set_path(name)
        .with_context(|| format!("invalid archive path {name}"))?;
    header.set_size(contents.len() as u64);
    header.set_mode(mode);
    header.set_mtime(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    );
    header.set_cksum();
    builder
        .append(&header, contents)
        .context("archiving file contents")?;
    builder.into_inner().context("finishing archive")
}

/// Split a container destination into the extraction directory and the
/// top-level archive name: `/a/b/c` becomes `("/a/b", "c")`.
#[must_use]
pub fn split_destination(dst: &str) -> (&str, &str) {
    let trimmed = dst.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => (".", trimmed),
    }
}
