use std::fs;
use std::io::Write;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::RsError;

pub fn fs_err(path: &Utf8Path, err: impl std::fmt::Display) -> RsError {
    RsError::Filesystem(format!("{path}: {err}"))
}

/// Creates `path` and any missing parents with permissive access.
pub fn create_dir_permissive(path: &Utf8Path) -> Result<(), RsError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder
        .create(path.as_std_path())
        .map_err(|err| fs_err(path, err))
}

/// Writes `content` to a temp file next to `path`, syncs it, then renames it into place.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RsError> {
    let parent = parent_dir(path)?;
    fs::create_dir_all(parent.as_std_path()).map_err(|err| fs_err(parent, err))?;
    let mut temp = Builder::new()
        .prefix(".rs-ec-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| fs_err(parent, err))?;
    temp.write_all(content).map_err(|err| fs_err(path, err))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| fs_err(path, err))?;
    temp.persist(path.as_std_path())
        .map_err(|err| fs_err(path, err.error))?;
    Ok(())
}

/// Copies the `source` tree into a temp directory beside `dest`, then renames it into place.
/// Fails if `dest` already exists.
pub fn copy_dir_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), RsError> {
    if dest.exists() {
        return Err(RsError::Filesystem(format!(
            "refusing to overwrite existing dataset: {dest}"
        )));
    }
    let parent = parent_dir(dest)?;
    fs::create_dir_all(parent.as_std_path()).map_err(|err| fs_err(parent, err))?;
    let staging = Builder::new()
        .prefix(".rs-ec-tree")
        .tempdir_in(parent.as_std_path())
        .map_err(|err| fs_err(parent, err))?;
    let staged = to_utf8(staging.path().to_path_buf())?;

    for (relative, is_dir) in tree_entries(source)? {
        let target = staged.join(&relative);
        if is_dir {
            fs::create_dir_all(target.as_std_path()).map_err(|err| fs_err(&target, err))?;
        } else {
            let from = source.join(&relative);
            fs::copy(from.as_std_path(), target.as_std_path())
                .map_err(|err| fs_err(&from, err))?;
        }
    }

    fs::rename(staged.as_std_path(), dest.as_std_path()).map_err(|err| fs_err(dest, err))?;
    Ok(())
}

/// Copies every `(source, file name)` pair into a staging directory inside `dest_dir`, then
/// moves them into place. A failed move removes the files already moved.
pub fn copy_set_atomic(
    files: &[(Utf8PathBuf, String)],
    dest_dir: &Utf8Path,
) -> Result<(), RsError> {
    for (_, name) in files {
        let target = dest_dir.join(name);
        if target.exists() {
            return Err(RsError::Filesystem(format!(
                "refusing to overwrite existing file: {target}"
            )));
        }
    }
    fs::create_dir_all(dest_dir.as_std_path()).map_err(|err| fs_err(dest_dir, err))?;
    let staging = Builder::new()
        .prefix(".rs-ec-set")
        .tempdir_in(dest_dir.as_std_path())
        .map_err(|err| fs_err(dest_dir, err))?;
    let staged = to_utf8(staging.path().to_path_buf())?;
    for (source, name) in files {
        fs::copy(source.as_std_path(), staged.join(name).as_std_path())
            .map_err(|err| fs_err(source, err))?;
    }

    let mut moved: Vec<Utf8PathBuf> = Vec::new();
    for (_, name) in files {
        let target = dest_dir.join(name);
        if let Err(err) = fs::rename(staged.join(name).as_std_path(), target.as_std_path()) {
            for path in &moved {
                let _ = fs::remove_file(path.as_std_path());
            }
            return Err(fs_err(&target, err));
        }
        moved.push(target);
    }
    Ok(())
}

/// True when both paths hold byte-identical files or byte-identical trees.
pub fn same_content(left: &Utf8Path, right: &Utf8Path) -> Result<bool, RsError> {
    if left.is_file() && right.is_file() {
        return same_file(left, right);
    }
    if !(left.is_dir() && right.is_dir()) {
        return Ok(false);
    }
    let entries = tree_entries(left)?;
    if entries != tree_entries(right)? {
        return Ok(false);
    }
    for (relative, is_dir) in entries {
        if !is_dir && !same_file(&left.join(&relative), &right.join(&relative))? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn same_file(left: &Utf8Path, right: &Utf8Path) -> Result<bool, RsError> {
    let left_meta = fs::metadata(left.as_std_path()).map_err(|err| fs_err(left, err))?;
    let right_meta = fs::metadata(right.as_std_path()).map_err(|err| fs_err(right, err))?;
    if left_meta.len() != right_meta.len() {
        return Ok(false);
    }
    let left_bytes = fs::read(left.as_std_path()).map_err(|err| fs_err(left, err))?;
    let right_bytes = fs::read(right.as_std_path()).map_err(|err| fs_err(right, err))?;
    Ok(left_bytes == right_bytes)
}

pub fn is_dir_empty(path: &Utf8Path) -> Result<bool, RsError> {
    let mut entries = fs::read_dir(path.as_std_path()).map_err(|err| fs_err(path, err))?;
    Ok(entries.next().is_none())
}

pub fn parent_dir(path: &Utf8Path) -> Result<&Utf8Path, RsError> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => Ok(parent),
        Some(_) => Ok(Utf8Path::new(".")),
        None => Err(RsError::Filesystem(format!(
            "invalid destination path: {path}"
        ))),
    }
}

pub fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, RsError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| RsError::Filesystem(format!("non UTF-8 path: {}", path.display())))
}

/// Root-relative entries under `root`, parents before children, sorted by path.
fn tree_entries(root: &Utf8Path) -> Result<Vec<(Utf8PathBuf, bool)>, RsError> {
    let mut entries = Vec::new();
    let mut pending = vec![Utf8PathBuf::new()];
    while let Some(relative) = pending.pop() {
        let dir = root.join(&relative);
        for entry in fs::read_dir(dir.as_std_path()).map_err(|err| fs_err(&dir, err))? {
            let entry = entry.map_err(|err| fs_err(&dir, err))?;
            let name = entry.file_name().into_string().map_err(|name| {
                RsError::Filesystem(format!("non UTF-8 path in {dir}: {name:?}"))
            })?;
            let child = relative.join(name);
            let is_dir = entry
                .file_type()
                .map_err(|err| fs_err(&dir, err))?
                .is_dir();
            if is_dir {
                pending.push(child.clone());
            }
            entries.push((child, is_dir));
        }
    }
    entries.sort();
    Ok(entries)
}
