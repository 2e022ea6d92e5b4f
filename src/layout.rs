use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::domain::OutputKind;
use crate::error::RsError;
use crate::fs_util::{self, fs_err};

pub const PROJECT_FILE: &str = "project.rs.xml";
pub const INPUTS_DIR: &str = "Inputs";
pub const REALIZATIONS_DIR: &str = "Realizations";

/// Shapefile components copied alongside the `.shp`, matched case-insensitively.
const SHAPEFILE_PARTS: &[&str] = &[
    "shp", "shx", "dbf", "prj", "cpg", "sbn", "sbx", "qix", "fbn", "fbx", "ain", "aih", "atx",
    "ixs", "mxs", "shp.xml",
];

const SINGLE_FILE_EXTS: &[&str] = &[
    "tif", "tiff", "img", "vrt", "asc", "csv", "dbf", "txt", "json", "geojson", "xml", "gpkg",
    "sqlite", "kml", "rdata", "r",
];

/// What to do when the project root already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingRoot {
    /// Fail with `ProjectExists` unless the root is an empty directory.
    Refuse,
    /// Delete the existing tree and build a fresh one.
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Root,
    Inputs,
    Realizations,
    Realization(OutputKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedArtifact {
    pub path: Utf8PathBuf,
    pub relative_path: String,
    pub files: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactShape {
    Directory,
    Shapefile,
    SingleFile,
}

#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: Utf8PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn document_path(&self) -> Utf8PathBuf {
        self.root.join(PROJECT_FILE)
    }

    pub fn section_dir(&self, section: Section) -> Utf8PathBuf {
        let relative = relative_section(section);
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Absolute location of `file_name` inside `section`. No filesystem access.
    pub fn resolve_path(&self, section: Section, file_name: &str) -> Utf8PathBuf {
        self.section_dir(section).join(file_name)
    }

    /// Root-relative location of `file_name` inside `section`, always `/` separated.
    pub fn relative_path(&self, section: Section, file_name: &str) -> String {
        let relative = relative_section(section);
        if relative.is_empty() {
            file_name.to_string()
        } else {
            format!("{relative}/{file_name}")
        }
    }

    pub fn required_dirs(&self) -> Vec<Utf8PathBuf> {
        let mut dirs = vec![
            self.section_dir(Section::Inputs),
            self.section_dir(Section::Realizations),
        ];
        dirs.extend(
            OutputKind::ALL
                .into_iter()
                .map(|kind| self.section_dir(Section::Realization(kind))),
        );
        dirs
    }

    pub fn ensure_root(&self, policy: ExistingRoot) -> Result<(), RsError> {
        let root = self.root.as_std_path();
        if root.exists() {
            match policy {
                ExistingRoot::Refuse => {
                    if !root.is_dir() || !fs_util::is_dir_empty(&self.root)? {
                        return Err(RsError::ProjectExists(self.root.clone()));
                    }
                }
                ExistingRoot::Rebuild => {
                    warn!(root = %self.root, "removing existing project tree");
                    if root.is_dir() {
                        fs::remove_dir_all(root).map_err(|err| fs_err(&self.root, err))?;
                    } else {
                        fs::remove_file(root).map_err(|err| fs_err(&self.root, err))?;
                    }
                }
            }
        }

        fs_util::create_dir_permissive(&self.root)?;
        self.create_required_dirs()?;
        info!(root = %self.root, "project tree ready");
        Ok(())
    }

    /// Creates whichever required directories are missing under an existing root.
    pub fn repair(&self) -> Result<(), RsError> {
        if !self.root.is_dir() {
            return Err(RsError::Filesystem(format!(
                "project root is not a directory: {}",
                self.root
            )));
        }
        self.create_required_dirs()
    }

    fn create_required_dirs(&self) -> Result<(), RsError> {
        for dir in self.required_dirs() {
            if !dir.is_dir() {
                debug!(dir = %dir, "creating project directory");
                fs_util::create_dir_permissive(&dir)?;
            }
        }
        Ok(())
    }

    /// Directory holding one dataset (or one run's outputs) inside `section`.
    pub fn dataset_dir(&self, section: Section, folder: &str) -> Utf8PathBuf {
        self.section_dir(section).join(folder)
    }

    /// Checks that `source` is a dataset `copy_artifact` can take, without copying anything.
    pub fn check_artifact(&self, source: &Utf8Path) -> Result<(), RsError> {
        if detect_shape(source)? == ArtifactShape::Shapefile {
            shapefile_parts(source)?;
        }
        Ok(())
    }

    /// Copies a dataset into `<section>/<folder>/`, keeping shapefile sidecars and directory
    /// datasets whole. Existing files are never overwritten.
    pub fn copy_artifact(
        &self,
        source: &Utf8Path,
        section: Section,
        folder: &str,
    ) -> Result<CopiedArtifact, RsError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| RsError::Filesystem(format!("artifact has no file name: {source}")))?;
        let shape = detect_shape(source)?;
        let dest_dir = self.dataset_dir(section, folder);
        let dest = dest_dir.join(file_name);

        let files = match shape {
            ArtifactShape::Directory => {
                fs_util::copy_dir_atomic(source, &dest)?;
                1
            }
            ArtifactShape::SingleFile => {
                let file = (source.to_path_buf(), file_name.to_string());
                fs_util::copy_set_atomic(&[file], &dest_dir)?;
                1
            }
            ArtifactShape::Shapefile => {
                let parts = shapefile_parts(source)?;
                fs_util::copy_set_atomic(&parts, &dest_dir)?;
                parts.len()
            }
        };

        info!(source = %source, dest = %dest, files, "copied artifact into project");
        Ok(CopiedArtifact {
            path: dest,
            relative_path: self.relative_path(section, &format!("{folder}/{file_name}")),
            files,
        })
    }

    /// True when the dataset stored at `relative_path` is byte-identical to `source`.
    pub fn holds_same(&self, source: &Utf8Path, relative_path: &str) -> Result<bool, RsError> {
        let stored = self.root.join(relative_path);
        if source.file_name() != stored.file_name() || !stored.exists() {
            return Ok(false);
        }
        match detect_shape(source)? {
            ArtifactShape::Directory | ArtifactShape::SingleFile => {
                fs_util::same_content(source, &stored)
            }
            ArtifactShape::Shapefile => {
                let stored_dir = fs_util::parent_dir(&stored)?;
                for (part, name) in shapefile_parts(source)? {
                    if !fs_util::same_content(&part, &stored_dir.join(&name))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

fn relative_section(section: Section) -> String {
    match section {
        Section::Root => String::new(),
        Section::Inputs => INPUTS_DIR.to_string(),
        Section::Realizations => REALIZATIONS_DIR.to_string(),
        Section::Realization(kind) => format!("{REALIZATIONS_DIR}/{}", kind.dir_name()),
    }
}

fn detect_shape(source: &Utf8Path) -> Result<ArtifactShape, RsError> {
    if source.is_dir() {
        return Ok(ArtifactShape::Directory);
    }
    if !source.is_file() {
        return Err(RsError::Filesystem(format!("artifact not found: {source}")));
    }
    let ext = source
        .extension()
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "shp" {
        Ok(ArtifactShape::Shapefile)
    } else if SINGLE_FILE_EXTS.contains(&ext.as_str()) {
        Ok(ArtifactShape::SingleFile)
    } else {
        Err(RsError::Filesystem(format!(
            "unrecognized artifact type: {source}"
        )))
    }
}

/// Source path and file name of every shapefile component next to `source`.
fn shapefile_parts(source: &Utf8Path) -> Result<Vec<(Utf8PathBuf, String)>, RsError> {
    let stem = source
        .file_stem()
        .ok_or_else(|| RsError::Filesystem(format!("invalid shapefile name: {source}")))?;
    let source_dir = fs_util::parent_dir(source)?;

    let prefix = format!("{stem}.");
    let mut parts = Vec::new();
    let mut found = Vec::new();
    let entries = fs::read_dir(source_dir.as_std_path()).map_err(|err| fs_err(source_dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| fs_err(source_dir, err))?;
        let path = fs_util::to_utf8(entry.path())?;
        let Some(name) = path.file_name().map(str::to_string) else {
            continue;
        };
        let part = match name.strip_prefix(prefix.as_str()) {
            Some(part) => part.to_ascii_lowercase(),
            None => continue,
        };
        if path.is_file() && SHAPEFILE_PARTS.contains(&part.as_str()) {
            found.push(part);
            parts.push((path, name));
        }
    }

    for required in ["shx", "dbf"] {
        if !found.iter().any(|part| part == required) {
            return Err(RsError::Filesystem(format!(
                "shapefile {source} is missing its .{required} component"
            )));
        }
    }
    parts.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(parts)
}
