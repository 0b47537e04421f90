//! Per-job working directory.
//!
//! ```text
//! <work_root>/<job_id>/
//!   images/            imported photos
//!   database.db        features and matches
//!   sparse/0/          reconstructed model(s)
//!   output/points.ply  exported point file
//!   output/model/      exported text model
//!   output/mesh.obj    final mesh
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::StageError;
use super::stage::{
    StageKind, StagePath, DATABASE_FILE, IMAGES_DIR, MESH_FILE, OUTPUT_DIR, POINTS_FILE,
    SPARSE_DIR, TEXT_MODEL_DIR, TEXT_POINTS_FILE,
};
use crate::sanitize;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PHOTO_EXTENSIONS.iter().any(|p| e.eq_ignore_ascii_case(p)))
        .unwrap_or(false)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StageError + '_ {
    move |source| StageError::Workspace {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates `<work_root>/<job_id>`. Fails if it already exists: working
    /// directories are never shared or reused.
    pub fn create(work_root: &Path, job_id: &str) -> Result<Self, StageError> {
        fs::create_dir_all(work_root).map_err(io_error(work_root))?;
        let root = work_root.join(job_id);
        fs::create_dir(&root).map_err(io_error(&root))?;
        fs::create_dir(root.join(IMAGES_DIR)).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    /// Wraps an existing directory without touching it.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(work_root: &Path, job_id: &str) -> PathBuf {
        work_root.join(job_id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn sparse_dir(&self) -> PathBuf {
        self.root.join(SPARSE_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn points_path(&self) -> PathBuf {
        self.join_relative(POINTS_FILE)
    }

    pub fn text_model_dir(&self) -> PathBuf {
        self.join_relative(TEXT_MODEL_DIR)
    }

    pub fn mesh_path(&self) -> PathBuf {
        self.join_relative(MESH_FILE)
    }

    fn join_relative(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root.clone(), |acc, c| acc.join(c))
    }

    /// The reconstructed model: the numerically smallest numbered directory
    /// under `sparse/`.
    pub fn find_model_dir(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(self.sparse_dir()).ok()?;
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| {
                let index: u32 = e.file_name().to_str()?.parse().ok()?;
                Some((index, e.path()))
            })
            .min_by_key(|(index, _)| *index)
            .map(|(_, path)| path)
    }

    /// The model directory relative to the root, if one exists.
    pub fn model_dir_relative(&self) -> Option<PathBuf> {
        self.find_model_dir()
            .and_then(|dir| dir.strip_prefix(&self.root).ok().map(Path::to_path_buf))
    }

    pub fn resolve(&self, path: &StagePath) -> Option<PathBuf> {
        match path {
            StagePath::Relative(relative) => Some(self.join_relative(relative)),
            StagePath::SparseModel(sub) => self.find_model_dir().map(|dir| {
                if sub.is_empty() {
                    dir
                } else {
                    dir.join(sub)
                }
            }),
        }
    }

    /// Describes a path for error messages, even when it cannot be resolved.
    pub fn describe(&self, path: &StagePath) -> PathBuf {
        self.resolve(path).unwrap_or_else(|| match path {
            StagePath::Relative(relative) => self.join_relative(relative),
            StagePath::SparseModel(sub) => self.sparse_dir().join("<model>").join(sub),
        })
    }

    /// Point cloud files to try, in decode priority order: the exported point
    /// file, then the exported text model, then a text model written directly
    /// by reconstruction.
    pub fn point_cloud_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = vec![
            self.points_path(),
            self.text_model_dir().join(TEXT_POINTS_FILE),
        ];
        if let Some(model) = self.find_model_dir() {
            candidates.push(model.join(TEXT_POINTS_FILE));
        }
        candidates.into_iter().filter(|p| p.is_file()).collect()
    }

    /// Copies the photos found directly in `source` into `images/`, returning
    /// how many were imported.
    pub fn import_photos(&self, source: &Path) -> Result<usize, StageError> {
        let entries = fs::read_dir(source).map_err(|_| StageError::MissingInput {
            stage: StageKind::FeatureExtraction,
            path: source.to_path_buf(),
        })?;

        let mut photos: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_photo(p))
            .collect();
        photos.sort();

        let images = self.images_dir();
        fs::create_dir_all(&images).map_err(io_error(&images))?;
        for photo in &photos {
            let Some(name) = photo.file_name() else {
                continue;
            };
            let target = images.join(name);
            fs::copy(photo, &target).map_err(io_error(&target))?;
        }

        debug!(
            source = %sanitize::redact_path(source),
            count = photos.len(),
            "Imported photos"
        );
        Ok(photos.len())
    }
}

/// True for an existing file, or an existing directory with at least one entry.
pub fn is_present(path: &Path) -> bool {
    if path.is_file() {
        return true;
    }
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
