//! The ordered stage descriptor.
//!
//! Each stage declares the working-directory paths it reads and the
//! directories it writes into, so the dependency between consecutive stages
//! is data the driver can check rather than call-order convention.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    FeatureExtraction,
    FeatureMatching,
    SparseReconstruction,
    ModelRefinement,
    PointExport,
    ModelExport,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::FeatureExtraction => "feature_extraction",
            StageKind::FeatureMatching => "feature_matching",
            StageKind::SparseReconstruction => "sparse_reconstruction",
            StageKind::ModelRefinement => "model_refinement",
            StageKind::PointExport => "point_export",
            StageKind::ModelExport => "model_export",
        }
    }

    /// Subcommand of the reconstruction program that implements the stage.
    pub fn command(&self) -> &'static str {
        match self {
            StageKind::FeatureExtraction => "feature_extractor",
            StageKind::FeatureMatching => "exhaustive_matcher",
            StageKind::SparseReconstruction => "mapper",
            StageKind::ModelRefinement => "bundle_adjuster",
            StageKind::PointExport | StageKind::ModelExport => "model_converter",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A path inside a job's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePath {
    /// Relative to the working directory root, `/`-separated.
    Relative(&'static str),
    /// Relative to the sparse model directory chosen by reconstruction; an
    /// empty string is the model directory itself.
    SparseModel(&'static str),
}

#[derive(Debug, Clone)]
pub struct StageSpec {
    pub kind: StageKind,
    /// Must exist (directories: non-empty) before the stage starts.
    pub inputs: Vec<StagePath>,
    /// Directories created before the stage starts.
    pub outputs: Vec<StagePath>,
    /// A failed optional stage is logged and the pipeline continues.
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub stages: Vec<StageSpec>,
}

pub const IMAGES_DIR: &str = "images";
pub const DATABASE_FILE: &str = "database.db";
pub const SPARSE_DIR: &str = "sparse";
pub const OUTPUT_DIR: &str = "output";
pub const POINTS_FILE: &str = "output/points.ply";
pub const TEXT_MODEL_DIR: &str = "output/model";
pub const TEXT_POINTS_FILE: &str = "points3D.txt";
pub const MESH_FILE: &str = "output/mesh.obj";

impl PipelineDescriptor {
    /// extract → match → map → refine → export points → export text model.
    pub fn standard() -> Self {
        use StagePath::{Relative, SparseModel};

        Self {
            stages: vec![
                StageSpec {
                    kind: StageKind::FeatureExtraction,
                    inputs: vec![Relative(IMAGES_DIR)],
                    outputs: vec![],
                    required: true,
                },
                StageSpec {
                    kind: StageKind::FeatureMatching,
                    inputs: vec![Relative(DATABASE_FILE)],
                    outputs: vec![],
                    required: true,
                },
                StageSpec {
                    kind: StageKind::SparseReconstruction,
                    inputs: vec![Relative(DATABASE_FILE), Relative(IMAGES_DIR)],
                    outputs: vec![Relative(SPARSE_DIR)],
                    required: true,
                },
                StageSpec {
                    kind: StageKind::ModelRefinement,
                    inputs: vec![SparseModel("")],
                    outputs: vec![],
                    required: true,
                },
                StageSpec {
                    kind: StageKind::PointExport,
                    inputs: vec![SparseModel("")],
                    outputs: vec![Relative(OUTPUT_DIR)],
                    required: false,
                },
                StageSpec {
                    kind: StageKind::ModelExport,
                    inputs: vec![SparseModel("")],
                    outputs: vec![Relative(TEXT_MODEL_DIR)],
                    required: false,
                },
            ],
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind).collect()
    }
}

impl Default for PipelineDescriptor {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let descriptor = PipelineDescriptor::standard();
        assert_eq!(
            descriptor.kinds(),
            vec![
                StageKind::FeatureExtraction,
                StageKind::FeatureMatching,
                StageKind::SparseReconstruction,
                StageKind::ModelRefinement,
                StageKind::PointExport,
                StageKind::ModelExport,
            ]
        );
    }

    #[test]
    fn test_only_exports_are_optional() {
        let descriptor = PipelineDescriptor::standard();
        let optional: Vec<StageKind> = descriptor
            .stages
            .iter()
            .filter(|s| !s.required)
            .map(|s| s.kind)
            .collect();
        assert_eq!(optional, vec![StageKind::PointExport, StageKind::ModelExport]);
    }

    #[test]
    fn test_each_stage_reads_what_an_earlier_stage_provides() {
        let descriptor = PipelineDescriptor::standard();
        let matching = descriptor.stage(StageKind::FeatureMatching).unwrap();
        assert_eq!(matching.inputs, vec![StagePath::Relative(DATABASE_FILE)]);

        let refine = descriptor.stage(StageKind::ModelRefinement).unwrap();
        assert_eq!(refine.inputs, vec![StagePath::SparseModel("")]);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(StageKind::FeatureMatching.to_string(), "feature_matching");
        assert_eq!(StageKind::SparseReconstruction.command(), "mapper");
        assert_eq!(StageKind::ModelExport.command(), "model_converter");
        let json = serde_json::to_string(&StageKind::ModelRefinement).unwrap();
        assert_eq!(json, "\"model_refinement\"");
    }
}
