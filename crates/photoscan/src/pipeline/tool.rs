//! The external reconstruction program.
//!
//! [`ReconstructionTool`] is the seam between the driver and the process that
//! does the photogrammetry. [`ColmapTool`] launches COLMAP either directly or
//! inside a throwaway docker container with the working directory mounted at
//! `/work`.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::StageError;
use super::stage::{
    StageKind, DATABASE_FILE, IMAGES_DIR, POINTS_FILE, SPARSE_DIR, TEXT_MODEL_DIR,
};
use crate::config::{Config, PipelineSettings};

const CONTAINER_WORK_DIR: &str = "/work";

/// Everything a tool needs to run one stage.
#[derive(Debug, Clone)]
pub struct StageInvocation {
    pub stage: StageKind,
    /// Absolute working directory of the job.
    pub work_dir: PathBuf,
    /// Model directory relative to `work_dir` (e.g. `sparse/0`), once known.
    pub model_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok() -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
pub trait ReconstructionTool: Send + Sync {
    /// Runs one stage to completion. A non-zero exit is reported through
    /// [`ToolOutput::success`], not as an error. When `cancel` fires the
    /// in-flight process must be terminated before returning
    /// [`StageError::Cancelled`].
    async fn run_stage(
        &self,
        invocation: &StageInvocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, StageError>;
}

pub struct ColmapTool {
    program: String,
    docker_image: Option<String>,
    settings: PipelineSettings,
}

impl ColmapTool {
    pub fn new(
        program: impl Into<String>,
        docker_image: Option<String>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            program: program.into(),
            docker_image,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tool.program.clone(),
            config.tool.docker_image.clone(),
            config.pipeline.clone(),
        )
    }

    /// Arguments after the program name for one stage. Paths are rooted at
    /// `root`, which is `/work` inside a container and the working directory
    /// otherwise.
    pub fn stage_args(
        &self,
        invocation: &StageInvocation,
        root: &str,
    ) -> Result<Vec<String>, StageError> {
        let at = |relative: &str| format!("{}/{}", root.trim_end_matches('/'), relative);
        let model = || {
            invocation
                .model_dir
                .as_deref()
                .map(|m| at(&slash_path(m)))
                .ok_or_else(|| StageError::MissingInput {
                    stage: invocation.stage,
                    path: invocation.work_dir.join(SPARSE_DIR),
                })
        };
        let s = &self.settings;
        let stage = invocation.stage;

        let mut args = vec![stage.command().to_string()];
        let mut push = |pairs: &[(&str, String)]| {
            for (flag, value) in pairs {
                args.push(format!("--{}", flag));
                args.push(value.clone());
            }
        };

        match stage {
            StageKind::FeatureExtraction => push(&[
                ("database_path", at(DATABASE_FILE)),
                ("image_path", at(IMAGES_DIR)),
                ("ImageReader.single_camera", flag(s.single_camera)),
                ("SiftExtraction.max_image_size", s.max_image_size.to_string()),
                ("SiftExtraction.max_num_features", s.max_num_features.to_string()),
            ]),
            StageKind::FeatureMatching => push(&[
                ("database_path", at(DATABASE_FILE)),
                ("ExhaustiveMatching.block_size", s.matching_block_size.to_string()),
            ]),
            StageKind::SparseReconstruction => push(&[
                ("database_path", at(DATABASE_FILE)),
                ("image_path", at(IMAGES_DIR)),
                ("output_path", at(SPARSE_DIR)),
                ("Mapper.ba_refine_focal_length", flag(false)),
                ("Mapper.ba_refine_principal_point", flag(false)),
                ("Mapper.ba_refine_extra_params", flag(false)),
            ]),
            StageKind::ModelRefinement => {
                let model = model()?;
                push(&[
                    ("input_path", model.clone()),
                    ("output_path", model),
                    ("BundleAdjustment.refine_focal_length", flag(false)),
                ])
            }
            StageKind::PointExport => push(&[
                ("input_path", model()?),
                ("output_path", at(POINTS_FILE)),
                ("output_type", "PLY".to_string()),
            ]),
            StageKind::ModelExport => push(&[
                ("input_path", model()?),
                ("output_path", at(TEXT_MODEL_DIR)),
                ("output_type", "TXT".to_string()),
            ]),
        }

        Ok(args)
    }

    fn build_command(
        &self,
        invocation: &StageInvocation,
    ) -> Result<(Command, Option<String>), StageError> {
        match &self.docker_image {
            Some(image) => {
                let name = format!(
                    "photoscan-{}-{}",
                    invocation.stage.name().replace('_', "-"),
                    uuid::Uuid::new_v4().simple()
                );
                let mut command = Command::new("docker");
                command
                    .arg("run")
                    .arg("--rm")
                    .arg("--name")
                    .arg(&name)
                    .arg("-v")
                    .arg(format!("{}:{}", invocation.work_dir.display(), CONTAINER_WORK_DIR))
                    .arg(image)
                    .arg(&self.program)
                    .args(self.stage_args(invocation, CONTAINER_WORK_DIR)?);
                Ok((command, Some(name)))
            }
            None => {
                let root = invocation.work_dir.to_string_lossy().into_owned();
                let mut command = Command::new(&self.program);
                command
                    .args(self.stage_args(invocation, &root)?)
                    .current_dir(&invocation.work_dir);
                Ok((command, None))
            }
        }
    }
}

#[async_trait]
impl ReconstructionTool for ColmapTool {
    async fn run_stage(
        &self,
        invocation: &StageInvocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, StageError> {
        let stage = invocation.stage;
        let (mut command, container) = self.build_command(invocation)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(stage = %stage, docker = container.is_some(), "Launching reconstruction tool");
        let mut child = command
            .spawn()
            .map_err(|e| StageError::Spawn { stage, source: e })?;
        // Dropped on timeout or cancellation, which kills the container too.
        let mut guard = container.map(ContainerGuard::new);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, stdout, stderr) = tokio::select! {
            collected = async { tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr)) } => collected,
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(stage = %stage, "Failed to kill reconstruction tool: {}", e);
                }
                drop(guard);
                return Err(StageError::Cancelled { stage });
            }
        };

        let status = status.map_err(|e| StageError::Spawn { stage, source: e })?;
        if let Some(g) = guard.as_mut() {
            g.disarm();
        }

        Ok(ToolOutput {
            exit_code: status.code(),
            success: status.success(),
            stdout,
            stderr,
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Failed to read tool output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn flag(value: bool) -> String {
    let value = if value { "1" } else { "0" };
    value.to_string()
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Kills a named container when dropped while still armed.
///
/// Killing the `docker run` client does not stop the container itself.
struct ContainerGuard {
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(name: String) -> Self {
        Self { name, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let name = std::mem::take(&mut self.name);
        debug!(container = %name, "Killing reconstruction container");
        let spawned = std::thread::Builder::new()
            .name("docker-kill".to_string())
            .spawn(move || {
                let result = std::process::Command::new("docker")
                    .args(["kill", &name])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                if let Err(e) = result {
                    warn!(container = %name, "docker kill failed: {}", e);
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn docker kill thread: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(stage: StageKind, model_dir: Option<&str>) -> StageInvocation {
        StageInvocation {
            stage,
            work_dir: PathBuf::from("/scans/job-1"),
            model_dir: model_dir.map(PathBuf::from),
        }
    }

    fn tool() -> ColmapTool {
        ColmapTool::new("colmap", None, PipelineSettings::default())
    }

    #[test]
    fn test_feature_extraction_args() {
        let args = tool()
            .stage_args(&invocation(StageKind::FeatureExtraction, None), "/work")
            .unwrap();
        assert_eq!(
            args,
            vec![
                "feature_extractor",
                "--database_path",
                "/work/database.db",
                "--image_path",
                "/work/images",
                "--ImageReader.single_camera",
                "1",
                "--SiftExtraction.max_image_size",
                "3200",
                "--SiftExtraction.max_num_features",
                "8192",
            ]
        );
    }

    #[test]
    fn test_matching_uses_configured_block_size() {
        let settings = PipelineSettings {
            matching_block_size: 25,
            ..PipelineSettings::default()
        };
        let tool = ColmapTool::new("colmap", None, settings);
        let args = tool
            .stage_args(&invocation(StageKind::FeatureMatching, None), "/work")
            .unwrap();
        assert_eq!(args[0], "exhaustive_matcher");
        assert_eq!(args.last().map(String::as_str), Some("25"));
    }

    #[test]
    fn test_mapper_freezes_intrinsics() {
        let args = tool()
            .stage_args(&invocation(StageKind::SparseReconstruction, None), "/scans/job-1")
            .unwrap();
        assert_eq!(args[0], "mapper");
        assert!(args.windows(2).any(|w| w == ["--output_path", "/scans/job-1/sparse"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--Mapper.ba_refine_focal_length", "0"]));
    }

    #[test]
    fn test_model_stages_need_model_dir() {
        let err = tool()
            .stage_args(&invocation(StageKind::ModelRefinement, None), "/work")
            .unwrap_err();
        assert!(matches!(err, StageError::MissingInput { stage: StageKind::ModelRefinement, .. }));

        let args = tool()
            .stage_args(&invocation(StageKind::ModelRefinement, Some("sparse/0")), "/work")
            .unwrap();
        assert_eq!(
            args,
            vec![
                "bundle_adjuster",
                "--input_path",
                "/work/sparse/0",
                "--output_path",
                "/work/sparse/0",
                "--BundleAdjustment.refine_focal_length",
                "0",
            ]
        );
    }

    #[test]
    fn test_export_args() {
        let points = tool()
            .stage_args(&invocation(StageKind::PointExport, Some("sparse/0")), "/work")
            .unwrap();
        assert!(points.windows(2).any(|w| w == ["--output_path", "/work/output/points.ply"]));
        assert!(points.windows(2).any(|w| w == ["--output_type", "PLY"]));

        let text = tool()
            .stage_args(&invocation(StageKind::ModelExport, Some("sparse/0")), "/work")
            .unwrap();
        assert!(text.windows(2).any(|w| w == ["--output_path", "/work/output/model"]));
        assert!(text.windows(2).any(|w| w == ["--output_type", "TXT"]));
    }

    #[test]
    fn test_docker_command_mounts_work_dir() {
        let tool = ColmapTool::new(
            "colmap",
            Some("colmap/colmap:latest".to_string()),
            PipelineSettings::default(),
        );
        let (command, container) = tool
            .build_command(&invocation(StageKind::FeatureMatching, None))
            .unwrap();
        let cmd = command.as_std();
        assert_eq!(cmd.get_program(), "docker");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let name = container.unwrap();
        assert!(name.starts_with("photoscan-feature-matching-"));
        assert_eq!(&args[..4], ["run", "--rm", "--name", name.as_str()]);
        assert!(args.windows(2).any(|w| w == ["-v", "/scans/job-1:/work"]));
        assert!(args.windows(2).any(|w| w == ["colmap/colmap:latest", "colmap"]));
        assert!(args.contains(&"/work/database.db".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = ColmapTool::new(
            "photoscan-definitely-missing-binary",
            None,
            PipelineSettings::default(),
        );
        let inv = StageInvocation {
            stage: StageKind::FeatureExtraction,
            work_dir: tmp.path().to_path_buf(),
            model_dir: None,
        };
        let err = tool
            .run_stage(&inv, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Spawn { .. }));
    }
}
