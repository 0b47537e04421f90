//! Scripted stand-in for the reconstruction program.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use photoscan::pipeline::{ReconstructionTool, StageError, StageInvocation, ToolOutput};
use photoscan::StageKind;

/// What a stage does when invoked.
#[derive(Debug, Clone)]
pub enum StageScript {
    /// Writes the stage's usual outputs and exits 0.
    Succeed,
    /// Exits non-zero with this stderr.
    Fail { exit_code: i32, stderr: String },
    /// Exits 0 without writing anything.
    SucceedEmpty,
    /// Blocks until cancelled.
    Hang,
}

/// Every stage succeeds unless scripted otherwise. Export stages write the
/// configured point file and text model.
#[derive(Default)]
pub struct FakeTool {
    scripts: HashMap<StageKind, StageScript>,
    point_file: Option<Vec<u8>>,
    text_model: Option<String>,
    calls: Mutex<Vec<StageKind>>,
    terminated: AtomicBool,
}

impl FakeTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, stage: StageKind, script: StageScript) -> Self {
        self.scripts.insert(stage, script);
        self
    }

    pub fn fail_at(self, stage: StageKind) -> Self {
        self.script(
            stage,
            StageScript::Fail {
                exit_code: 1,
                stderr: format!("{} failed: no good matches", stage.command()),
            },
        )
    }

    pub fn with_point_file(mut self, bytes: Vec<u8>) -> Self {
        self.point_file = Some(bytes);
        self
    }

    pub fn with_text_model(mut self, text: String) -> Self {
        self.text_model = Some(text);
        self
    }

    pub fn calls(&self) -> Vec<StageKind> {
        self.calls.lock().unwrap().clone()
    }

    /// True once a hanging stage was cancelled or dropped.
    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn write_outputs(&self, stage: StageKind, invocation: &StageInvocation) {
        let root = &invocation.work_dir;
        let model_dir = invocation
            .model_dir
            .as_ref()
            .map(|m| root.join(m))
            .unwrap_or_else(|| root.join("sparse").join("0"));
        match stage {
            StageKind::FeatureExtraction => write(&root.join("database.db"), b"features"),
            StageKind::FeatureMatching => {}
            StageKind::SparseReconstruction => {
                write(&root.join("sparse").join("0").join("cameras.txt"), b"# cameras")
            }
            StageKind::ModelRefinement => write(&model_dir.join("refined"), b"ok"),
            StageKind::PointExport => {
                if let Some(bytes) = &self.point_file {
                    write(&root.join("output").join("points.ply"), bytes);
                }
            }
            StageKind::ModelExport => {
                if let Some(text) = &self.text_model {
                    write(
                        &root.join("output").join("model").join("points3D.txt"),
                        text.as_bytes(),
                    );
                }
            }
        }
    }
}

/// Marks the flag when the stage future ends, however it ends.
struct OnDrop<'a>(&'a AtomicBool);

impl Drop for OnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn write(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

#[async_trait]
impl ReconstructionTool for FakeTool {
    async fn run_stage(
        &self,
        invocation: &StageInvocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, StageError> {
        let stage = invocation.stage;
        self.calls.lock().unwrap().push(stage);

        match self.scripts.get(&stage).cloned().unwrap_or(StageScript::Succeed) {
            StageScript::Succeed => {
                self.write_outputs(stage, invocation);
                Ok(ToolOutput::ok())
            }
            StageScript::SucceedEmpty => Ok(ToolOutput::ok()),
            StageScript::Fail { exit_code, stderr } => Ok(ToolOutput::failed(exit_code, stderr)),
            StageScript::Hang => {
                let _terminated = OnDrop(&self.terminated);
                cancel.cancelled().await;
                Err(StageError::Cancelled { stage })
            }
        }
    }
}
