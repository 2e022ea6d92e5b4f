use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResolvedConfig;
use crate::domain::{DatasetKind, OutputKind};
use crate::error::RsError;
use crate::identity::new_guid;
use crate::layout::{ExistingRoot, ProjectLayout, Section};
use crate::project::{InputReference, OutputArtifact, ProjectDocument, Scope};

/// Who ran the tool and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub user: String,
    pub computer: String,
}

impl Operator {
    pub fn current() -> Self {
        let user = env_first(&["USER", "USERNAME", "LOGNAME"]);
        let computer = env_first(&["COMPUTERNAME", "HOSTNAME"]).or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
        });
        Self {
            user: user.unwrap_or_else(|| "unknown".to_string()),
            computer: computer.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "Success"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub root: Utf8PathBuf,
    pub name: String,
    pub region: String,
    pub watershed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResult {
    pub root: String,
    pub document: String,
    pub huc_id: String,
}

/// A dataset handed to or produced by an external tool.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub kind: DatasetKind,
    pub name: String,
    pub source: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub root: Utf8PathBuf,
    pub kind: OutputKind,
    pub name: String,
    pub parameters: Vec<(String, String)>,
    pub inputs: Vec<ArtifactSpec>,
    pub outputs: Vec<ArtifactSpec>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub realization: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub started: String,
    pub stopped: String,
    pub elapsed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub project_type: String,
    pub watershed: Option<String>,
    pub huc_id: Option<String>,
    pub inputs: Vec<DatasetSummary>,
    pub realizations: Vec<RealizationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub kind: String,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealizationSummary {
    pub name: String,
    pub guid: String,
    pub product_version: Option<String>,
    pub status: Option<String>,
    pub parameters: usize,
    pub inputs: usize,
    pub outputs: Vec<DatasetSummary>,
}

pub struct ProjectService {
    config: ResolvedConfig,
    operator: Operator,
}

impl ProjectService {
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config,
            operator: Operator::current(),
        }
    }

    pub fn with_operator(config: ResolvedConfig, operator: Operator) -> Self {
        Self { config, operator }
    }

    /// Creates a new project tree and document. Existing projects are never touched.
    pub fn create_project(&self, request: CreateRequest) -> Result<CreateResult, RsError> {
        let huc_id = self.config.catalog.resolve(&request.watershed)?.clone();
        let layout = ProjectLayout::new(request.root);
        layout.ensure_root(ExistingRoot::Refuse)?;

        let mut document = ProjectDocument::new(self.config.project_type.clone(), request.name);
        let scope = Scope::Document;
        document.add_metadata(&scope, "HUCID", &huc_id)?;
        document.add_metadata(&scope, "Region", &request.region)?;
        document.add_metadata(&scope, "Watershed", request.watershed.trim())?;
        document.add_metadata(&scope, "Operator", &self.operator.user)?;
        document.add_metadata(&scope, "ComputerID", &self.operator.computer)?;

        let path = layout.document_path();
        document.save(&path)?;
        info!(root = %layout.root(), huc = %huc_id, "created riverscapes project");

        Ok(CreateResult {
            root: layout.root().to_string(),
            document: path.to_string(),
            huc_id: huc_id.to_string(),
        })
    }

    /// Copies a run's datasets into the project and records it as a new realization.
    ///
    /// Every source is checked before anything is copied. Inputs land in `Inputs/<ID>/` and
    /// outputs in `Realizations/<Kind>/<GUID>/`, so no earlier run's files are touched. On
    /// failure the folders created by this call are removed and the document is left as it was.
    pub fn record_run(&self, request: RunRequest) -> Result<RunResult, RsError> {
        let layout = ProjectLayout::new(request.root.clone());
        let path = layout.document_path();
        let mut document = ProjectDocument::load(&path)?;
        layout.repair()?;
        for spec in request.inputs.iter().chain(&request.outputs) {
            layout.check_artifact(&spec.source)?;
        }

        let mut staged = Vec::new();
        let result = self.record_into(&layout, &mut document, &request, &mut staged);
        if result.is_err() {
            discard_staged(&staged);
        }
        result
    }

    fn record_into(
        &self,
        layout: &ProjectLayout,
        document: &mut ProjectDocument,
        request: &RunRequest,
        staged: &mut Vec<Utf8PathBuf>,
    ) -> Result<RunResult, RsError> {
        let run = document.add_realization(
            request.name.as_str(),
            new_guid(),
            Utc::now(),
            self.config.product_version.as_str(),
        )?;
        let run_scope = Scope::from(&run);
        document.add_metadata(&run_scope, "Operator", &self.operator.user)?;
        document.add_metadata(&run_scope, "ComputerID", &self.operator.computer)?;
        for (name, value) in &request.parameters {
            document.add_parameter(&run_scope, name.as_str(), value)?;
        }

        let mut inputs = Vec::new();
        for spec in &request.inputs {
            let (id, relative_path) = register_project_input(layout, document, spec, staged)?;
            document.add_input_ref(&run, spec.kind, id, true)?;
            inputs.push(relative_path);
        }

        let mut outputs = Vec::new();
        let section = Section::Realization(request.kind);
        let run_dir = layout.dataset_dir(section, run.guid().as_str());
        for spec in &request.outputs {
            if !run_dir.exists() {
                staged.push(run_dir.clone());
            }
            let copied = layout.copy_artifact(&spec.source, section, run.guid().as_str())?;
            let output =
                OutputArtifact::new(spec.kind, spec.name.as_str(), copied.relative_path.as_str())
                    .with_guid(new_guid());
            document.add_output(&run, output)?;
            outputs.push(copied.relative_path);
        }

        let timing = document.finalize();
        document.add_metadata(&run_scope, "ProcessingStart", timing.started_text())?;
        document.add_metadata(&run_scope, "ProcessingStop", timing.stopped_text())?;
        document.add_metadata(&run_scope, "ProcessingTime", timing.elapsed_text())?;
        document.add_metadata(&run_scope, "Status", request.status)?;
        document.save(&layout.document_path())?;

        info!(
            realization = %run.guid(),
            kind = %request.kind,
            outputs = outputs.len(),
            "recorded realization"
        );
        Ok(RunResult {
            realization: run.guid().to_string(),
            inputs,
            outputs,
            started: timing.started_text(),
            stopped: timing.stopped_text(),
            elapsed: timing.elapsed_text(),
        })
    }

    pub fn info(&self, root: &Utf8Path) -> Result<ProjectSummary, RsError> {
        let layout = ProjectLayout::new(root);
        let document = ProjectDocument::load(&layout.document_path())?;
        Ok(summarize(&document))
    }
}

/// Reuses a project input whose stored copy matches `spec.source` byte for byte, otherwise
/// copies the source into a fresh `Inputs/<ID>/` folder and registers it under that id.
fn register_project_input(
    layout: &ProjectLayout,
    document: &mut ProjectDocument,
    spec: &ArtifactSpec,
    staged: &mut Vec<Utf8PathBuf>,
) -> Result<(String, String), RsError> {
    for input in document.inputs().iter().filter(|input| input.kind == spec.kind) {
        if let Some(id) = &input.id
            && layout.holds_same(&spec.source, &input.path)?
        {
            return Ok((id.clone(), input.path.clone()));
        }
    }

    let prefix = spec.kind.tag().to_uppercase();
    let id = (1..)
        .map(|n| format!("{prefix}{n}"))
        .find(|candidate| {
            !layout.dataset_dir(Section::Inputs, candidate).exists()
                && !document
                    .inputs()
                    .iter()
                    .any(|input| input.id.as_deref() == Some(candidate.as_str()))
        })
        .unwrap_or_else(|| prefix.clone());

    staged.push(layout.dataset_dir(Section::Inputs, &id));
    let copied = layout.copy_artifact(&spec.source, Section::Inputs, &id)?;
    let input = InputReference::new(spec.kind, spec.name.as_str(), copied.relative_path.as_str())
        .with_id(id.as_str())
        .with_guid(new_guid());
    document.add_input(&Scope::Document, input, true)?;
    Ok((id, copied.relative_path))
}

fn discard_staged(dirs: &[Utf8PathBuf]) {
    for dir in dirs.iter().rev() {
        if !dir.exists() {
            continue;
        }
        match fs::remove_dir_all(dir.as_std_path()) {
            Ok(()) => debug!(dir = %dir, "removed partially recorded datasets"),
            Err(err) => warn!(
                dir = %dir,
                error = %err,
                "failed to remove partially recorded datasets"
            ),
        }
    }
}

pub fn summarize(document: &ProjectDocument) -> ProjectSummary {
    ProjectSummary {
        name: document.name().to_string(),
        project_type: document.project_type().to_string(),
        watershed: document.meta("Watershed").map(str::to_string),
        huc_id: document.meta("HUCID").map(str::to_string),
        inputs: document
            .inputs()
            .iter()
            .map(|input| DatasetSummary {
                kind: input.kind.to_string(),
                name: input.name.clone(),
                path: input.path.clone(),
            })
            .collect(),
        realizations: document
            .realizations()
            .iter()
            .map(|realization| RealizationSummary {
                name: realization.name.clone(),
                guid: realization.guid.to_string(),
                product_version: realization.product_version.clone(),
                status: realization.meta("Status").map(str::to_string),
                parameters: realization.parameters.len(),
                inputs: realization.inputs.len(),
                outputs: realization
                    .outputs
                    .iter()
                    .map(|output| DatasetSummary {
                        kind: output.kind.to_string(),
                        name: output.name.clone(),
                        path: output.path.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}
