//! In-memory Riverscapes project document.
//!
//! Every mutation here is pure; reading and writing the `project.rs.xml` file lives in
//! [`crate::xml`]. Scopes are addressed through [`Scope`] handles, which are resolved against
//! the document's realization index rather than by node identity.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

use crate::domain::{DatasetKind, Guid, ProjectType};
use crate::error::RsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEntry {
    pub name: String,
    pub value: String,
}

impl MetaEntry {
    pub fn new(name: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

/// A dataset consumed by the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReference {
    pub kind: DatasetKind,
    pub name: String,
    pub path: String,
    pub id: Option<String>,
    pub guid: Option<Guid>,
}

impl InputReference {
    pub fn new(kind: DatasetKind, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            path: path.into(),
            id: None,
            guid: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_guid(mut self, guid: Guid) -> Self {
        self.guid = Some(guid);
        self
    }
}

/// A realization input: either a full dataset description or a pointer to a project input id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealizationInput {
    Dataset(InputReference),
    Ref { kind: DatasetKind, ref_id: String },
}

impl RealizationInput {
    pub fn kind(&self) -> DatasetKind {
        match self {
            RealizationInput::Dataset(input) => input.kind,
            RealizationInput::Ref { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub kind: DatasetKind,
    pub name: String,
    pub path: String,
    pub id: Option<String>,
    pub guid: Option<Guid>,
    pub metadata: Vec<MetaEntry>,
    pub parameters: Vec<MetaEntry>,
}

impl OutputArtifact {
    pub fn new(kind: DatasetKind, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            path: path.into(),
            id: None,
            guid: None,
            metadata: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_guid(mut self, guid: Guid) -> Self {
        self.guid = Some(guid);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realization {
    pub name: String,
    pub guid: Guid,
    pub date_created: Option<DateTime<Utc>>,
    pub product_version: Option<String>,
    pub metadata: Vec<MetaEntry>,
    pub parameters: Vec<MetaEntry>,
    pub inputs: Vec<RealizationInput>,
    pub outputs: Vec<OutputArtifact>,
}

impl Realization {
    pub fn new(name: impl Into<String>, guid: Guid) -> Self {
        Self {
            name: name.into(),
            guid,
            date_created: None,
            product_version: None,
            metadata: Vec::new(),
            parameters: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        find_entry(&self.parameters, name)
    }

    pub fn meta(&self, name: &str) -> Option<&str> {
        find_entry(&self.metadata, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RealizationHandle(Guid);

impl RealizationHandle {
    pub fn guid(&self) -> &Guid {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputHandle {
    realization: Guid,
    index: usize,
}

impl OutputHandle {
    pub fn realization(&self) -> RealizationHandle {
        RealizationHandle(self.realization.clone())
    }
}

/// The entity a metadata, parameter or input container hangs off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Document,
    Realization(RealizationHandle),
    Output(OutputHandle),
}

impl From<&RealizationHandle> for Scope {
    fn from(handle: &RealizationHandle) -> Self {
        Scope::Realization(handle.clone())
    }
}

impl From<&OutputHandle> for Scope {
    fn from(handle: &OutputHandle) -> Self {
        Scope::Output(handle.clone())
    }
}

/// Outcome of registering an input when append mode may reuse an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Reused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTiming {
    pub started: DateTime<Utc>,
    pub stopped: DateTime<Utc>,
    pub elapsed: TimeDelta,
}

impl RunTiming {
    pub fn started_text(&self) -> String {
        self.started.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    pub fn stopped_text(&self) -> String {
        self.stopped.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    /// `H:MM:SS.mmm`
    pub fn elapsed_text(&self) -> String {
        let millis = self.elapsed.num_milliseconds().max(0);
        let secs = millis / 1000;
        format!(
            "{}:{:02}:{:02}.{:03}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            millis % 1000
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Container {
    Metadata,
    Parameters,
}

#[derive(Debug, Clone)]
pub struct ProjectDocument {
    pub(crate) name: String,
    pub(crate) project_type: ProjectType,
    pub(crate) date_created: Option<DateTime<Utc>>,
    pub(crate) date_modified: Option<DateTime<Utc>>,
    pub(crate) schema_location: bool,
    pub(crate) metadata: Vec<MetaEntry>,
    pub(crate) parameters: Vec<MetaEntry>,
    pub(crate) inputs: Vec<InputReference>,
    pub(crate) realizations: Vec<Realization>,
    index: HashMap<Guid, usize>,
    session_started: DateTime<Utc>,
}

impl PartialEq for ProjectDocument {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.project_type == other.project_type
            && self.date_created == other.date_created
            && self.date_modified == other.date_modified
            && self.schema_location == other.schema_location
            && self.metadata == other.metadata
            && self.parameters == other.parameters
            && self.inputs == other.inputs
            && self.realizations == other.realizations
    }
}

impl Eq for ProjectDocument {}

impl ProjectDocument {
    /// Starts an empty document. Timestamps are kept to whole seconds.
    pub fn new(project_type: ProjectType, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            project_type,
            date_created: Some(now.trunc_subsecs(0)),
            date_modified: None,
            schema_location: true,
            metadata: Vec::new(),
            parameters: Vec::new(),
            inputs: Vec::new(),
            realizations: Vec::new(),
            index: HashMap::new(),
            session_started: now,
        }
    }

    /// Shell used by the loader; populated field by field, then indexed.
    pub(crate) fn empty(project_type: ProjectType, name: String) -> Self {
        Self {
            name,
            project_type,
            date_created: None,
            date_modified: None,
            schema_location: false,
            metadata: Vec::new(),
            parameters: Vec::new(),
            inputs: Vec::new(),
            realizations: Vec::new(),
            index: HashMap::new(),
            session_started: Utc::now(),
        }
    }

    pub(crate) fn rebuild_index(&mut self) -> Result<(), RsError> {
        self.index.clear();
        for (position, realization) in self.realizations.iter().enumerate() {
            if self
                .index
                .insert(realization.guid.clone(), position)
                .is_some()
            {
                return Err(RsError::DuplicateGuid(realization.guid.to_string()));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_type(&self) -> &ProjectType {
        &self.project_type
    }

    pub fn date_created(&self) -> Option<DateTime<Utc>> {
        self.date_created
    }

    pub fn date_modified(&self) -> Option<DateTime<Utc>> {
        self.date_modified
    }

    pub fn has_schema_location(&self) -> bool {
        self.schema_location
    }

    pub fn without_schema_location(mut self) -> Self {
        self.schema_location = false;
        self
    }

    pub fn metadata(&self) -> &[MetaEntry] {
        &self.metadata
    }

    pub fn parameters(&self) -> &[MetaEntry] {
        &self.parameters
    }

    pub fn meta(&self, name: &str) -> Option<&str> {
        find_entry(&self.metadata, name)
    }

    pub fn inputs(&self) -> &[InputReference] {
        &self.inputs
    }

    pub fn realizations(&self) -> &[Realization] {
        &self.realizations
    }

    /// Recovers a handle for a realization, e.g. after reloading a saved document.
    pub fn realization(&self, guid: &Guid) -> Option<RealizationHandle> {
        self.index
            .contains_key(guid)
            .then(|| RealizationHandle(guid.clone()))
    }

    pub fn get_realization(&self, handle: &RealizationHandle) -> Result<&Realization, RsError> {
        let position = self.position(&handle.0)?;
        Ok(&self.realizations[position])
    }

    pub fn get_output(&self, handle: &OutputHandle) -> Result<&OutputArtifact, RsError> {
        let position = self.position(&handle.realization)?;
        self.realizations[position]
            .outputs
            .get(handle.index)
            .ok_or_else(|| unknown_output(handle))
    }

    pub fn add_metadata(
        &mut self,
        scope: &Scope,
        name: impl Into<String>,
        value: impl fmt::Display,
    ) -> Result<(), RsError> {
        self.container_mut(scope, Container::Metadata)?
            .push(MetaEntry::new(name, value));
        Ok(())
    }

    pub fn add_parameter(
        &mut self,
        scope: &Scope,
        name: impl Into<String>,
        value: impl fmt::Display,
    ) -> Result<(), RsError> {
        self.container_mut(scope, Container::Parameters)?
            .push(MetaEntry::new(name, value));
        Ok(())
    }

    /// Registers a dataset input. With `append == false` an existing input of the same kind in
    /// the scope is kept and the new one is dropped.
    pub fn add_input(
        &mut self,
        scope: &Scope,
        input: InputReference,
        append: bool,
    ) -> Result<Registration, RsError> {
        match scope {
            Scope::Document => {
                if !append && self.inputs.iter().any(|existing| existing.kind == input.kind) {
                    return Ok(Registration::Reused);
                }
                self.inputs.push(input);
                Ok(Registration::Created)
            }
            Scope::Realization(handle) => {
                let position = self.position(&handle.0)?;
                Ok(push_realization_input(
                    &mut self.realizations[position].inputs,
                    RealizationInput::Dataset(input),
                    append,
                ))
            }
            Scope::Output(_) => Err(RsError::InvalidScope(
                "inputs cannot be attached to an output".to_string(),
            )),
        }
    }

    /// Points a realization input at the project input carrying `ref_id`.
    pub fn add_input_ref(
        &mut self,
        realization: &RealizationHandle,
        kind: DatasetKind,
        ref_id: impl Into<String>,
        append: bool,
    ) -> Result<Registration, RsError> {
        let ref_id = ref_id.into();
        if !self
            .inputs
            .iter()
            .any(|input| input.id.as_deref() == Some(ref_id.as_str()))
        {
            return Err(RsError::UnknownInputRef(ref_id));
        }
        let position = self.position(&realization.0)?;
        Ok(push_realization_input(
            &mut self.realizations[position].inputs,
            RealizationInput::Ref { kind, ref_id },
            append,
        ))
    }

    pub fn add_realization(
        &mut self,
        name: impl Into<String>,
        guid: Guid,
        created: DateTime<Utc>,
        product_version: impl Into<String>,
    ) -> Result<RealizationHandle, RsError> {
        if self.index.contains_key(&guid) {
            return Err(RsError::DuplicateGuid(guid.to_string()));
        }
        let mut realization = Realization::new(name, guid.clone());
        realization.date_created = Some(created.trunc_subsecs(0));
        realization.product_version = Some(product_version.into());
        self.index.insert(guid.clone(), self.realizations.len());
        self.realizations.push(realization);
        Ok(RealizationHandle(guid))
    }

    pub fn add_output(
        &mut self,
        realization: &RealizationHandle,
        output: OutputArtifact,
    ) -> Result<OutputHandle, RsError> {
        let position = self.position(&realization.0)?;
        let outputs = &mut self.realizations[position].outputs;
        outputs.push(output);
        Ok(OutputHandle {
            realization: realization.0.clone(),
            index: outputs.len() - 1,
        })
    }

    /// Stops the run clock. Every call measures from the moment the document was created or
    /// loaded and stamps `dateModified` with the stop time.
    pub fn finalize(&mut self) -> RunTiming {
        let stopped = Utc::now();
        self.date_modified = Some(stopped.trunc_subsecs(0));
        RunTiming {
            started: self.session_started,
            stopped,
            elapsed: stopped - self.session_started,
        }
    }

    fn position(&self, guid: &Guid) -> Result<usize, RsError> {
        self.index
            .get(guid)
            .copied()
            .ok_or_else(|| RsError::InvalidScope(format!("no realization with guid {guid}")))
    }

    fn container_mut(
        &mut self,
        scope: &Scope,
        container: Container,
    ) -> Result<&mut Vec<MetaEntry>, RsError> {
        match scope {
            Scope::Document => Ok(match container {
                Container::Metadata => &mut self.metadata,
                Container::Parameters => &mut self.parameters,
            }),
            Scope::Realization(handle) => {
                let position = self.position(&handle.0)?;
                let realization = &mut self.realizations[position];
                Ok(match container {
                    Container::Metadata => &mut realization.metadata,
                    Container::Parameters => &mut realization.parameters,
                })
            }
            Scope::Output(handle) => {
                let position = self.position(&handle.realization)?;
                let output = self.realizations[position]
                    .outputs
                    .get_mut(handle.index)
                    .ok_or_else(|| unknown_output(handle))?;
                Ok(match container {
                    Container::Metadata => &mut output.metadata,
                    Container::Parameters => &mut output.parameters,
                })
            }
        }
    }
}

fn push_realization_input(
    inputs: &mut Vec<RealizationInput>,
    input: RealizationInput,
    append: bool,
) -> Registration {
    if !append && inputs.iter().any(|existing| existing.kind() == input.kind()) {
        return Registration::Reused;
    }
    inputs.push(input);
    Registration::Created
}

fn find_entry<'a>(entries: &'a [MetaEntry], name: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.value.as_str())
}

fn unknown_output(handle: &OutputHandle) -> RsError {
    RsError::InvalidScope(format!(
        "no output #{} in realization {}",
        handle.index, handle.realization
    ))
}
