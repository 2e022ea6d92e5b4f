//! `project.rs.xml` rendering and parsing.
//!
//! Output is tab indented, one element per line, with containers and attributes in a fixed
//! order so that rendering a loaded document reproduces the same text.

use std::fs;

use camino::Utf8Path;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, info};

use crate::domain::{DatasetKind, Guid, ProjectType};
use crate::error::RsError;
use crate::fs_util;
use crate::project::{
    InputReference, MetaEntry, OutputArtifact, ProjectDocument, Realization, RealizationInput,
};

pub const SCHEMA_INSTANCE_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const SCHEMA_LOCATION: &str =
    "https://raw.githubusercontent.com/Riverscapes/Program/master/Project/XSD/V1/Project.xsd";

impl ProjectDocument {
    pub fn load(path: &Utf8Path) -> Result<Self, RsError> {
        if !path.exists() {
            return Err(RsError::DocumentNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| fs_util::fs_err(path, err))?;
        let document = from_xml(&content)?;
        info!(
            path = %path,
            realizations = document.realizations().len(),
            "loaded project document"
        );
        Ok(document)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), RsError> {
        persist(&to_xml(self)?, path)
    }
}

/// Writes `text` through a synced temp file renamed over `path`.
pub fn persist(text: &str, path: &Utf8Path) -> Result<(), RsError> {
    fs_util::write_bytes_atomic(path, text.as_bytes())?;
    info!(path = %path, bytes = text.len(), "persisted project document");
    Ok(())
}

pub fn to_xml(document: &ProjectDocument) -> Result<String, RsError> {
    let mut out = XmlOut::new();
    out.event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = Vec::new();
    if document.has_schema_location() {
        root.push(("xmlns:xsi", SCHEMA_INSTANCE_NS.to_string()));
        root.push(("xsi:noNamespaceSchemaLocation", SCHEMA_LOCATION.to_string()));
    }
    if let Some(created) = document.date_created() {
        root.push(("dateCreated", format_time(created)));
    }
    if let Some(modified) = document.date_modified() {
        root.push(("dateModified", format_time(modified)));
    }
    out.start("Project", &root)?;
    out.text_element("Name", &[], document.name())?;
    out.text_element("ProjectType", &[], document.project_type().as_str())?;
    out.entries("MetaData", "Meta", document.metadata())?;
    out.entries("Parameters", "Param", document.parameters())?;

    if document.inputs().is_empty() {
        out.empty("Inputs", &[])?;
    } else {
        out.start("Inputs", &[])?;
        for input in document.inputs() {
            out.input(input)?;
        }
        out.end("Inputs")?;
    }

    if document.realizations().is_empty() {
        out.empty("Realizations", &[])?;
    } else {
        out.start("Realizations", &[])?;
        for realization in document.realizations() {
            out.realization(document.project_type(), realization)?;
        }
        out.end("Realizations")?;
    }
    out.end("Project")?;

    let mut text = String::from_utf8(out.writer.into_inner())
        .map_err(|err| RsError::Malformed(err.to_string()))?;
    text.push('\n');
    debug!(bytes = text.len(), "rendered project document");
    Ok(text)
}

pub fn from_xml(text: &str) -> Result<ProjectDocument, RsError> {
    let root = parse_tree(text)?;
    document_from_node(root)
}

fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RsError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| RsError::Malformed(format!("invalid timestamp: {value}")))
}

fn render_err(err: impl std::fmt::Display) -> RsError {
    RsError::Malformed(format!("failed to render document: {err}"))
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b'\t', 1),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), RsError> {
        self.writer.write_event(event).map_err(render_err)
    }

    fn start(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), RsError> {
        self.event(Event::Start(tag(name, attrs)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), RsError> {
        self.event(Event::Empty(tag(name, attrs)))
    }

    fn end(&mut self, name: &str) -> Result<(), RsError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, String)],
        text: &str,
    ) -> Result<(), RsError> {
        if text.is_empty() {
            return self.empty(name, attrs);
        }
        self.start(name, attrs)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn entries(
        &mut self,
        container: &str,
        element: &str,
        entries: &[MetaEntry],
    ) -> Result<(), RsError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.start(container, &[])?;
        for entry in entries {
            self.text_element(element, &[("name", entry.name.clone())], &entry.value)?;
        }
        self.end(container)
    }

    fn dataset(
        &mut self,
        kind: DatasetKind,
        id: Option<&str>,
        guid: Option<&Guid>,
        name: &str,
        path: &str,
        metadata: &[MetaEntry],
        parameters: &[MetaEntry],
    ) -> Result<(), RsError> {
        let mut attrs = Vec::new();
        if let Some(id) = id {
            attrs.push(("id", id.to_string()));
        }
        if let Some(guid) = guid {
            attrs.push(("guid", guid.to_string()));
        }
        self.start(kind.tag(), &attrs)?;
        self.text_element("Name", &[], name)?;
        self.text_element("Path", &[], path)?;
        self.entries("MetaData", "Meta", metadata)?;
        self.entries("Parameters", "Param", parameters)?;
        self.end(kind.tag())
    }

    fn input(&mut self, input: &InputReference) -> Result<(), RsError> {
        self.dataset(
            input.kind,
            input.id.as_deref(),
            input.guid.as_ref(),
            &input.name,
            &input.path,
            &[],
            &[],
        )
    }

    fn output(&mut self, output: &OutputArtifact) -> Result<(), RsError> {
        self.dataset(
            output.kind,
            output.id.as_deref(),
            output.guid.as_ref(),
            &output.name,
            &output.path,
            &output.metadata,
            &output.parameters,
        )
    }

    fn realization(
        &mut self,
        project_type: &ProjectType,
        realization: &Realization,
    ) -> Result<(), RsError> {
        let mut attrs = Vec::new();
        if let Some(created) = realization.date_created {
            attrs.push(("dateCreated", format_time(created)));
        }
        attrs.push(("guid", realization.guid.to_string()));
        if let Some(version) = &realization.product_version {
            attrs.push(("productVersion", version.clone()));
        }

        let element = project_type.as_str();
        self.start(element, &attrs)?;
        self.text_element("Name", &[], &realization.name)?;
        self.entries("MetaData", "Meta", &realization.metadata)?;
        self.entries("Parameters", "Param", &realization.parameters)?;

        if !realization.inputs.is_empty() {
            self.start("Inputs", &[])?;
            for input in &realization.inputs {
                match input {
                    RealizationInput::Dataset(input) => self.input(input)?,
                    RealizationInput::Ref { kind, ref_id } => {
                        self.empty(kind.tag(), &[("ref", ref_id.clone())])?
                    }
                }
            }
            self.end("Inputs")?;
        }

        if !realization.outputs.is_empty() {
            self.start("Analysis", &[])?;
            self.start("Outputs", &[])?;
            for output in &realization.outputs {
                self.output(output)?;
            }
            self.end("Outputs")?;
            self.end("Analysis")?;
        }
        self.end(element)
    }
}

fn tag<'a>(name: &'a str, attrs: &'a [(&'a str, String)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        start.push_attribute((*key, value.as_str()));
    }
    start
}

#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn leaf_text(&self) -> &str {
        if self.children.is_empty() {
            &self.text
        } else {
            ""
        }
    }

    fn required_child_text(&self, name: &str) -> Result<String, RsError> {
        self.children
            .iter()
            .find(|child| child.name == name)
            .map(|child| child.leaf_text().to_string())
            .ok_or_else(|| RsError::Malformed(format!("<{}> has no <{name}>", self.name)))
    }
}

fn malformed(err: impl std::fmt::Display) -> RsError {
    RsError::Malformed(err.to_string())
}

fn node_from_start(start: &BytesStart<'_>) -> Result<Node, RsError> {
    let mut node = Node {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Node::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn parse_tree(text: &str) -> Result<Node, RsError> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let finished = match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                stack.push(node_from_start(&start)?);
                None
            }
            Event::Empty(start) => Some(node_from_start(&start)?),
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| RsError::Malformed("unbalanced closing tag".to_string()))?;
                Some(node)
            }
            Event::Text(content) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&content.unescape().map_err(malformed)?);
                }
                None
            }
            Event::CData(content) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&content.into_inner()));
                }
                None
            }
            Event::Eof => break,
            _ => None,
        };

        if let Some(node) = finished {
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None if root.is_none() => root = Some(node),
                None => {
                    return Err(RsError::Malformed(
                        "document has more than one root element".to_string(),
                    ));
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err(RsError::Malformed("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| RsError::Malformed("document has no root element".to_string()))
}

fn document_from_node(root: Node) -> Result<ProjectDocument, RsError> {
    if root.name != "Project" {
        return Err(RsError::Malformed(format!(
            "expected <Project> root, found <{}>",
            root.name
        )));
    }
    let name = root.required_child_text("Name")?;
    let project_type = root
        .required_child_text("ProjectType")?
        .parse::<ProjectType>()
        .map_err(malformed)?;

    let mut document = ProjectDocument::empty(project_type.clone(), name);
    document.schema_location = root.attr("xsi:noNamespaceSchemaLocation").is_some();
    document.date_created = root.attr("dateCreated").map(parse_time).transpose()?;
    document.date_modified = root.attr("dateModified").map(parse_time).transpose()?;

    for child in &root.children {
        match child.name.as_str() {
            "Name" | "ProjectType" => {}
            "MetaData" => document.metadata.extend(entries_from(child, "Meta")?),
            "Parameters" => document.parameters.extend(entries_from(child, "Param")?),
            "Inputs" => {
                for input in &child.children {
                    document.inputs.push(input_from(input)?);
                }
            }
            "Realizations" => {
                for realization in &child.children {
                    document
                        .realizations
                        .push(realization_from(&project_type, realization)?);
                }
            }
            other => {
                return Err(RsError::Malformed(format!(
                    "unexpected <{other}> in <Project>"
                )));
            }
        }
    }

    document
        .rebuild_index()
        .map_err(|err| RsError::Malformed(err.to_string()))?;
    Ok(document)
}

fn entries_from(container: &Node, element: &str) -> Result<Vec<MetaEntry>, RsError> {
    container
        .children
        .iter()
        .map(|child| {
            if child.name != element {
                return Err(RsError::Malformed(format!(
                    "unexpected <{}> in <{}>",
                    child.name, container.name
                )));
            }
            let name = child.attr("name").ok_or_else(|| {
                RsError::Malformed(format!("<{element}> without a name attribute"))
            })?;
            Ok(MetaEntry::new(name, child.leaf_text()))
        })
        .collect()
}

fn dataset_kind(node: &Node) -> Result<DatasetKind, RsError> {
    node.name
        .parse()
        .map_err(|_| RsError::Malformed(format!("unknown dataset type <{}>", node.name)))
}

fn optional_guid(node: &Node) -> Result<Option<Guid>, RsError> {
    node.attr("guid")
        .map(|value| value.parse::<Guid>().map_err(malformed))
        .transpose()
}

fn input_from(node: &Node) -> Result<InputReference, RsError> {
    Ok(InputReference {
        kind: dataset_kind(node)?,
        name: node.required_child_text("Name")?,
        path: node.required_child_text("Path")?,
        id: node.attr("id").map(str::to_string),
        guid: optional_guid(node)?,
    })
}

fn output_from(node: &Node) -> Result<OutputArtifact, RsError> {
    let mut output = OutputArtifact::new(
        dataset_kind(node)?,
        node.required_child_text("Name")?,
        node.required_child_text("Path")?,
    );
    output.id = node.attr("id").map(str::to_string);
    output.guid = optional_guid(node)?;
    for child in &node.children {
        match child.name.as_str() {
            "MetaData" => output.metadata.extend(entries_from(child, "Meta")?),
            "Parameters" => output.parameters.extend(entries_from(child, "Param")?),
            _ => {}
        }
    }
    Ok(output)
}

fn realization_from(project_type: &ProjectType, node: &Node) -> Result<Realization, RsError> {
    if node.name != project_type.as_str() {
        return Err(RsError::Malformed(format!(
            "realization <{}> does not match project type {project_type}",
            node.name
        )));
    }
    let guid = node
        .attr("guid")
        .ok_or_else(|| RsError::Malformed("realization without a guid".to_string()))?
        .parse::<Guid>()
        .map_err(malformed)?;

    let mut realization = Realization::new(node.required_child_text("Name")?, guid);
    realization.date_created = node.attr("dateCreated").map(parse_time).transpose()?;
    realization.product_version = node.attr("productVersion").map(str::to_string);

    for child in &node.children {
        match child.name.as_str() {
            "Name" => {}
            "MetaData" => realization.metadata.extend(entries_from(child, "Meta")?),
            "Parameters" => realization
                .parameters
                .extend(entries_from(child, "Param")?),
            "Inputs" => {
                for input in &child.children {
                    let entry = match input.attr("ref") {
                        Some(ref_id) => RealizationInput::Ref {
                            kind: dataset_kind(input)?,
                            ref_id: ref_id.to_string(),
                        },
                        None => RealizationInput::Dataset(input_from(input)?),
                    };
                    realization.inputs.push(entry);
                }
            }
            "Analysis" => {
                for outputs in child.children.iter().filter(|c| c.name == "Outputs") {
                    for output in &outputs.children {
                        realization.outputs.push(output_from(output)?);
                    }
                }
            }
            other => {
                return Err(RsError::Malformed(format!(
                    "unexpected <{other}> in realization {}",
                    realization.guid
                )));
            }
        }
    }
    Ok(realization)
}
