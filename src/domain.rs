use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RsError;

/// Globally unique identifier, always held in uppercase hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Guid(String);

impl Guid {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Guid {
    type Err = RsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::parse_str(value.trim()).map_err(|_| RsError::InvalidGuid(value.to_string()))?;
        Ok(Self::from_uuid(uuid))
    }
}

/// Eight digit hydrologic unit code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HucCode(String);

impl HucCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HucCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HucCode {
    type Err = RsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = normalized.len() == 8 && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(RsError::InvalidHucCode(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Dataset type tag of an input or output. Serialized as the element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Vector,
    Raster,
    DataTable,
    Csv,
    File,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Vector,
        DatasetKind::Raster,
        DatasetKind::DataTable,
        DatasetKind::Csv,
        DatasetKind::File,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            DatasetKind::Vector => "Vector",
            DatasetKind::Raster => "Raster",
            DatasetKind::DataTable => "DataTable",
            DatasetKind::Csv => "CSV",
            DatasetKind::File => "File",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DatasetKind {
    type Err = RsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        DatasetKind::ALL
            .into_iter()
            .find(|kind| kind.tag().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RsError::InvalidDatasetKind(value.to_string()))
    }
}

/// Realization output folders under `Realizations/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum OutputKind {
    StatisticsSummary,
    Prediction,
}

impl OutputKind {
    pub const ALL: [OutputKind; 2] = [OutputKind::StatisticsSummary, OutputKind::Prediction];

    pub fn dir_name(self) -> &'static str {
        match self {
            OutputKind::StatisticsSummary => "StatisticsSummary",
            OutputKind::Prediction => "Prediction",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for OutputKind {
    type Err = RsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        OutputKind::ALL
            .into_iter()
            .find(|kind| kind.dir_name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RsError::InvalidOutputKind(value.to_string()))
    }
}

/// Riverscapes project type tag, e.g. `EC`. Also used as the realization element name, so it
/// must start with an ASCII letter and hold only ASCII letters, digits, `_`, `-` or `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProjectType(String);

impl ProjectType {
    pub fn conductivity() -> Self {
        Self("EC".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectType {
    fn default() -> Self {
        Self::conductivity()
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectType {
    type Err = RsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let tag = value.trim();
        let mut chars = tag.chars();
        let starts_with_letter = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic());
        let is_valid = starts_with_letter
            && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !is_valid {
            return Err(RsError::InvalidProjectType(value.to_string()));
        }
        Ok(Self(tag.to_string()))
    }
}
