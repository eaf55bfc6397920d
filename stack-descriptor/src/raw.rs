//! Serde mirror of the descriptor file, as written by the operator.
//!
//! Nothing here is validated; [`crate::model`] turns these shapes into typed
//! specs. Keys this orchestrator does not understand (`networks`, `labels`,
//! `version`, ...) are ignored.

use crate::model::DependencyCondition;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize, Debug, Default)]
pub struct RawDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, RawService>,
    /// `pgdata:` with no body deserializes as `None`.
    #[serde(default)]
    pub volumes: BTreeMap<String, Option<RawVolume>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RawVolume {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RawService {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub build: Option<RawBuild>,
    #[serde(default)]
    pub command: Option<StringOrList>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub restart: Option<String>,
    #[serde(default)]
    pub environment: Option<MapOrList>,
    #[serde(default)]
    pub ports: Vec<StringOrNumber>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub healthcheck: Option<RawHealthCheck>,
    #[serde(default)]
    pub depends_on: Option<RawDependsOn>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RawBuild {
    Context(String),
    Detailed {
        context: String,
        #[serde(default)]
        dockerfile: Option<String>,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum StringOrList {
    String(String),
    List(Vec<String>),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum StringOrNumber {
    String(String),
    Number(u64),
}

impl StringOrNumber {
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Environment values may be strings, numbers, booleans, or empty.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum MapOrList {
    Map(BTreeMap<String, Option<Scalar>>),
    List(Vec<String>),
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RawHealthCheck {
    #[serde(default)]
    pub test: Option<StringOrList>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub retries: Option<StringOrNumber>,
    #[serde(default)]
    pub disable: Option<bool>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RawDependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, RawDependency>),
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RawDependency {
    #[serde(default)]
    pub condition: Option<DependencyCondition>,
}
