use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_BRANCH: &str = "master";

/// Segment separator in canonical project ids.
pub const ID_SEPARATOR: &str = "::";

/// Deployment target. Decides where content is stored and under which URL it
/// later becomes visible.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Prod,
    Staging,
}

impl Env {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Env::Prod => "prod",
            Env::Staging => "staging",
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request scoped fetch parameters.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct GetParams {
    pub env: Env,
    pub branch: String,
}

impl GetParams {
    pub fn new(env: Env, branch: Option<&str>) -> Self {
        let branch = match branch {
            Some(b) if !b.is_empty() => b.to_string(),
            _ => DEFAULT_BRANCH.to_string(),
        };
        GetParams { env, branch }
    }
}

impl Default for GetParams {
    fn default() -> Self {
        GetParams::new(Env::Prod, None)
    }
}

/// Canonical key naming a project or a nested sub-project.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Takes the id verbatim. Use for ids that already went through
    /// normalization, e.g. ones read back from a queue message.
    pub fn new(id: impl Into<String>) -> Self {
        ProjectId(id.into())
    }

    pub fn normalized(raw: &str) -> Self {
        ProjectId(normalize_id(raw))
    }

    /// Id for `org/repo`, optionally narrowed to a slash delimited path
    /// inside the repository.
    pub fn from_parts(org: &str, repo: &str, path: Option<&str>) -> Self {
        Self::normalized(&raw_id(org, repo, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `org::repo` followed by the `::` joined path segments, before
/// normalization.
pub fn raw_id(org: &str, repo: &str, path: Option<&str>) -> String {
    let mut raw = format!("{org}{ID_SEPARATOR}{repo}");
    if let Some(path) = path {
        for part in path.split('/') {
            raw.push_str(ID_SEPARATOR);
            raw.push_str(part);
        }
    }
    raw
}

/// Canonical form of a hierarchical id: lowercase, with `/` and any run of
/// `:` treated as one separator and blank segments dropped.
///
/// Idempotent, so two spellings of the same project (trailing slash, case,
/// doubled separators) never produce two distinct fan-out jobs.
pub fn normalize_id(raw: &str) -> String {
    raw.to_lowercase()
        .split(['/', ':'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(ID_SEPARATOR)
}
