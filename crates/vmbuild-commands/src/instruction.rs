//! Typed build instruction variants
//!
//! Every variant keeps the instruction text it was parsed from in
//! `original_command`. Records on the wire are the variant's own struct
//! serialized with PascalCase field names, so the record is identified by
//! the directive keyword at the front of `OriginalCommand`.

use crate::directive::Directive;
use crate::types::{User, Workdir};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fetch a resource (local or remote URL) and place it at a target path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Add {
    pub original_command: String,
    pub original_source: String,
    pub source: String,
    pub target: String,
    pub user: User,
    pub workdir: Workdir,
    /// Owner requested through `--chown`
    pub user_from_local_chown: Option<User>,
}

/// Fetch a local resource (or one from an earlier stage) and place it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Copy {
    pub original_command: String,
    pub original_source: String,
    pub source: String,
    pub target: String,
    /// Build stage the source is taken from, empty for the build context
    pub stage: String,
    pub user: User,
    pub workdir: Workdir,
    pub user_from_local_chown: Option<User>,
}

/// Shell used to execute a `RUN` step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Shell {
    pub commands: Vec<String>,
}

impl Default for Shell {
    fn default() -> Self {
        Self {
            commands: vec!["/bin/sh".to_string(), "-c".to_string()],
        }
    }
}

/// Execute a command inside the guest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Run {
    pub original_command: String,
    /// Build arguments visible to the command
    pub args: BTreeMap<String, String>,
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub shell: Shell,
    pub user: User,
    pub workdir: Workdir,
}

/// A decoded build instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BuildInstruction {
    Add(Add),
    Copy(Copy),
    Run(Run),
}

impl BuildInstruction {
    /// Directive this instruction was decoded from
    #[inline]
    #[must_use]
    pub fn directive(&self) -> Directive {
        match self {
            Self::Add(_) => Directive::Add,
            Self::Copy(_) => Directive::Copy,
            Self::Run(_) => Directive::Run,
        }
    }

    /// Original instruction text
    #[must_use]
    pub fn original_command(&self) -> &str {
        match self {
            Self::Add(add) => &add.original_command,
            Self::Copy(copy) => &copy.original_command,
            Self::Run(run) => &run.original_command,
        }
    }

    /// Owning user
    #[must_use]
    pub fn user(&self) -> &User {
        match self {
            Self::Add(add) => &add.user,
            Self::Copy(copy) => &copy.user,
            Self::Run(run) => &run.user,
        }
    }

    /// Working directory
    #[must_use]
    pub fn workdir(&self) -> &Workdir {
        match self {
            Self::Add(add) => &add.workdir,
            Self::Copy(copy) => &copy.workdir,
            Self::Run(run) => &run.workdir,
        }
    }

    /// Source reference to request from the resource service, if any
    #[must_use]
    pub fn resource_source(&self) -> Option<&str> {
        match self {
            Self::Add(add) => Some(&add.source),
            Self::Copy(copy) => Some(&copy.source),
            Self::Run(_) => None,
        }
    }

    /// Target path of resource-bearing instructions
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Add(add) => Some(&add.target),
            Self::Copy(copy) => Some(&copy.target),
            Self::Run(_) => None,
        }
    }

    /// Serialize into a self-describing wire record
    ///
    /// # Errors
    /// Returns error if JSON serialization fails
    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Add> for BuildInstruction {
    fn from(value: Add) -> Self {
        Self::Add(value)
    }
}

impl From<Copy> for BuildInstruction {
    fn from(value: Copy) -> Self {
        Self::Copy(value)
    }
}

impl From<Run> for BuildInstruction {
    fn from(value: Run) -> Self {
        Self::Run(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_has_no_variant_tag() {
        let run = BuildInstruction::from(Run {
            original_command: "RUN echo hi".to_string(),
            command: "echo hi".to_string(),
            ..Run::default()
        });

        let record = run.to_record().unwrap();
        let value: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(value["OriginalCommand"], "RUN echo hi");
        assert_eq!(value["Command"], "echo hi");
        assert!(value.get("Run").is_none());
    }

    #[test]
    fn resource_source_only_for_fetching_variants() {
        let copy = BuildInstruction::from(Copy {
            original_command: "COPY a /b".to_string(),
            source: "a".to_string(),
            target: "/b".to_string(),
            ..Copy::default()
        });
        assert_eq!(copy.resource_source(), Some("a"));
        assert_eq!(copy.target(), Some("/b"));
        assert_eq!(copy.directive(), Directive::Copy);

        let run = BuildInstruction::from(Run::default());
        assert_eq!(run.resource_source(), None);
        assert_eq!(run.user().as_str(), "0:0");
    }
}
