// SPDX-License-Identifier: MPL-2.0

//! Reading, writing and validating project manifests.
//!
//! A manifest is a TOML file named [MANIFEST_NAME] at the root of a project:
//!
//! ```toml
//! ignored = ["github.com/foo/bar"]
//!
//! [[dependencies]]
//!   name = "github.com/babble/brook"
//!   revision = "d05d5aca9f895d19e9265839bffeadd74a2d2ecb"
//!
//! [[overrides]]
//!   branch = "master"
//!   name = "github.com/golang/dep/internal/gps"
//! ```

use std::fmt::Write as _;

use serde::Deserialize;
use thiserror::Error;

use crate::constraint::Constraint;
use crate::project::{IgnoredRuleset, ProjectProperties, ProjectRoot};
use crate::type_aliases::ProjectConstraints;

/// File name of a manifest.
pub const MANIFEST_NAME: &str = "deps.toml";

/// Constraints a project declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Direct dependencies.
    pub dependencies: ProjectConstraints,
    /// Forced constraints that replace any constraint found in the graph.
    /// Only honoured on the root project.
    pub overrides: ProjectConstraints,
    /// Import paths to leave out of the solve, see [IgnoredRuleset].
    pub ignored: Vec<String>,
}

/// Errors reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Not valid TOML, or not the expected shape.
    #[error("unable to parse manifest: {0}")]
    Toml(#[from] toml::de::Error),
    /// A project sets more than one of `branch`, `revision` and `version`.
    #[error("multiple constraints specified for {name}, can only specify one")]
    MultipleConstraints {
        /// The project.
        name: String,
    },
    /// A project appears twice in the same section.
    #[error("multiple {section} specified for {name}, can only specify one")]
    DuplicateProject {
        /// `dependencies` or `overrides`.
        section: &'static str,
        /// The project.
        name: String,
    },
}

/// Problems found by [validate_manifest] that do not prevent reading it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestWarning {
    /// Top level key with no meaning.
    #[error("Unknown field in manifest: {0}")]
    UnknownField(String),
    /// Top level `metadata` is not a table.
    #[error("metadata should be a TOML table")]
    MetadataNotTable,
    /// `dependencies` or `overrides` is not an array of tables.
    #[error("{0} should be a TOML array of tables")]
    NotArrayOfTables(String),
    /// Unknown key in a project entry.
    #[error("Invalid key \"{key}\" in \"{section}\"")]
    InvalidKey {
        /// The key.
        key: String,
        /// The section of the entry.
        section: String,
    },
    /// `metadata` of a project entry is not a table.
    #[error("metadata in \"{0}\" should be a TOML table")]
    ProjectMetadataNotTable(String),
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    dependencies: Vec<RawProject>,
    #[serde(default)]
    overrides: Vec<RawProject>,
    #[serde(default)]
    ignored: Vec<String>,
}

#[derive(Deserialize)]
struct RawProject {
    name: String,
    branch: Option<String>,
    revision: Option<String>,
    version: Option<String>,
    source: Option<String>,
}

impl RawProject {
    fn into_properties(self) -> Result<(ProjectRoot, ProjectProperties), ManifestError> {
        let set = [&self.branch, &self.revision, &self.version]
            .iter()
            .filter(|field| field.is_some())
            .count();
        if set > 1 {
            return Err(ManifestError::MultipleConstraints { name: self.name });
        }
        let constraint = match (self.branch, self.revision, self.version) {
            (Some(branch), _, _) => Constraint::Branch(branch),
            (_, Some(revision), _) => Constraint::Revision(revision.into()),
            (_, _, Some(version)) => Constraint::from_version_str(&version),
            _ => Constraint::Any,
        };
        let props = ProjectProperties {
            source: self.source.filter(|s| !s.is_empty()),
            constraint,
        };
        Ok((ProjectRoot::new(self.name), props))
    }
}

fn collect(
    section: &'static str,
    raw: Vec<RawProject>,
) -> Result<ProjectConstraints, ManifestError> {
    let mut out = ProjectConstraints::new();
    for project in raw {
        let (root, props) = project.into_properties()?;
        if out.contains_key(&root) {
            return Err(ManifestError::DuplicateProject {
                section,
                name: root.to_string(),
            });
        }
        out.insert(root, props);
    }
    Ok(out)
}

impl Manifest {
    /// Parse a manifest.
    pub fn from_toml_str(s: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(s)?;
        Ok(Self {
            dependencies: collect("dependencies", raw.dependencies)?,
            overrides: collect("overrides", raw.overrides)?,
            ignored: raw.ignored,
        })
    }

    /// Serialize to TOML. Projects are sorted by name and keys alphabetically.
    pub fn to_toml_string(&self) -> String {
        let mut out = String::new();
        if !self.ignored.is_empty() {
            let list: Vec<String> = self.ignored.iter().map(|s| quote(s)).collect();
            let _ = writeln!(out, "ignored = [{}]", list.join(", "));
        }
        for (section, projects) in [
            ("dependencies", &self.dependencies),
            ("overrides", &self.overrides),
        ] {
            for (root, props) in projects {
                if !out.is_empty() {
                    out.push('\n');
                }
                let _ = writeln!(out, "[[{}]]", section);
                write_project(&mut out, root, props);
            }
        }
        out
    }

    /// The `ignored` list as a ruleset.
    pub fn ignored_ruleset(&self) -> IgnoredRuleset {
        IgnoredRuleset::new(&self.ignored)
    }
}

fn quote(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn write_project(out: &mut String, root: &ProjectRoot, props: &ProjectProperties) {
    let mut keys: Vec<(&str, String)> = vec![("name", root.to_string())];
    match &props.constraint {
        Constraint::Branch(branch) => keys.push(("branch", branch.clone())),
        Constraint::Revision(rev) => keys.push(("revision", rev.to_string())),
        Constraint::Any | Constraint::None => {}
        c => keys.push(("version", c.to_string())),
    }
    if let Some(source) = &props.source {
        keys.push(("source", source.clone()));
    }
    keys.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in keys {
        let _ = writeln!(out, "  {} = {}", key, quote(&value));
    }
}

const PROJECT_KEYS: [&str; 6] = ["name", "branch", "revision", "version", "source", "metadata"];

/// Check a manifest for keys and shapes that [Manifest::from_toml_str] would silently ignore.
///
/// Returns an error only when the input is not TOML at all.
pub fn validate_manifest(s: &str) -> Result<Vec<ManifestWarning>, ManifestError> {
    let table: toml::Table = s.parse()?;
    let mut warnings = Vec::new();
    for (key, value) in &table {
        match key.as_str() {
            "metadata" => {
                if !value.is_table() {
                    warnings.push(ManifestWarning::MetadataNotTable);
                }
            }
            "dependencies" | "overrides" => validate_section(key, value, &mut warnings),
            "ignored" => {}
            _ => warnings.push(ManifestWarning::UnknownField(key.clone())),
        }
    }
    Ok(warnings)
}

fn validate_section(section: &str, value: &toml::Value, warnings: &mut Vec<ManifestWarning>) {
    let Some(entries) = value.as_array() else {
        warnings.push(ManifestWarning::NotArrayOfTables(section.to_string()));
        return;
    };
    for entry in entries {
        let Some(entry) = entry.as_table() else {
            warnings.push(ManifestWarning::NotArrayOfTables(section.to_string()));
            return;
        };
        for (key, value) in entry {
            if !PROJECT_KEYS.contains(&key.as_str()) {
                warnings.push(ManifestWarning::InvalidKey {
                    key: key.clone(),
                    section: section.to_string(),
                });
            } else if key == "metadata" && !value.is_table() {
                warnings.push(ManifestWarning::ProjectMetadataNotTable(section.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tag_version() {
        let m = Manifest::from_toml_str(
            r#"
            [[dependencies]]
              name = "github.com/a/b"
              version = "nightly"
            "#,
        )
        .unwrap();
        assert_eq!(
            m.dependencies[&ProjectRoot::new("github.com/a/b")].constraint,
            Constraint::Tag("nightly".into())
        );
    }

    #[test]
    fn duplicate_override() {
        let err = Manifest::from_toml_str(
            r#"
            [[overrides]]
              name = "github.com/a/b"
            [[overrides]]
              name = "github.com/a/b"
              branch = "dev"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("multiple overrides"));
    }

    #[test]
    fn empty_manifest() {
        let m = Manifest::from_toml_str("").unwrap();
        assert_eq!(m, Manifest::default());
        assert_eq!(m.to_toml_string(), "");
    }
}
