use thiserror::Error;
use tracing::debug;

use crate::document::{BuildSection, Document, DocumentError};
use crate::validation::SchemaValidationError;

/// Default Python version for projects that never pinned one. Images older
/// than 4.0 shipped Python 3.5 but are no longer in use.
pub const DEFAULT_PYTHON: &str = "3.7";
/// Toolchain entry for Conda-managed projects.
pub const CONDA_PYTHON: &str = "miniconda3-4.7";
/// Toolchain entry for the faster Conda resolver.
pub const MAMBA_PYTHON: &str = "mambaforge-4.10";
/// Only build OS currently offered.
pub const BUILD_OS: &str = "ubuntu-20.04";

/// Failure of a single migration step.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{migrator}: config uses v1, migrate to v2 first")]
    RequiresV2 { migrator: &'static str },

    #[error("{migrator}: {reason}")]
    Precondition {
        migrator: &'static str,
        reason: String,
    },

    /// The migrator itself produced a schema-invalid document. This is a
    /// defect in the migrator, not in the input.
    #[error("{migrator} produced an invalid document: {source}")]
    Internal {
        migrator: String,
        #[source]
        source: SchemaValidationError,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// A single named transformation over a configuration document.
///
/// Contract: `migrate` never mutates its input; it returns a new document
/// together with an applied flag. A migrator that finds its target already
/// in the desired state returns `(input, false)` — which also makes every
/// migrator idempotent. A violated precondition is a hard error, never a
/// partial transformation. The pipeline re-validates the output of every
/// applied step, so a migrator must only ever produce schema-valid
/// documents.
pub trait Migrator: Send + Sync {
    /// Stable registry name.
    fn name(&self) -> &'static str;

    /// One-line summary used in pull request text.
    fn title(&self) -> &'static str;

    /// Longer explanation used in pull request text.
    fn description(&self) -> &'static str;

    fn migrate(&self, document: &Document) -> Result<(Document, bool), MigrationError>;
}

/// Migrates `python.version` (or the implicit default) to the explicit
/// `build.tools` configuration.
///
/// See <https://docs.readthedocs.io/en/latest/config-file/v2.html#build>.
pub struct UseBuildTools;

impl Migrator for UseBuildTools {
    fn name(&self) -> &'static str {
        "use_build_tools"
    }

    fn title(&self) -> &'static str {
        "Use explicit build.tools configuration"
    }

    fn description(&self) -> &'static str {
        "Declares the Python toolchain under `build.tools` instead of the \
         deprecated `python.version`, and pins the build OS to ubuntu-20.04."
    }

    fn migrate(&self, document: &Document) -> Result<(Document, bool), MigrationError> {
        if document.version() < 2 {
            return Err(MigrationError::RequiresV2 {
                migrator: self.name(),
            });
        }

        // Only a populated build.tools marks the config as migrated; a bare
        // build.os still needs its toolchain filled in.
        let build = document.build()?;
        if let Some(BuildSection::Toolchain { tools, .. }) = &build {
            if !tools.is_empty() {
                debug!("config already contains build.tools, nothing to do");
                return Ok((document.clone(), false));
            }
        }

        // Conda projects get the pinned miniconda toolchain regardless of
        // any python.version; everyone else keeps their pin or the default.
        let python = if document.has_conda() {
            CONDA_PYTHON.to_string()
        } else {
            document
                .python_version()
                .unwrap_or_else(|| DEFAULT_PYTHON.to_string())
        };

        let apt_packages = build
            .map(|b| b.apt_packages().to_vec())
            .unwrap_or_default();

        let new_document = document
            .with_build(BuildSection::Toolchain {
                os: Some(BUILD_OS.to_string()),
                tools: [("python".to_string(), python)].into(),
                apt_packages,
            })
            .without_python_version();

        Ok((new_document, true))
    }
}

/// Switches a Conda project from the miniconda toolchain to mambaforge,
/// which resolves environments much faster.
///
/// Requires `use_build_tools` to have run first.
pub struct UseMamba;

impl Migrator for UseMamba {
    fn name(&self) -> &'static str {
        "use_mamba"
    }

    fn title(&self) -> &'static str {
        "Use mambaforge for Conda environments"
    }

    fn description(&self) -> &'static str {
        "Replaces the miniconda toolchain with mambaforge, a drop-in \
         replacement that resolves Conda environments much faster."
    }

    fn migrate(&self, document: &Document) -> Result<(Document, bool), MigrationError> {
        if document.version() < 2 {
            return Err(MigrationError::RequiresV2 {
                migrator: self.name(),
            });
        }
        if !document.has_conda() {
            return Err(MigrationError::Precondition {
                migrator: self.name(),
                reason: "not a Conda project".to_string(),
            });
        }

        let Some(BuildSection::Toolchain {
            os,
            mut tools,
            apt_packages,
        }) = document.build()?
        else {
            return Err(MigrationError::Precondition {
                migrator: self.name(),
                reason: "config does not use build.tools, run use_build_tools first".to_string(),
            });
        };

        match tools.get("python").map(String::as_str) {
            Some(MAMBA_PYTHON) => {
                debug!("config already uses mambaforge, nothing to do");
                Ok((document.clone(), false))
            }
            Some(python) if python.starts_with("miniconda") => {
                tools.insert("python".to_string(), MAMBA_PYTHON.to_string());
                let new_document = document.with_build(BuildSection::Toolchain {
                    os,
                    tools,
                    apt_packages,
                });
                Ok((new_document, true))
            }
            _ => Err(MigrationError::Precondition {
                migrator: self.name(),
                reason: "build.tools.python does not use the miniconda toolchain, \
                         run use_build_tools first"
                    .to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::parse(text).unwrap()
    }

    #[test]
    fn test_use_build_tools_fills_default_python() {
        let (new, applied) = UseBuildTools.migrate(&doc("version: 2\n")).unwrap();
        assert!(applied);
        assert_eq!(
            new,
            doc("version: 2\nbuild:\n  os: ubuntu-20.04\n  tools:\n    python: '3.7'\n")
        );
    }

    #[test]
    fn test_use_build_tools_moves_python_version() {
        let (new, applied) = UseBuildTools
            .migrate(&doc("version: 2\npython:\n  version: '3.8'\n"))
            .unwrap();
        assert!(applied);
        assert_eq!(
            new,
            doc("version: 2\nbuild:\n  os: ubuntu-20.04\n  tools:\n    python: '3.8'\n")
        );
    }

    #[test]
    fn test_use_build_tools_keeps_other_python_keys() {
        let (new, applied) = UseBuildTools
            .migrate(&doc(
                "version: 2\npython:\n  version: '3.8'\n  install:\n  - requirements: requirements.txt\n",
            ))
            .unwrap();
        assert!(applied);
        assert_eq!(
            new,
            doc("version: 2\n\
                 build:\n  os: ubuntu-20.04\n  tools:\n    python: '3.8'\n\
                 python:\n  install:\n  - requirements: requirements.txt\n")
        );
    }

    #[test]
    fn test_use_build_tools_stringifies_numeric_python_version() {
        let (new, _) = UseBuildTools
            .migrate(&doc("version: 2\npython:\n  version: 3.8\n"))
            .unwrap();
        match new.build().unwrap() {
            Some(BuildSection::Toolchain { tools, .. }) => {
                assert_eq!(tools.get("python").map(String::as_str), Some("3.8"));
            }
            other => panic!("unexpected build shape: {other:?}"),
        }
    }

    #[test]
    fn test_use_build_tools_conda_overrides_python_version() {
        for input in [
            "version: 2\nconda:\n  environment: environment.yml\n",
            "version: 2\nconda:\n  environment: environment.yml\npython:\n  version: '3.9'\n",
        ] {
            let (new, applied) = UseBuildTools.migrate(&doc(input)).unwrap();
            assert!(applied);
            assert_eq!(
                new,
                doc("version: 2\n\
                     build:\n  os: ubuntu-20.04\n  tools:\n    python: miniconda3-4.7\n\
                     conda:\n  environment: environment.yml\n")
            );
        }
    }

    #[test]
    fn test_use_build_tools_preserves_apt_packages() {
        let (new, _) = UseBuildTools
            .migrate(&doc(
                "version: 2\nbuild:\n  image: stable\n  apt_packages:\n  - graphviz\n",
            ))
            .unwrap();
        match new.build().unwrap() {
            Some(BuildSection::Toolchain { apt_packages, .. }) => {
                assert_eq!(apt_packages, vec!["graphviz".to_string()]);
            }
            other => panic!("unexpected build shape: {other:?}"),
        }
    }

    #[test]
    fn test_use_build_tools_fills_toolchain_when_only_os_is_set() {
        // Schema-invalid shape, but advisory validation lets it through.
        let (new, applied) = UseBuildTools
            .migrate(&doc("version: 2\nbuild:\n  os: ubuntu-20.04\n"))
            .unwrap();
        assert!(applied);
        assert_eq!(
            new,
            doc("version: 2\nbuild:\n  os: ubuntu-20.04\n  tools:\n    python: '3.7'\n")
        );
    }

    #[test]
    fn test_use_build_tools_is_a_no_op_when_tools_present() {
        let input = doc("version: 2\nbuild:\n  os: ubuntu-20.04\n  tools:\n    python: '3.9'\n");
        let (new, applied) = UseBuildTools.migrate(&input).unwrap();
        assert!(!applied);
        assert_eq!(new, input);
    }

    #[test]
    fn test_use_build_tools_rejects_v1() {
        assert!(matches!(
            UseBuildTools.migrate(&doc("python:\n  version: '3.6'\n")),
            Err(MigrationError::RequiresV2 { .. })
        ));
    }

    #[test]
    fn test_use_build_tools_is_idempotent() {
        let (once, applied) = UseBuildTools
            .migrate(&doc("version: 2\npython:\n  version: '3.8'\n"))
            .unwrap();
        assert!(applied);
        let (twice, applied) = UseBuildTools.migrate(&once).unwrap();
        assert!(!applied);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_use_mamba_switches_miniconda_to_mambaforge() {
        let (new, applied) = UseMamba
            .migrate(&doc(
                "version: 2\n\
                 build:\n  os: ubuntu-20.04\n  tools:\n    python: miniconda3-4.7\n\
                 conda:\n  environment: environment.yml\n",
            ))
            .unwrap();
        assert!(applied);
        assert_eq!(
            new,
            doc("version: 2\n\
                 build:\n  os: ubuntu-20.04\n  tools:\n    python: mambaforge-4.10\n\
                 conda:\n  environment: environment.yml\n")
        );
    }

    #[test]
    fn test_use_mamba_is_a_no_op_when_already_mambaforge() {
        let input = doc(
            "version: 2\n\
             build:\n  os: ubuntu-20.04\n  tools:\n    python: mambaforge-4.10\n\
             conda:\n  environment: environment.yml\n",
        );
        let (new, applied) = UseMamba.migrate(&input).unwrap();
        assert!(!applied);
        assert_eq!(new, input);
    }

    #[test]
    fn test_use_mamba_rejects_non_conda_projects() {
        assert!(matches!(
            UseMamba.migrate(&doc(
                "version: 2\nbuild:\n  os: ubuntu-20.04\n  tools:\n    python: '3.9'\n"
            )),
            Err(MigrationError::Precondition { .. })
        ));
    }

    #[test]
    fn test_use_mamba_requires_build_tools_first() {
        // Conda project still on the pre-tools shape.
        assert!(matches!(
            UseMamba.migrate(&doc("version: 2\nconda:\n  environment: environment.yml\n")),
            Err(MigrationError::Precondition { .. })
        ));
        // And a toolchain that never went through the miniconda step.
        assert!(matches!(
            UseMamba.migrate(&doc(
                "version: 2\n\
                 build:\n  os: ubuntu-20.04\n  tools:\n    python: '3.9'\n\
                 conda:\n  environment: environment.yml\n"
            )),
            Err(MigrationError::Precondition { .. })
        ));
    }

    #[test]
    fn test_use_mamba_rejects_v1() {
        assert!(matches!(
            UseMamba.migrate(&doc("conda:\n  environment: environment.yml\n")),
            Err(MigrationError::RequiresV2 { .. })
        ));
    }

    #[test]
    fn test_migrated_documents_satisfy_the_build_schema() {
        use crate::validation::Validator;
        use serde_json::json;

        // Condensed from the published v2 schema: an explicit toolchain
        // needs both os and tools, with string tool versions.
        let validator = Validator::new(&json!({
            "type": "object",
            "properties": {
                "version": {"enum": [2]},
                "build": {
                    "type": "object",
                    "properties": {
                        "os": {"enum": ["ubuntu-20.04"]},
                        "tools": {
                            "type": "object",
                            "additionalProperties": {"type": "string"},
                            "minProperties": 1,
                        },
                        "apt_packages": {
                            "type": "array",
                            "items": {"type": "string"},
                        },
                    },
                    "required": ["os", "tools"],
                    "additionalProperties": false,
                },
            },
        }))
        .unwrap();

        for input in [
            "version: 2\n",
            "version: 2\npython:\n  version: 3.8\n",
            "version: 2\nbuild:\n  os: ubuntu-20.04\n",
            "version: 2\nbuild:\n  image: stable\n  apt_packages:\n  - graphviz\n",
            "version: 2\nconda:\n  environment: environment.yml\n",
        ] {
            let (migrated, applied) = UseBuildTools.migrate(&doc(input)).unwrap();
            assert!(applied, "expected a migration for: {input}");
            validator
                .validate(&migrated)
                .unwrap_or_else(|err| panic!("invalid output for {input}: {err}"));
        }

        let (migrated, applied) = UseMamba
            .migrate(&doc(
                "version: 2\n\
                 build:\n  os: ubuntu-20.04\n  tools:\n    python: miniconda3-4.7\n\
                 conda:\n  environment: environment.yml\n",
            ))
            .unwrap();
        assert!(applied);
        validator.validate(&migrated).unwrap();
    }
}
