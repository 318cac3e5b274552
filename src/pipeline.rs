use std::sync::Arc;

use tracing::debug;

use crate::document::Document;
use crate::migrators::{MigrationError, Migrator};
use crate::validation::Validator;

/// Classification of a full pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No migrator applied; the document was already current.
    NoOp,
    /// At least one migrator applied but the final document is structurally
    /// equal to the original. Whether this warrants publication is a policy
    /// decision left to the caller.
    NormalizedNoChange,
    /// At least one migrator applied and the document changed.
    ChangeRequired,
}

/// Result of threading a document through an ordered list of migrators.
#[derive(Debug)]
pub struct PipelineReport {
    pub document: Document,
    /// Per-step applied flags, in pipeline order.
    pub applied: Vec<bool>,
    pub outcome: RunOutcome,
}

impl PipelineReport {
    pub fn any_applied(&self) -> bool {
        self.applied.iter().any(|&applied| applied)
    }
}

/// Applies migrators in order, re-validating after every applied step.
pub struct Pipeline<'a> {
    validator: &'a Validator,
}

impl<'a> Pipeline<'a> {
    pub fn new(validator: &'a Validator) -> Self {
        Self { validator }
    }

    /// Threads `document` through `migrators` strictly in the given order;
    /// each step's output becomes the next step's input. Any step error
    /// aborts the run; no partial document is returned.
    ///
    /// A schema violation in an applied step's output is re-raised as an
    /// internal migrator defect. Steps that did not apply are not
    /// re-validated: their output is the untouched input, which may be
    /// invalid on purpose when running in advisory mode.
    pub fn run(
        &self,
        document: &Document,
        migrators: &[Arc<dyn Migrator>],
    ) -> Result<PipelineReport, MigrationError> {
        let mut current = document.clone();
        let mut applied = Vec::with_capacity(migrators.len());

        for migrator in migrators {
            debug!(migrator = migrator.name(), "applying migrator");
            let (next, step_applied) = migrator.migrate(&current)?;
            if step_applied {
                self.validator
                    .validate(&next)
                    .map_err(|source| MigrationError::Internal {
                        migrator: migrator.name().to_string(),
                        source,
                    })?;
            }
            debug!(
                migrator = migrator.name(),
                applied = step_applied,
                "step finished"
            );
            applied.push(step_applied);
            current = next;
        }

        let outcome = if !applied.iter().any(|&a| a) {
            RunOutcome::NoOp
        } else if current == *document {
            RunOutcome::NormalizedNoChange
        } else {
            RunOutcome::ChangeRequired
        };

        Ok(PipelineReport {
            document: current,
            applied,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BuildSection;
    use crate::migrators::{UseBuildTools, UseMamba};
    use serde_json::json;

    fn doc(text: &str) -> Document {
        Document::parse(text).unwrap()
    }

    fn permissive() -> Validator {
        Validator::new(&json!({"type": "object"})).unwrap()
    }

    fn migrators() -> Vec<Arc<dyn Migrator>> {
        vec![Arc::new(UseBuildTools), Arc::new(UseMamba)]
    }

    #[test]
    fn test_full_conda_pipeline() {
        let validator = permissive();
        let report = Pipeline::new(&validator)
            .run(
                &doc("version: 2\nconda:\n  environment: environment.yml\n"),
                &migrators(),
            )
            .unwrap();

        assert_eq!(report.applied, vec![true, true]);
        assert_eq!(report.outcome, RunOutcome::ChangeRequired);
        match report.document.build().unwrap() {
            Some(BuildSection::Toolchain { tools, .. }) => {
                assert_eq!(
                    tools.get("python").map(String::as_str),
                    Some("mambaforge-4.10")
                );
            }
            other => panic!("unexpected build shape: {other:?}"),
        }
    }

    #[test]
    fn test_order_sensitivity() {
        let validator = permissive();
        let reversed: Vec<Arc<dyn Migrator>> = vec![Arc::new(UseMamba), Arc::new(UseBuildTools)];
        let result = Pipeline::new(&validator).run(
            &doc("version: 2\nconda:\n  environment: environment.yml\n"),
            &reversed,
        );
        assert!(matches!(result, Err(MigrationError::Precondition { .. })));
    }

    #[test]
    fn test_no_op_detection() {
        let validator = permissive();
        let input = doc("version: 2\nbuild:\n  os: ubuntu-20.04\n  tools:\n    python: '3.9'\n");
        let single: Vec<Arc<dyn Migrator>> = vec![Arc::new(UseBuildTools)];
        let report = Pipeline::new(&validator).run(&input, &single).unwrap();

        assert_eq!(report.applied, vec![false]);
        assert_eq!(report.outcome, RunOutcome::NoOp);
        assert_eq!(report.document, input);
    }

    /// Applies but leaves the document unchanged.
    struct Reserialize;

    impl Migrator for Reserialize {
        fn name(&self) -> &'static str {
            "reserialize"
        }
        fn title(&self) -> &'static str {
            "Reserialize"
        }
        fn description(&self) -> &'static str {
            "Rewrites the file without changing its contents."
        }
        fn migrate(&self, document: &Document) -> Result<(Document, bool), MigrationError> {
            Ok((document.clone(), true))
        }
    }

    #[test]
    fn test_normalized_no_change_detection() {
        let validator = permissive();
        let input = doc("version: 2\n");
        let normalizers: Vec<Arc<dyn Migrator>> = vec![Arc::new(Reserialize)];
        let report = Pipeline::new(&validator).run(&input, &normalizers).unwrap();

        assert_eq!(report.applied, vec![true]);
        assert_eq!(report.outcome, RunOutcome::NormalizedNoChange);
    }

    /// Deliberately breaks the document to exercise the re-validation gate.
    struct Corrupt;

    impl Migrator for Corrupt {
        fn name(&self) -> &'static str {
            "corrupt"
        }
        fn title(&self) -> &'static str {
            "Corrupt"
        }
        fn description(&self) -> &'static str {
            "Produces an invalid document."
        }
        fn migrate(&self, _document: &Document) -> Result<(Document, bool), MigrationError> {
            let mut root = serde_yaml::Mapping::new();
            root.insert(
                serde_yaml::Value::String("version".to_string()),
                serde_yaml::Value::String("bogus".to_string()),
            );
            Ok((Document::from_mapping(root), true))
        }
    }

    #[test]
    fn test_invalid_migrator_output_is_an_internal_error() {
        let validator = Validator::new(&json!({
            "type": "object",
            "properties": {"version": {"type": "integer"}},
        }))
        .unwrap();
        let corrupting: Vec<Arc<dyn Migrator>> = vec![Arc::new(Corrupt)];
        let result = Pipeline::new(&validator).run(&doc("version: 2\n"), &corrupting);
        assert!(matches!(
            result,
            Err(MigrationError::Internal { migrator, .. }) if migrator == "corrupt"
        ));
    }
}
