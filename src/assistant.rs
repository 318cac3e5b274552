use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use crate::document::{Document, DocumentError};
use crate::forge::{Forge, ForgeError, RepoId, TreeEntry, TreeEntryKind};
use crate::migrators::{MigrationError, Migrator};
use crate::pipeline::{Pipeline, PipelineReport, RunOutcome};
use crate::registry::{MigratorRegistry, RegistryError};
use crate::report::{commit_message, line_diff, pull_request_body, pull_request_title};
use crate::schema::{SchemaError, SchemaProvider};
use crate::validation::{SchemaValidationError, Validator};

/// Accepted configuration file names at the repository root.
/// See readthedocs/readthedocs.org, readthedocs/config/config.py.
pub const CONFIG_FILENAME_PATTERN: &str = r"^\.?readthedocs\.ya?ml$";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] SchemaValidationError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error("no configuration file found in {repo}")]
    ConfigNotFound { repo: String },

    #[error("multiple configuration files found in {repo}: {}", paths.join(", "))]
    MultipleConfigs { repo: String, paths: Vec<String> },
}

/// Per-run settings for [`migrate_repository`].
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    /// Branch the update is committed to in the fork.
    pub branch_name: String,
    /// When true, render a diff instead of publishing anything.
    pub dry_run: bool,
    /// Abort on an invalid input document instead of continuing in
    /// advisory mode.
    pub strict_validation: bool,
    /// Publish even when migrations applied but the document is
    /// structurally unchanged.
    pub publish_normalized: bool,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            branch_name: "assistant-update-config".to_string(),
            dry_run: true,
            strict_validation: false,
            publish_normalized: false,
        }
    }
}

/// What a repository run produced.
#[derive(Debug)]
pub enum AssistantOutcome {
    /// Nothing worth publishing: either no migrator applied, or the result
    /// was structurally unchanged and policy says not to publish that.
    NoChange { applied: Vec<bool> },
    /// Dry run: the change that would be proposed.
    Preview { diff: String, applied: Vec<bool> },
    /// A pull request was opened.
    Published {
        pull_request_url: String,
        applied: Vec<bool>,
    },
}

/// Picks the configuration file out of a root tree listing. Exactly one
/// match is required; several config files is a repository defect worth
/// surfacing rather than guessing.
pub fn find_config_entry(entries: &[TreeEntry], repo: &RepoId) -> Result<TreeEntry, AssistantError> {
    let pattern = Regex::new(CONFIG_FILENAME_PATTERN).unwrap();
    let mut matches: Vec<&TreeEntry> = entries
        .iter()
        .filter(|entry| entry.kind == TreeEntryKind::Blob && pattern.is_match(&entry.path))
        .collect();

    match matches.len() {
        0 => Err(AssistantError::ConfigNotFound {
            repo: repo.full_name(),
        }),
        1 => Ok(matches.remove(0).clone()),
        _ => Err(AssistantError::MultipleConfigs {
            repo: repo.full_name(),
            paths: matches.iter().map(|e| e.path.clone()).collect(),
        }),
    }
}

/// End-to-end run for a single repository: locate the configuration file,
/// validate it, thread it through the requested migrators, and either
/// preview or publish the result.
///
/// Unknown migrator names fail here, before any document is touched.
pub async fn migrate_repository(
    forge: &dyn Forge,
    schema: &SchemaProvider,
    registry: &MigratorRegistry,
    repo: &RepoId,
    migrator_names: &[String],
    settings: &AssistantSettings,
) -> Result<AssistantOutcome, AssistantError> {
    let migrators = registry.resolve(migrator_names)?;

    let validator = Validator::new(schema.fetch().await?)?;

    let (default_branch, tip_sha) = forge.default_branch_tip(repo).await?;
    let entries = forge.tree(repo, &tip_sha).await?;
    let config_entry = find_config_entry(&entries, repo)?;
    info!(repo = %repo, path = %config_entry.path, "found configuration file");

    let original_text = forge.fetch_file(repo, &config_entry.path).await?;
    let document = Document::parse(&original_text)?;

    if let Err(err) = validator.validate(&document) {
        if settings.strict_validation {
            return Err(err.into());
        }
        warn!(repo = %repo, error = %err, "input config is invalid, continuing anyway");
    }

    let report = Pipeline::new(&validator).run(&document, &migrators)?;

    match report.outcome {
        RunOutcome::NoOp => {
            info!(repo = %repo, "no migration applied, nothing else to do");
            Ok(AssistantOutcome::NoChange {
                applied: report.applied,
            })
        }
        RunOutcome::NormalizedNoChange if !settings.publish_normalized => {
            info!(
                repo = %repo,
                "at least one migration applied but the config did not change, \
                 nothing else to do"
            );
            Ok(AssistantOutcome::NoChange {
                applied: report.applied,
            })
        }
        _ => {
            info!(repo = %repo, "config changed, a pull request is warranted");
            let new_text = report.document.to_yaml()?;
            if settings.dry_run {
                Ok(AssistantOutcome::Preview {
                    diff: line_diff(&original_text, &new_text),
                    applied: report.applied,
                })
            } else {
                publish(
                    forge,
                    repo,
                    &config_entry.path,
                    &new_text,
                    &tip_sha,
                    &default_branch,
                    &migrators,
                    report,
                    settings,
                )
                .await
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn publish(
    forge: &dyn Forge,
    repo: &RepoId,
    path: &str,
    new_text: &str,
    tip_sha: &str,
    default_branch: &str,
    migrators: &[Arc<dyn Migrator>],
    report: PipelineReport,
    settings: &AssistantSettings,
) -> Result<AssistantOutcome, AssistantError> {
    let applied_migrators: Vec<_> = migrators
        .iter()
        .zip(&report.applied)
        .filter(|(_, &applied)| applied)
        .map(|(migrator, _)| migrator.clone())
        .collect();

    let fork = forge.fork(repo).await?;
    info!(fork = %fork, "fork ready");

    forge
        .create_branch(&fork, &settings.branch_name, tip_sha)
        .await?;
    info!(branch = %settings.branch_name, "branch created");

    forge
        .update_file(
            &fork,
            path,
            new_text,
            &commit_message(path, &applied_migrators),
            &settings.branch_name,
        )
        .await?;
    info!(path, "contents updated");

    let head = format!("{}:{}", fork.owner, settings.branch_name);
    let pull_request_url = forge
        .open_pull_request(
            repo,
            &pull_request_title(&applied_migrators),
            &pull_request_body(&applied_migrators),
            &head,
            default_branch,
        )
        .await?;
    info!(url = %pull_request_url, "pull request opened");

    Ok(AssistantOutcome::Published {
        pull_request_url,
        applied: report.applied,
    })
}
