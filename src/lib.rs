// Read the Docs configuration assistant
pub mod assistant;
pub mod document;
pub mod forge;
pub mod github;
pub mod migrators;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod schema;
pub mod validation;

// Re-export core types for convenience
pub use assistant::{
    migrate_repository, AssistantError, AssistantOutcome, AssistantSettings,
    CONFIG_FILENAME_PATTERN,
};
pub use document::{BuildSection, Document, DocumentError, SORTED_KEYS};
pub use forge::{Forge, ForgeError, RepoId, TreeEntry, TreeEntryKind};
pub use github::GitHubForge;
pub use migrators::{MigrationError, Migrator, UseBuildTools, UseMamba};
pub use pipeline::{Pipeline, PipelineReport, RunOutcome};
pub use registry::{MigratorRegistry, RegistryError};
pub use schema::{SchemaError, SchemaProvider, DEFAULT_SCHEMA_URL};
pub use validation::{SchemaValidationError, Validator};
