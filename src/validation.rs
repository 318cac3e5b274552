use jsonschema::JSONSchema;
use thiserror::Error;

use crate::document::{Document, DocumentError};

/// Failure to validate a document against the configuration schema.
#[derive(Debug, Error)]
pub enum SchemaValidationError {
    #[error("schema does not compile: {0}")]
    InvalidSchema(String),

    #[error("document violates schema: {}", .0.join("; "))]
    Violations(Vec<String>),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Validates documents against a compiled JSON Schema.
pub struct Validator {
    compiled: JSONSchema,
}

impl Validator {
    pub fn new(schema: &serde_json::Value) -> Result<Self, SchemaValidationError> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|err| SchemaValidationError::InvalidSchema(err.to_string()))?;
        Ok(Self { compiled })
    }

    /// Checks the document against the schema, reporting every violation
    /// with its instance path.
    pub fn validate(&self, document: &Document) -> Result<(), SchemaValidationError> {
        let instance = document.to_json()?;
        if let Err(errors) = self.compiled.validate(&instance) {
            let violations: Vec<String> = errors
                .map(|error| format!("{}: {}", error.instance_path, error))
                .collect();
            return Err(SchemaValidationError::Violations(violations));
        }
        Ok(())
    }
}
