//! Definition parser for loading module definition files.
//!
//! This module handles loading module definitions from YAML files and the
//! environment, with proper precedence and error handling.

use crate::error::{ConvergeError, Result, ValidationError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::ModuleDefinition;

/// Parser for loading module definitions.
#[derive(Debug, Default)]
pub struct DefinitionParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl DefinitionParser {
    /// Creates a new definition parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a module definition from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// definition is structurally invalid.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ModuleDefinition> {
        let path = path.as_ref();
        info!("Loading module definition from: {}", path.display());

        if !path.exists() {
            return Err(ConvergeError::Validation(ValidationError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvergeError::Validation(ValidationError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a module definition from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or the definition is
    /// structurally invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ModuleDefinition> {
        debug!("Parsing YAML module definition");

        let definition: ModuleDefinition = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ConvergeError::Validation(ValidationError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        definition.validate()?;

        debug!(
            "Successfully parsed definition for module: {}",
            definition.module
        );
        Ok(definition)
    }

    /// Loads a module definition with environment overrides applied.
    ///
    /// Overrides are checked in the format `CONVERGE_TARGET_<KEY>`
    /// (e.g., `CONVERGE_TARGET_BASE_URL`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ModuleDefinition> {
        let mut definition = self.load_file(path)?;
        Self::apply_env_overrides(&mut definition);
        definition.validate()?;
        Ok(definition)
    }

    /// Applies environment variable overrides to the definition.
    fn apply_env_overrides(definition: &mut ModuleDefinition) {
        if let Ok(base_url) = std::env::var("CONVERGE_TARGET_BASE_URL") {
            debug!("Overriding target.base_url from environment");
            definition.target.base_url = Some(base_url);
        }

        if let Ok(auth_env) = std::env::var("CONVERGE_TARGET_AUTH_ENV") {
            debug!("Overriding target.auth_env from environment");
            definition.target.auth_env = auth_env;
        }

        if let Ok(timeout) = std::env::var("CONVERGE_TARGET_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse()
        {
            debug!("Overriding target.timeout_secs from environment");
            definition.target.timeout_secs = secs;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConvergeError::Validation(ValidationError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default definition file names to search for.
pub const DEFAULT_DEFINITION_FILES: &[&str] = &[
    "converge.module.yaml",
    "converge.module.yml",
    "module.yaml",
    "module.yml",
];

/// Finds the definition file in the given directory or its ancestors.
///
/// # Errors
///
/// Returns an error if no definition file is found.
pub fn find_definition_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_DEFINITION_FILES {
            let path = current.join(filename);
            if path.exists() {
                info!("Found definition file: {}", path.display());
                return Ok(path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConvergeError::Validation(ValidationError::FileNotFound {
        path: start.join(DEFAULT_DEFINITION_FILES[0]),
    }))
}
