//! Configuration management for imgshrink.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::tools::Tool;

/// Host program overrides.
#[derive(Debug, Clone, Default)]
pub struct Config {
    programs: BTreeMap<Tool, String>,
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            match dotenvy::from_path_iter(&env_path) {
                Ok(iter) => {
                    for item in iter {
                        match item {
                            Ok((key, value)) => {
                                env_vars.insert(key, value);
                            }
                            Err(e) => {
                                tracing::warn!("Skipping bad line in {}: {}", env_path.display(), e)
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!("Could not read {}: {}", env_path.display(), e),
            }
        }

        // Environment variables override .env file
        env_vars.extend(std::env::vars());

        Self::from_vars(env_vars)
    }

    /// Build a configuration from already collected key/value pairs.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let programs = Tool::ALL
            .into_iter()
            .filter_map(|tool| {
                let value = vars.get(tool.env_key())?.trim();
                (!value.is_empty()).then(|| (tool, value.to_string()))
            })
            .collect();

        Self { programs }
    }

    /// Program to execute for `tool`.
    pub fn program(&self, tool: Tool) -> &str {
        self.programs
            .get(&tool)
            .map(String::as_str)
            .unwrap_or_else(|| tool.default_program())
    }

    /// Tools whose program was overridden.
    pub fn overrides(&self) -> impl Iterator<Item = (Tool, &str)> {
        self.programs.iter().map(|(tool, p)| (*tool, p.as_str()))
    }
}
