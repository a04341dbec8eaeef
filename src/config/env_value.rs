// ABOUTME: Action environment values: literals or lookups in the controller's environment.
// ABOUTME: Lookups are resolved when the action is rendered, not when the workflow loads.

use crate::error::{Error, Result};
use serde::Deserialize;

/// ```yaml
/// env:
///   MAVEN_OPTS: -Xmx1g
///   REGISTRY_TOKEN: { env: CI_REGISTRY_TOKEN }
///   PROFILE: { env: SPRING_PROFILE, default: prod }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn literal(value: impl Into<String>) -> Self {
        EnvValue::Literal(value.into())
    }

    pub fn from_env(var: impl Into<String>) -> Self {
        EnvValue::FromEnv {
            var: var.into(),
            default: None,
        }
    }

    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}
