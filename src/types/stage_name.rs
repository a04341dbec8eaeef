// ABOUTME: Stage identifier used in workflow files and release reports.
// ABOUTME: Allows human-readable names like "Build & Test".

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageNameError {
    #[error("stage name cannot be empty")]
    Empty,

    #[error("stage name exceeds maximum length of 64 characters")]
    TooLong,

    #[error("invalid character in stage name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageName(String);

impl StageName {
    pub fn new(value: &str) -> Result<Self, StageNameError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(StageNameError::Empty);
        }
        if value.len() > 64 {
            return Err(StageNameError::TooLong);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, ' ' | '_' | '&' | '.' | '-'))
        {
            return Err(StageNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StageName {
    type Err = StageNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::new(s)
    }
}

impl PartialEq<str> for StageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for StageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StageName::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_human_readable_names() {
        let name: StageName = "Build & Test".parse().unwrap();
        assert_eq!(name, "Build & Test");
        assert_eq!(StageName::new("  Checkout ").unwrap().as_str(), "Checkout");
    }

    #[test]
    fn rejects_invalid_names() {
        assert_eq!(StageName::new("   "), Err(StageNameError::Empty));
        assert_eq!(StageName::new(&"x".repeat(65)), Err(StageNameError::TooLong));
        assert_eq!(
            StageName::new("deploy/prod"),
            Err(StageNameError::InvalidChar('/'))
        );
    }

    #[test]
    fn names_compare_case_sensitively() {
        assert_ne!(StageName::new("build").unwrap(), StageName::new("Build").unwrap());
    }

    #[test]
    fn deserializes_with_validation() {
        let name: StageName = serde_yaml::from_str("Image Publish").unwrap();
        assert_eq!(name.to_string(), "Image Publish");
        assert!(serde_yaml::from_str::<StageName>("\"bad|name\"").is_err());
    }
}
