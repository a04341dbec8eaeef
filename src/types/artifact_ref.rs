// ABOUTME: Artifact (container image) reference parsing and validation.
// ABOUTME: Handles formats like app, app:tag, registry/project/repo/app:tag@digest.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseArtifactRefError {
    #[error("artifact reference cannot be empty")]
    Empty,

    #[error("invalid character in artifact reference: {0}")]
    InvalidChar(char),

    #[error("invalid artifact reference format: {0}")]
    InvalidFormat(String),

    #[error("invalid digest in artifact reference: {0}")]
    InvalidDigest(String),
}

/// Immutable identifier of the build artifact a release publishes.
///
/// The controller treats the reference as opaque beyond validation: it is
/// rendered back exactly as parsed and handed to the publish and deploy
/// actions through the `RELEASE_ARTIFACT` binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ArtifactRef {
    pub fn parse(input: &str) -> Result<Self, ParseArtifactRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseArtifactRefError::Empty);
        }

        for c in input.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_' | '@') {
                return Err(ParseArtifactRefError::InvalidChar(c));
            }
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) => {
                if !after.contains(':') || after.ends_with(':') {
                    return Err(ParseArtifactRefError::InvalidDigest(after.to_string()));
                }
                (before, Some(after.to_string()))
            }
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag
        let (without_tag, tag) = match without_digest.rsplit_once(':') {
            Some((_, after)) if after.contains('/') => (without_digest, None),
            Some((before, after)) if !after.is_empty() => (before, Some(after.to_string())),
            Some(_) => return Err(ParseArtifactRefError::InvalidFormat(input.to_string())),
            None => (without_digest, None),
        };

        let (registry, repository) = Self::split_registry(without_tag)?;

        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    fn split_registry(input: &str) -> Result<(Option<String>, String), ParseArtifactRefError> {
        if input.is_empty() || input.starts_with('/') || input.ends_with('/') {
            return Err(ParseArtifactRefError::InvalidFormat(input.to_string()));
        }

        match input.split_once('/') {
            None => Ok((None, input.to_string())),
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                Ok((Some(first.to_string()), rest.to_string()))
            }
            Some(_) => Ok((None, input.to_string())),
        }
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Whether the reference pins content by digest.
    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl Serialize for ArtifactRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArtifactRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ArtifactRef::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_artifact_registry_path() {
        let r = ArtifactRef::parse("europe-west1-docker.pkg.dev/proj/apps/demo:1.4.0").unwrap();
        assert_eq!(r.registry(), Some("europe-west1-docker.pkg.dev"));
        assert_eq!(r.repository(), "proj/apps/demo");
        assert_eq!(r.tag(), Some("1.4.0"));
        assert!(!r.is_pinned());
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let r = ArtifactRef::parse("localhost:5000/demo").unwrap();
        assert_eq!(r.registry(), Some("localhost:5000"));
        assert_eq!(r.repository(), "demo");
        assert_eq!(r.tag(), Some("latest"));
    }

    #[test]
    fn digest_only_reference_has_no_default_tag() {
        let r = ArtifactRef::parse("ghcr.io/org/demo@sha256:abc123").unwrap();
        assert_eq!(r.tag(), None);
        assert_eq!(r.digest(), Some("sha256:abc123"));
        assert_eq!(r.to_string(), "ghcr.io/org/demo@sha256:abc123");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(ArtifactRef::parse("  "), Err(ParseArtifactRefError::Empty));
        assert_eq!(
            ArtifactRef::parse("demo app"),
            Err(ParseArtifactRefError::InvalidChar(' '))
        );
        assert!(matches!(
            ArtifactRef::parse("demo@nodigest"),
            Err(ParseArtifactRefError::InvalidDigest(_))
        ));
        assert!(matches!(
            ArtifactRef::parse("demo:"),
            Err(ParseArtifactRefError::InvalidFormat(_))
        ));
    }
}
