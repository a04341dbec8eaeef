// ABOUTME: Validated domain types shared across the controller.
// ABOUTME: Artifact references, resource names, and stage names.

mod artifact_ref;
mod resource_name;
mod stage_name;

pub use artifact_ref::{ArtifactRef, ParseArtifactRefError};
pub use resource_name::{ResourceName, ResourceNameError};
pub use stage_name::{StageName, StageNameError};
