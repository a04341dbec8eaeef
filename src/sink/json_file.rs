// ABOUTME: Writes each release report as a JSON document into a directory.
// ABOUTME: File names combine the release name and start time so reports never collide.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{ReportSink, SinkError};
use crate::controller::ReleaseReport;

#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<namespace>-<release>-<started_at>.json`
    pub fn path_for(&self, report: &ReleaseReport) -> PathBuf {
        let target = report.request().target();
        self.dir.join(format!(
            "{}-{}-{}.json",
            target.namespace,
            target.release,
            report.started_at().format("%Y%m%dT%H%M%S%.3fZ")
        ))
    }
}

#[async_trait]
impl ReportSink for JsonFileSink {
    fn name(&self) -> &str {
        "json"
    }

    async fn publish(&self, report: &ReleaseReport) -> Result<(), SinkError> {
        let json = serde_json::to_vec_pretty(report)?;
        let path = self.path_for(report);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(report = %path.display(), "report written");
        Ok(())
    }
}
