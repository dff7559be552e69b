//! Upserts the findings comment on the pull request.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::PublishError;
use crate::github::ReviewPlatform;
use crate::report::{render_report, FindingsReport, COMMENT_MARKER};

/// Posts rendered findings as a single comment per pull request.
///
/// A comment from an earlier run is recognized by its marker line and
/// updated in place, so repeated runs never stack comments.
pub struct ResultPublisher {
    platform: Arc<dyn ReviewPlatform>,
}

impl ResultPublisher {
    pub fn new(platform: Arc<dyn ReviewPlatform>) -> Self {
        Self { platform }
    }

    pub async fn publish(&self, report_path: &Path, pr_number: u64) -> Result<(), PublishError> {
        let report = FindingsReport::from_file(report_path)?;
        let body = render_report(&report);

        match self.find_tracked_comment(pr_number).await? {
            Some(comment_id) => {
                self.platform.update_comment(comment_id, &body).await?;
                info!(comment_id, "updated findings comment");
            }
            None => {
                let comment_id = self.platform.create_comment(pr_number, &body).await?;
                info!(comment_id, "created findings comment");
            }
        }
        Ok(())
    }

    async fn find_tracked_comment(&self, pr_number: u64) -> Result<Option<u64>, PublishError> {
        let mut page = 1;
        loop {
            let comments = self.platform.list_comments(pr_number, page).await?;
            if comments.is_empty() {
                return Ok(None);
            }
            let tracked = comments.iter().find(|comment| {
                comment
                    .body
                    .as_deref()
                    .map(|body| body.contains(COMMENT_MARKER))
                    .unwrap_or(false)
            });
            if let Some(comment) = tracked {
                return Ok(Some(comment.id));
            }
            page += 1;
        }
    }
}
