use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::sleep;
use validator::Validate;

use crate::external::{RetryPolicy, fetch_with_retry};
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::types::{JobContext, JobTask, TaskKind, TaskOutput, TaskResources, TaskResult};
use crate::models::Member;

/// Scrape contact details for each target member's profile page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct DetailScrapeTask {
    /// Source ids to scrape; every active member when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 1000))]
    pub member_ids: Option<Vec<String>>,

    #[serde(default)]
    pub dry_run: bool,
}

impl DetailScrapeTask {
    async fn targets(&self, resources: &TaskResources, dry_run: bool) -> JobResult<(Vec<Member>, Vec<String>)> {
        match &self.member_ids {
            Some(ids) => {
                let found = resources.members.find_by_source_ids(ids).await?;
                let known: HashSet<&str> = found.iter().map(|m| m.source_id.as_str()).collect();
                let unknown: Vec<String> = ids
                    .iter()
                    .filter(|id| !known.contains(id.as_str()))
                    .cloned()
                    .collect();
                Ok((found, unknown))
            }
            None => {
                let limit = dry_run.then_some(i64::from(resources.scraper.dry_run_limit));
                Ok((resources.members.active_members(limit).await?, Vec::new()))
            }
        }
    }

    async fn scrape_one(
        resources: &TaskResources,
        policy: &RetryPolicy,
        member: &Member,
    ) -> JobResult<bool> {
        let page = fetch_with_retry(resources.source.as_ref(), &member.profile_url, policy).await?;
        let detail = resources.parser.parse_detail(&page, &member.source_id)?;
        if detail.is_empty() {
            tracing::debug!(source_id = %member.source_id, "Profile has no contact details");
        }
        Ok(resources.members.upsert_detail(&detail).await?)
    }
}

#[async_trait]
impl JobTask for DetailScrapeTask {
    fn task_kind() -> TaskKind
    where
        Self: Sized,
    {
        TaskKind::DetailScrape
    }

    async fn execute(&self, ctx: JobContext) -> TaskResult {
        let resources = ctx.resources.as_ref();
        let dry_run = self.dry_run || resources.scraper.dry_run;
        let (targets, unknown_ids) = self.targets(resources, dry_run).await?;

        if !unknown_ids.is_empty() {
            tracing::warn!(unknown = ?unknown_ids, "Skipping members missing from the canonical store");
        }

        let policy = RetryPolicy::from(&resources.scraper);
        let interval = resources.scraper.request_interval();
        let total = targets.len();
        let mut updated = 0usize;
        let mut failures: Vec<(String, JobError)> = Vec::new();

        for (index, member) in targets.iter().enumerate() {
            if index > 0 && !interval.is_zero() {
                sleep(interval).await;
            }

            match Self::scrape_one(resources, &policy, member).await {
                Ok(true) => updated += 1,
                Ok(false) => {
                    tracing::warn!(source_id = %member.source_id, "Member disappeared before its detail was stored");
                }
                Err(error) => {
                    tracing::warn!(
                        source_id = %member.source_id,
                        url = %member.profile_url,
                        error = %error,
                        "Detail scrape failed for member"
                    );
                    failures.push((member.source_id.clone(), error));
                }
            }
        }

        if !failures.is_empty() {
            let failed = failures.len();
            let failed_ids: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
            tracing::warn!(failed, total, updated, failed_ids = ?failed_ids, "Detail scrape incomplete");

            let (_, first) = failures.swap_remove(0);
            return Err(JobError::PartialFailure {
                failed,
                total,
                first: Box::new(first),
            });
        }

        tracing::info!(total, updated, dry_run, "Member details scraped");

        Ok(TaskOutput::new(json!({
            "targets": total,
            "updated": updated,
            "unknown_ids": unknown_ids,
            "dry_run": dry_run,
        })))
    }

    fn description(&self) -> Option<String> {
        Some(match &self.member_ids {
            Some(ids) => format!("Scrape details for {} members", ids.len()),
            None => "Scrape details for all active members".to_string(),
        })
    }
}
