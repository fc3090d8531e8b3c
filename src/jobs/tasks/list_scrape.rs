use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::external::{RetryPolicy, fetch_with_retry};
use crate::jobs::tasks::sequencing::SequencingCoordinator;
use crate::jobs::types::{JobContext, JobTask, TaskKind, TaskOutput, TaskResult};

/// Scrape the member roster into the canonical store, then schedule the
/// detail scrape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ListScrapeTask {
    #[serde(default)]
    pub dry_run: bool,

    /// Members kept from the roster; dry runs default to `scraper.dry_run_limit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<u32>,
}

impl ListScrapeTask {
    fn effective_limit(&self, dry_run: bool, default_limit: u32) -> Option<usize> {
        match (self.limit, dry_run) {
            (Some(limit), _) => Some(limit as usize),
            (None, true) => Some(default_limit as usize),
            (None, false) => None,
        }
    }
}

#[async_trait]
impl JobTask for ListScrapeTask {
    fn task_kind() -> TaskKind
    where
        Self: Sized,
    {
        TaskKind::ListScrape
    }

    async fn execute(&self, ctx: JobContext) -> TaskResult {
        let resources = ctx.resources.clone();
        let scraper = &resources.scraper;
        let dry_run = self.dry_run || scraper.dry_run;
        let url = scraper.list_url.as_str();

        let page = fetch_with_retry(
            resources.source.as_ref(),
            url,
            &RetryPolicy::from(scraper),
        )
        .await?;
        let mut entries = resources.parser.parse_roster(&page)?;
        let roster_size = entries.len();

        let truncated = match self.effective_limit(dry_run, scraper.dry_run_limit) {
            Some(limit) if limit < roster_size => {
                entries.truncate(limit);
                true
            }
            _ => false,
        };

        let upserted = resources.members.upsert_roster(&entries).await?;
        let seen: Vec<String> = entries.iter().map(|e| e.source_id.clone()).collect();

        // A partial roster says nothing about who left the chamber
        let deactivated = if dry_run || truncated {
            0
        } else {
            resources.members.deactivate_missing(&seen).await?
        };

        tracing::info!(
            roster_size,
            upserted,
            deactivated,
            dry_run,
            "Roster scraped"
        );

        let detail_targets = (dry_run || truncated).then_some(seen);
        let report = SequencingCoordinator::new(resources.jobs.clone(), resources.jobs_config.clone())
            .after_list_success(&ctx, detail_targets, dry_run)
            .await;

        Ok(TaskOutput::new(json!({
            "roster_size": roster_size,
            "upserted": upserted,
            "deactivated": deactivated,
            "dry_run": dry_run,
            "sequencing": report,
        }))
        .with_source_url(url))
    }

    fn description(&self) -> Option<String> {
        let mode = if self.dry_run { "dry run" } else { "full run" };
        Some(match self.limit {
            Some(limit) => format!("Scrape member roster ({mode}, first {limit})"),
            None => format!("Scrape member roster ({mode})"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::external::parliament::parser::tests::{ROSTER_URL, roster_html, tile};
    use crate::external::testing::{ScriptedSource, transient};
    use crate::jobs::testing::{TestPipeline, context_with};
    use crate::jobs::JobStore;
    use crate::jobs::error::JobError;
    use crate::repositories::MemberStore;

    #[test]
    fn test_effective_limit() {
        let task = ListScrapeTask::default();
        assert_eq!(task.effective_limit(true, 5), Some(5));
        assert_eq!(task.effective_limit(false, 5), None);

        let task = ListScrapeTask {
            dry_run: false,
            limit: Some(20),
        };
        assert_eq!(task.effective_limit(false, 5), Some(20));
    }

    #[tokio::test]
    async fn test_full_run_upserts_deactivates_and_sequences() {
        let pipeline = TestPipeline::new(ScriptedSource::new().respond_ok(ROSTER_URL, roster_html(3)));
        pipeline
            .members
            .upsert_roster(&[crate::models::RosterEntry {
                source_id: "retired".to_string(),
                full_name: "Retired Member".to_string(),
                party: None,
                constituency: None,
                province: None,
                profile_url: "https://www.ourcommons.ca/members/en/retired(1)".to_string(),
            }])
            .await
            .unwrap();

        let output = ListScrapeTask::default()
            .execute(context_with(11, &pipeline))
            .await
            .unwrap();

        assert_eq!(output.data["upserted"], 3);
        assert_eq!(output.data["deactivated"], 1);
        assert_eq!(output.source_url.as_deref(), Some(ROSTER_URL));
        assert_eq!(output.data["sequencing"]["status"], "enqueued");

        let active = pipeline.members.active_members(None).await.unwrap();
        assert_eq!(active.len(), 3);

        let jobs = pipeline.jobs.snapshot().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].key.as_deref(), Some("detail-scrape:after-list:11"));
        assert!(jobs[0].payload.get("member_ids").is_none_or(|v| v.is_null()));
    }

    #[tokio::test]
    async fn test_dry_run_keeps_first_five_of_a_thousand() {
        let pipeline = TestPipeline::new(ScriptedSource::new().respond_ok(ROSTER_URL, roster_html(1000)));

        let output = ListScrapeTask {
            dry_run: true,
            limit: None,
        }
        .execute(context_with(1, &pipeline))
        .await
        .unwrap();

        assert_eq!(output.data["roster_size"], 1000);
        assert_eq!(output.data["upserted"], 5);
        assert_eq!(output.data["deactivated"], 0);
        assert_eq!(pipeline.members.all().unwrap().len(), 5);

        let detail = &pipeline.jobs.snapshot().await[0];
        assert_eq!(detail.payload["dry_run"], true);
        assert_eq!(detail.payload["member_ids"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_in_handler() {
        let source = ScriptedSource::new()
            .respond_err(ROSTER_URL, transient(ROSTER_URL, None))
            .respond_ok(ROSTER_URL, roster_html(2));
        let pipeline = TestPipeline::new(source);

        ListScrapeTask::default()
            .execute(context_with(1, &pipeline))
            .await
            .unwrap();
        assert_eq!(pipeline.source.calls(ROSTER_URL), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_sequence() {
        let html = format!("<html><body>{}</body></html>", "<p>no tiles</p>");
        let pipeline = TestPipeline::new(ScriptedSource::new().respond_ok(ROSTER_URL, html));

        let err = ListScrapeTask::default()
            .execute(context_with(1, &pipeline))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Parse { .. }));
        assert!(pipeline.jobs.snapshot().await.is_empty());
        assert!(pipeline.members.all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sequencing_failure_keeps_list_success() {
        let html = format!("<html><body>{}</body></html>", tile(5, "Solo", "ON"));
        let pipeline = TestPipeline::new(ScriptedSource::new().respond_ok(ROSTER_URL, html))
            .with_failing_enqueue();

        let output = ListScrapeTask::default()
            .execute(context_with(9, &pipeline))
            .await
            .unwrap();

        assert_eq!(output.data["upserted"], 1);
        assert_eq!(output.data["sequencing"]["status"], "failed");
        let store: Arc<dyn JobStore> = pipeline.job_store();
        assert!(store.stats().await.unwrap().is_empty());
    }
}
