//! In-process member store used with `memory:` database URLs and in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::member_repo::MemberStore;
use crate::error::{AppError, AppResult};
use crate::models::{Member, MemberDetail, RosterEntry};

#[derive(Default)]
struct MemberTable {
    rows: Vec<Member>,
    by_source_id: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MemoryMemberRepository {
    table: Mutex<MemberTable>,
}

impl MemoryMemberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, MemberTable>> {
        self.table.lock().map_err(|_| AppError::Internal {
            source: anyhow::anyhow!("member table mutex poisoned"),
        })
    }

    /// Every stored member, active or not.
    pub fn all(&self) -> AppResult<Vec<Member>> {
        Ok(self.lock()?.rows.clone())
    }
}

#[async_trait]
impl MemberStore for MemoryMemberRepository {
    async fn upsert_roster(&self, entries: &[RosterEntry]) -> AppResult<usize> {
        let now = Utc::now();
        let mut table = self.lock()?;

        for entry in entries {
            match table.by_source_id.get(&entry.source_id).copied() {
                Some(index) => {
                    let row = &mut table.rows[index];
                    row.full_name = entry.full_name.clone();
                    row.party = entry.party.clone();
                    row.constituency = entry.constituency.clone();
                    row.province = entry.province.clone();
                    row.profile_url = entry.profile_url.clone();
                    row.active = true;
                    row.list_scraped_at = Some(now);
                    row.updated_at = now;
                }
                None => {
                    let index = table.rows.len();
                    table.rows.push(Member {
                        id: index as i64 + 1,
                        source_id: entry.source_id.clone(),
                        full_name: entry.full_name.clone(),
                        party: entry.party.clone(),
                        constituency: entry.constituency.clone(),
                        province: entry.province.clone(),
                        profile_url: entry.profile_url.clone(),
                        email: None,
                        phone: None,
                        website: None,
                        active: true,
                        list_scraped_at: Some(now),
                        detail_scraped_at: None,
                        created_at: now,
                        updated_at: now,
                    });
                    table.by_source_id.insert(entry.source_id.clone(), index);
                }
            }
        }

        Ok(entries.len())
    }

    async fn deactivate_missing(&self, seen: &[String]) -> AppResult<u64> {
        if seen.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut table = self.lock()?;
        let mut updated = 0;
        for row in table.rows.iter_mut() {
            if row.active && !seen.contains(&row.source_id) {
                row.active = false;
                row.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn active_members(&self, limit: Option<i64>) -> AppResult<Vec<Member>> {
        let take = limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(self
            .lock()?
            .rows
            .iter()
            .filter(|row| row.active)
            .take(take)
            .cloned()
            .collect())
    }

    async fn find_by_source_ids(&self, source_ids: &[String]) -> AppResult<Vec<Member>> {
        let table = self.lock()?;
        let mut indices: Vec<usize> = source_ids
            .iter()
            .filter_map(|id| table.by_source_id.get(id).copied())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        Ok(indices.into_iter().map(|i| table.rows[i].clone()).collect())
    }

    async fn upsert_detail(&self, detail: &MemberDetail) -> AppResult<bool> {
        let now = Utc::now();
        let mut table = self.lock()?;
        let Some(index) = table.by_source_id.get(&detail.source_id).copied() else {
            return Ok(false);
        };

        let row = &mut table.rows[index];
        row.email = detail.email.clone();
        row.phone = detail.phone.clone();
        row.website = detail.website.clone();
        row.detail_scraped_at = Some(now);
        row.updated_at = now;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> RosterEntry {
        RosterEntry {
            source_id: id.to_string(),
            full_name: name.to_string(),
            party: Some("Independent".to_string()),
            constituency: None,
            province: Some("Ontario".to_string()),
            profile_url: format!("https://example.test/members/{id}"),
        }
    }

    #[tokio::test]
    async fn test_upsert_roster_is_idempotent() {
        let repo = MemoryMemberRepository::new();
        let roster = vec![entry("1", "One"), entry("2", "Two")];

        repo.upsert_roster(&roster).await.unwrap();
        repo.upsert_roster(&roster).await.unwrap();

        let all = repo.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, 1);
        assert_eq!(all[1].source_id, "2");
    }

    #[tokio::test]
    async fn test_upsert_roster_refreshes_fields_and_reactivates() {
        let repo = MemoryMemberRepository::new();
        repo.upsert_roster(&[entry("1", "One")]).await.unwrap();
        repo.upsert_roster(&[entry("2", "Two")]).await.unwrap();
        repo.deactivate_missing(&["2".to_string()]).await.unwrap();

        repo.upsert_roster(&[entry("1", "One Renamed")]).await.unwrap();

        let found = repo.find_by_source_ids(&["1".to_string()]).await.unwrap();
        assert_eq!(found[0].full_name, "One Renamed");
        assert!(found[0].active);
    }

    #[tokio::test]
    async fn test_deactivate_missing() {
        let repo = MemoryMemberRepository::new();
        repo.upsert_roster(&[entry("1", "One"), entry("2", "Two"), entry("3", "Three")])
            .await
            .unwrap();

        let deactivated = repo
            .deactivate_missing(&["1".to_string(), "3".to_string()])
            .await
            .unwrap();
        assert_eq!(deactivated, 1);

        let active: Vec<_> = repo
            .active_members(None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.source_id)
            .collect();
        assert_eq!(active, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_deactivate_with_empty_seen_is_noop() {
        let repo = MemoryMemberRepository::new();
        repo.upsert_roster(&[entry("1", "One")]).await.unwrap();
        assert_eq!(repo.deactivate_missing(&[]).await.unwrap(), 0);
        assert_eq!(repo.active_members(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_active_members_limit() {
        let repo = MemoryMemberRepository::new();
        let roster: Vec<_> = (1..=10).map(|i| entry(&i.to_string(), "M")).collect();
        repo.upsert_roster(&roster).await.unwrap();

        let first = repo.active_members(Some(3)).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].source_id, "3");
    }

    #[tokio::test]
    async fn test_upsert_detail() {
        let repo = MemoryMemberRepository::new();
        repo.upsert_roster(&[entry("1", "One")]).await.unwrap();

        let detail = MemberDetail {
            source_id: "1".to_string(),
            email: Some("one@example.test".to_string()),
            phone: None,
            website: None,
        };
        assert!(repo.upsert_detail(&detail).await.unwrap());

        let unknown = MemberDetail {
            source_id: "404".to_string(),
            ..MemberDetail::default()
        };
        assert!(!repo.upsert_detail(&unknown).await.unwrap());

        let member = &repo.find_by_source_ids(&["1".to_string()]).await.unwrap()[0];
        assert_eq!(member.email.as_deref(), Some("one@example.test"));
        assert!(member.detail_scraped_at.is_some());
    }
}
