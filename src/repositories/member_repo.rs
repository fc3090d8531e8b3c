//! Canonical member store.
//!
//! Roster and detail writes are idempotent upserts keyed by the source's
//! member id, so a retried scrape converges to the same rows.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::db::AsyncDbPool;
use crate::error::AppResult;
use crate::models::{Member, MemberDetail, NewMember, RosterEntry};

#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Insert or refresh roster rows; every upserted member becomes active.
    async fn upsert_roster(&self, entries: &[RosterEntry]) -> AppResult<usize>;

    /// Mark active members whose source id is not in `seen` as inactive.
    ///
    /// An empty `seen` set is a no-op rather than a mass deactivation.
    async fn deactivate_missing(&self, seen: &[String]) -> AppResult<u64>;

    /// Active members in roster insertion order.
    async fn active_members(&self, limit: Option<i64>) -> AppResult<Vec<Member>>;

    async fn find_by_source_ids(&self, source_ids: &[String]) -> AppResult<Vec<Member>>;

    /// Store contact details. Returns `false` when the member is unknown.
    async fn upsert_detail(&self, detail: &MemberDetail) -> AppResult<bool>;
}

/// PostgreSQL member repository.
///
/// Since `AsyncDbPool` (bb8::Pool) internally uses `Arc`, cloning is cheap.
#[derive(Clone)]
pub struct PgMemberRepository {
    pool: AsyncDbPool,
}

impl PgMemberRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberStore for PgMemberRepository {
    async fn upsert_roster(&self, entries: &[RosterEntry]) -> AppResult<usize> {
        use crate::schema::members::dsl::*;

        if entries.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let rows: Vec<NewMember<'_>> = entries
            .iter()
            .map(|entry| NewMember::from_entry(entry, now))
            .collect();

        let mut conn = self.pool.get().await?;
        diesel::insert_into(members)
            .values(&rows)
            .on_conflict(source_id)
            .do_update()
            .set((
                full_name.eq(excluded(full_name)),
                party.eq(excluded(party)),
                constituency.eq(excluded(constituency)),
                province.eq(excluded(province)),
                profile_url.eq(excluded(profile_url)),
                active.eq(true),
                list_scraped_at.eq(excluded(list_scraped_at)),
                updated_at.eq(excluded(updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(Into::into)
    }

    async fn deactivate_missing(&self, seen: &[String]) -> AppResult<u64> {
        use crate::schema::members::dsl::*;

        if seen.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            members
                .filter(active.eq(true))
                .filter(source_id.ne_all(seen)),
        )
        .set((active.eq(false), updated_at.eq(Utc::now())))
        .execute(&mut conn)
        .await?;

        Ok(updated as u64)
    }

    async fn active_members(&self, limit: Option<i64>) -> AppResult<Vec<Member>> {
        use crate::schema::members::dsl::*;
        let mut conn = self.pool.get().await?;

        let mut query = members
            .filter(active.eq(true))
            .order(id.asc())
            .select(Member::as_select())
            .into_boxed();
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query.load(&mut conn).await.map_err(Into::into)
    }

    async fn find_by_source_ids(&self, source_ids: &[String]) -> AppResult<Vec<Member>> {
        use crate::schema::members::dsl::*;
        let mut conn = self.pool.get().await?;

        members
            .filter(source_id.eq_any(source_ids))
            .order(id.asc())
            .select(Member::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    async fn upsert_detail(&self, detail: &MemberDetail) -> AppResult<bool> {
        use crate::schema::members::dsl::*;
        let mut conn = self.pool.get().await?;

        let now = Utc::now();
        let updated = diesel::update(members.filter(source_id.eq(&detail.source_id)))
            .set((
                email.eq(detail.email.as_deref()),
                phone.eq(detail.phone.as_deref()),
                website.eq(detail.website.as_deref()),
                detail_scraped_at.eq(now),
                updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(updated > 0)
    }
}
