use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A legislator row of the canonical store
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::members)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Member {
    pub id: i64,
    pub source_id: String,
    pub full_name: String,
    pub party: Option<String>,
    pub constituency: Option<String>,
    pub province: Option<String>,
    pub profile_url: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub active: bool,
    pub list_scraped_at: Option<DateTime<Utc>>,
    pub detail_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One member as listed on the roster page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Stable identifier assigned by the source
    pub source_id: String,
    pub full_name: String,
    pub party: Option<String>,
    pub constituency: Option<String>,
    pub province: Option<String>,
    pub profile_url: String,
}

/// Insert form of a roster entry
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::members)]
pub struct NewMember<'a> {
    pub source_id: &'a str,
    pub full_name: &'a str,
    pub party: Option<&'a str>,
    pub constituency: Option<&'a str>,
    pub province: Option<&'a str>,
    pub profile_url: &'a str,
    pub active: bool,
    pub list_scraped_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> NewMember<'a> {
    pub fn from_entry(entry: &'a RosterEntry, now: DateTime<Utc>) -> Self {
        Self {
            source_id: &entry.source_id,
            full_name: &entry.full_name,
            party: entry.party.as_deref(),
            constituency: entry.constituency.as_deref(),
            province: entry.province.as_deref(),
            profile_url: &entry.profile_url,
            active: true,
            list_scraped_at: now,
            updated_at: now,
        }
    }
}

/// Contact details parsed from a profile page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemberDetail {
    pub source_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

impl MemberDetail {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.website.is_none()
    }
}
