use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::province::normalize_province;
use crate::config::SelectorSettings;
use crate::external::source::SourcePage;
use crate::jobs::error::{JobError, JobResult};
use crate::models::{MemberDetail, RosterEntry};

/// Profile links end in `name(12345)`; the number is the source's member id.
static SOURCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)/?$").expect("static regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(?\d{3}\)?[\s.-]?\d{3}[\s.-]\d{4}").expect("static regex"));

/// Selector-driven parser for roster and profile pages.
pub struct PageParser {
    member: Selector,
    name: Selector,
    party: Selector,
    constituency: Selector,
    province: Selector,
    link: Selector,
    contact: Selector,
    mailto: Selector,
    tel: Selector,
    anchor: Selector,
}

impl PageParser {
    pub fn new(settings: &SelectorSettings) -> JobResult<Self> {
        Ok(Self {
            member: compile("scraper.selectors.member", &settings.member)?,
            name: compile("scraper.selectors.name", &settings.name)?,
            party: compile("scraper.selectors.party", &settings.party)?,
            constituency: compile("scraper.selectors.constituency", &settings.constituency)?,
            province: compile("scraper.selectors.province", &settings.province)?,
            link: compile("scraper.selectors.link", &settings.link)?,
            contact: compile("scraper.selectors.contact", &settings.contact)?,
            mailto: compile("mailto", r#"a[href^="mailto:"]"#)?,
            tel: compile("tel", r#"a[href^="tel:"]"#)?,
            anchor: compile("anchor", "a[href]")?,
        })
    }

    /// Parse the roster page in document order, skipping malformed tiles
    /// and duplicate ids.
    ///
    /// A page that yields no member at all is a parse failure: the source
    /// changed its markup or served an error page with status 200.
    pub fn parse_roster(&self, page: &SourcePage) -> JobResult<Vec<RosterEntry>> {
        let base = Url::parse(&page.url)
            .map_err(|e| JobError::parse(&page.url, format!("invalid page URL: {e}")))?;
        let document = Html::parse_document(&page.body);

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for tile in document.select(&self.member) {
            match self.parse_tile(&base, tile) {
                Some(entry) => {
                    if seen.insert(entry.source_id.clone()) {
                        entries.push(entry);
                    }
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(url = %page.url, skipped, parsed = entries.len(), "Skipped malformed roster tiles");
        }

        if entries.is_empty() {
            return Err(JobError::parse(
                &page.url,
                format!("no members found (skipped {skipped} malformed tiles)"),
            ));
        }

        Ok(entries)
    }

    fn parse_tile(&self, base: &Url, tile: ElementRef<'_>) -> Option<RosterEntry> {
        let full_name = first_text(tile, &self.name)?;

        // The tile itself may be the link
        let href = tile
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .or_else(|| tile.value().attr("href"))?;
        let profile_url = base.join(href).ok()?;
        let source_id = source_id_from_url(&profile_url)?;

        let province = first_text(tile, &self.province)
            .map(|raw| normalize_province(&raw).map(str::to_string).unwrap_or(raw));

        Some(RosterEntry {
            source_id,
            full_name,
            party: first_text(tile, &self.party),
            constituency: first_text(tile, &self.constituency),
            province,
            profile_url: profile_url.to_string(),
        })
    }

    /// Parse contact details from a profile page.
    pub fn parse_detail(&self, page: &SourcePage, source_id: &str) -> JobResult<MemberDetail> {
        let page_url = Url::parse(&page.url)
            .map_err(|e| JobError::parse(&page.url, format!("invalid page URL: {e}")))?;
        let document = Html::parse_document(&page.body);

        let contact = document.select(&self.contact).next().ok_or_else(|| {
            JobError::parse(&page.url, format!("contact section missing for member {source_id}"))
        })?;

        let email = contact
            .select(&self.mailto)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| href.strip_prefix("mailto:"))
            .map(|addr| addr.split('?').next().unwrap_or(addr).trim().to_string())
            .find(|addr| addr.contains('@'));

        let phone = contact
            .select(&self.tel)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| href.strip_prefix("tel:"))
            .map(|num| num.trim().to_string())
            .find(|num| !num.is_empty())
            .or_else(|| {
                let text = contact.text().collect::<Vec<_>>().join(" ");
                PHONE_RE.find(&text).map(|m| m.as_str().to_string())
            });

        let website = contact
            .select(&self.anchor)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| page_url.join(href).ok())
            .find(|url| {
                matches!(url.scheme(), "http" | "https") && url.host_str() != page_url.host_str()
            })
            .map(|url| url.to_string());

        Ok(MemberDetail {
            source_id: source_id.to_string(),
            email,
            phone,
            website,
        })
    }
}

fn compile(field: &str, selector: &str) -> JobResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| JobError::validation(field, format!("invalid CSS selector '{selector}': {e}")))
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

/// `.../ziad-aboultaif(89156)` → `89156`; otherwise the last path segment.
fn source_id_from_url(url: &Url) -> Option<String> {
    let path = url.path();
    if let Some(caps) = SOURCE_ID_RE.captures(path) {
        return Some(caps[1].to_string());
    }
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}
