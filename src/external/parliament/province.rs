//! Province and territory normalization.
//!
//! Rosters and boundary files identify provinces by Statistics Canada SGC
//! code (`"35"`), postal abbreviation (`"ON"`) or name. Everything stored in
//! the canonical store uses the English name.

/// (SGC code, postal abbreviation, English name)
const PROVINCES: &[(&str, &str, &str)] = &[
    ("10", "NL", "Newfoundland and Labrador"),
    ("11", "PE", "Prince Edward Island"),
    ("12", "NS", "Nova Scotia"),
    ("13", "NB", "New Brunswick"),
    ("24", "QC", "Quebec"),
    ("35", "ON", "Ontario"),
    ("46", "MB", "Manitoba"),
    ("47", "SK", "Saskatchewan"),
    ("48", "AB", "Alberta"),
    ("59", "BC", "British Columbia"),
    ("60", "YT", "Yukon"),
    ("61", "NT", "Northwest Territories"),
    ("62", "NU", "Nunavut"),
];

/// Canonical name for a code, abbreviation or name; `None` when unrecognised.
pub fn normalize_province(raw: &str) -> Option<&'static str> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    let folded = value.replace('é', "e").to_lowercase();
    PROVINCES
        .iter()
        .find(|(code, abbrev, name)| {
            *code == value || abbrev.eq_ignore_ascii_case(value) || name.to_lowercase() == folded
        })
        .map(|(_, _, name)| *name)
}

pub fn province_for_code(code: &str) -> Option<&'static str> {
    PROVINCES
        .iter()
        .find(|(c, _, _)| *c == code.trim())
        .map(|(_, _, name)| *name)
}
