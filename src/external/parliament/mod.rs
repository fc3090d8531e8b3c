//! House-of-Commons style roster and profile pages.

pub(crate) mod parser;
mod province;

pub use parser::PageParser;
pub use province::{normalize_province, province_for_code};
