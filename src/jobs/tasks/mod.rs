mod detail_scrape;
mod list_scrape;
pub mod sequencing;

pub use detail_scrape::DetailScrapeTask;
pub use list_scrape::ListScrapeTask;
pub use sequencing::{PipelineStage, RECURRING_LIST_KEY, SequencingCoordinator, SequencingReport};
