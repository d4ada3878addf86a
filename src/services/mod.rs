pub mod data_fetcher;
pub mod exporter;
pub mod game_results;
pub mod normalizer;
pub mod pipeline;
pub mod synchronizer;

pub use data_fetcher::NflverseFetcher;
pub use exporter::StaticExporter;
pub use pipeline::{SyncOptions, WeeklySync};
pub use synchronizer::WriteMode;
