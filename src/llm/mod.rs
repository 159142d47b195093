pub mod assistant;
#[cfg(feature = "gemini")]
pub mod client;
pub mod extractor;
pub mod model;
pub mod narrative;
pub mod prompts;
pub mod retry;
pub mod risk;
pub mod sheet_locator;
pub mod types;

pub use assistant::*;
#[cfg(feature = "gemini")]
pub use client::*;
pub use extractor::MetricExtractor;
pub use model::*;
pub use narrative::*;
pub use risk::*;
pub use sheet_locator::*;
pub use types::*;
