//! `postforge-publish` — the delivery pipeline: scanning due items,
//! publishing them to connected channels, and driving the retry budget.

pub mod history;
pub mod pipeline;
pub mod publisher;
pub mod scanner;

pub use history::PublishHistory;
pub use pipeline::{ItemOutcome, PipelineError, PublishPipeline};
pub use publisher::{ChannelPublisher, PublishError, PublishReceipt, ScriptedPublisher};
pub use scanner::{PublishScanner, ScanOutcome, ScanStats, SCAN_BATCH_LIMIT, SCAN_INTERVAL};
