pub mod service;

pub use service::{HistoryFilter, IngestOutcome, StoredReading, TelemetryService};
