mod ingest;
mod processor;

pub use ingest::{MonotonicClock, OrderService};
pub use processor::{
    CommandProcessor, LoggingProcessor, LoopOptions, LoopStats, ProcessingLoop, RecordMeta,
};
