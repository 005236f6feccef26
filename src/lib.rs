//! # Order Pipeline
//!
//! Order commands accepted over HTTP, published to a partitioned Apache Iggy
//! topic and consumed by a consumer-group worker with at-least-once delivery.
//!
//! ## Architecture
//!
//! ```text
//!   POST /api/v1/order                         order-worker
//!          │                                        ▲
//!          ▼                                        │
//! ┌─────────────────┐                     ┌──────────────────┐
//! │  OrderService   │                     │  ProcessingLoop  │
//! │ validate, stamp │                     │ decode, process, │
//! │ encode          │                     │ commit           │
//! └────────┬────────┘                     └────────┬─────────┘
//!          ▼                                        ▲
//! ┌─────────────────┐                     ┌──────────────────┐
//! │ IggyLogWriter   │                     │  IggyLogReader   │
//! │ envelope +      │                     │ consumer group,  │
//! │ balancer        │                     │ fetch bounds     │
//! └────────┬────────┘                     └────────┬─────────┘
//!          │        ┌──────────────────────┐       │
//!          └───────►│ stream / topic with  │───────┘
//!                   │ N partitions (Iggy)  │
//!                   └──────────────────────┘
//! ```
//!
//! Both clients sit behind the [`LogWriter`] and [`LogReader`] traits;
//! [`log_client::MemoryLog`] implements them in-process for tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use order_pipeline::{AppState, Config, build_router};
//! use order_pipeline::log_client::IggyLogWriter;
//!
//! # async fn start() -> order_pipeline::AppResult<()> {
//! let config = Config::from_env()?;
//! let writer = IggyLogWriter::connect(config.writer_config()).await?;
//! let app = build_router(AppState::new(Arc::new(writer), config));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod log_client;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use log_client::{LogReader, LogWriter, Record};
pub use routes::build_router;
pub use services::{CommandProcessor, LoggingProcessor, OrderService, ProcessingLoop};
pub use state::AppState;
