//! # Scaler Implementations
//!
//! One module per trigger backend. Each implementation binds its typed
//! metadata through the declarative binder, names its metric after the
//! backend resource it reads, and is registered with the factory under the
//! `TRIGGER_TYPE` tag it exports.

pub mod cloudwatch;
pub mod cron;
pub mod metrics_api;
pub mod prometheus;
pub mod queue;
