//! Observability utilities.

mod tracing;

pub use self::tracing::{init_tracing, SpanTimer, Verbosity, LOG_ENV_VAR};
