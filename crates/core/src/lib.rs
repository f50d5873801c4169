pub mod adapter;
pub mod config;
pub mod model;

pub use adapter::{Adapter, DomainSpec, FetchError, RollingSpec, SourceSpec};
pub use config::Config;
pub use model::{Cadence, MetricValue, ModelError, Observation, Series};
