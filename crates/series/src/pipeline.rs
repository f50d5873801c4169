//! Ordered chain of named `Series -> Series` transforms.
//!
//! Replaces dataframe `.pipe(...)` chains: each step is a named pure
//! function, independently unit-testable, composed by plain application.

use tracing::{debug, error};

use epiwatch_core::Series;

use crate::error::SeriesError;

type StepFn = Box<dyn Fn(Series) -> Result<Series, SeriesError> + Send + Sync>;

/// An ordered list of named transforms applied in sequence.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<(String, StepFn)>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a named step.
    pub fn step<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Series) -> Result<Series, SeriesError> + Send + Sync + 'static,
    {
        self.steps.push((name.into(), Box::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order, stopping at the first failure.
    pub fn apply(&self, mut series: Series) -> Result<Series, SeriesError> {
        for (name, step) in &self.steps {
            let location = series.location.clone();
            debug!(step = %name, location = %location, "applying transform");
            series = step(series).map_err(|e| {
                error!(step = %name, location = %location, error = %e, "transform failed");
                e
            })?;
        }
        Ok(series)
    }
}
