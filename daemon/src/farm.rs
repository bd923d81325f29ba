use crate::metrics::{Labels, LogMetrics, MetricsSink};
use crate::registry::Registry;
use buildfarm_common::config::ScheduleConfig;
use std::fmt;
use std::sync::Arc;

/// Everything the scheduling operations need besides the database.
///
/// The schedule config is a snapshot, callers build a new `BuildFarm` (or
/// replace `schedule`) when the configuration changes.
#[derive(Clone)]
pub struct BuildFarm {
    pub registry: Registry,
    pub schedule: ScheduleConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl BuildFarm {
    pub fn new(registry: Registry, schedule: ScheduleConfig) -> BuildFarm {
        BuildFarm {
            registry,
            schedule,
            metrics: Arc::new(LogMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> BuildFarm {
        self.metrics = metrics;
        self
    }

    pub fn emit(&self, name: &str, labels: &Labels) {
        self.metrics.emit(name, labels);
    }
}

impl fmt::Debug for BuildFarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildFarm")
            .field("registry", &self.registry)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}
