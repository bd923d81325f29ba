use buildfarm_common::errors::*;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub type Labels = BTreeMap<String, String>;

/// Receiver of labelled scheduler events.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, name: &str, labels: &Labels);
}

/// Write metrics to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn emit(&self, name: &str, labels: &Labels) {
        let labels = labels
            .iter()
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect::<Vec<_>>();
        info!("metric {} {}", name, labels.join(" "));
    }
}

/// Keep emitted metrics in memory, useful to inspect what the scheduler reported.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<(String, Labels)>>,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<(String, Labels)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn named(&self, name: &str) -> Vec<Labels> {
        self.events()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, labels)| labels)
            .collect()
    }
}

impl MetricsSink for RecordingMetrics {
    fn emit(&self, name: &str, labels: &Labels) {
        if let Ok(mut events) = self.events.lock() {
            events.push((name.to_string(), labels.clone()));
        }
    }
}
