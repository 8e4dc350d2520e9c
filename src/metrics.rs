use std::collections::VecDeque;
use std::sync::Mutex;

const RING_CAPACITY: usize = 500;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Sample {
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Append-only ring buffer performance monitor, per spec.md §9's "explicit
/// singletons, each guarded by its own mutual-exclusion primitive" design
/// note. Oldest samples are dropped once `RING_CAPACITY` is exceeded.
pub struct PerformanceMonitor {
    samples: Mutex<VecDeque<Sample>>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
        }
    }
}

impl PerformanceMonitor {
    pub fn record(&self, operation: &str, duration: std::time::Duration, success: bool) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() >= RING_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(Sample {
            operation: operation.to_string(),
            duration_ms: duration.as_millis() as u64,
            success,
            at: chrono::Utc::now(),
        });
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let monitor = PerformanceMonitor::default();
        for i in 0..(RING_CAPACITY + 10) {
            monitor.record(&format!("op-{i}"), std::time::Duration::from_millis(1), true);
        }
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), RING_CAPACITY);
        assert_eq!(snapshot[0].operation, "op-10");
    }
}
