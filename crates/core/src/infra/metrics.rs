use serde::Serialize;
use std::sync::Mutex;

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    jobs_created: u64,
    jobs_finished: u64,
    jobs_errored: u64,
    jobs_cancelled: u64,
    probes_succeeded: u64,
    probes_failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: String,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー（API に返す用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub jobs_created: u64,
    pub jobs_finished: u64,
    pub jobs_errored: u64,
    pub jobs_cancelled: u64,
    pub probes_succeeded: u64,
    pub probes_failed: u64,
    pub avg_latency_ms: AvgLatency,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvgLatency {
    pub probe: Option<f64>,
    pub download: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn inc_jobs_created(&self) {
        self.counters.lock().unwrap().jobs_created += 1;
    }

    pub fn inc_jobs_finished(&self) {
        self.counters.lock().unwrap().jobs_finished += 1;
    }

    pub fn inc_jobs_errored(&self) {
        self.counters.lock().unwrap().jobs_errored += 1;
    }

    pub fn inc_jobs_cancelled(&self) {
        self.counters.lock().unwrap().jobs_cancelled += 1;
    }

    pub fn inc_probes_succeeded(&self) {
        self.counters.lock().unwrap().probes_succeeded += 1;
    }

    pub fn inc_probes_failed(&self) {
        self.counters.lock().unwrap().probes_failed += 1;
    }

    pub fn record_latency(&self, phase: &str, duration_ms: u64) {
        let record = LatencyRecord {
            phase: phase.to_string(),
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock().unwrap();
        latencies.push(record);
        // 最新1000件のみ保持
        if latencies.len() > 1000 {
            let excess = latencies.len() - 1000;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters.lock().unwrap();
        let latencies = self.latencies.lock().unwrap();

        let avg = |phase: &str| -> Option<f64> {
            let vals: Vec<f64> = latencies
                .iter()
                .filter(|r| r.phase == phase)
                .map(|r| r.duration_ms as f64)
                .collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        };

        let recent: Vec<LatencyRecord> = latencies.iter().rev().take(20).cloned().collect();

        MetricsSummary {
            jobs_created: c.jobs_created,
            jobs_finished: c.jobs_finished,
            jobs_errored: c.jobs_errored,
            jobs_cancelled: c.jobs_cancelled,
            probes_succeeded: c.probes_succeeded,
            probes_failed: c.probes_failed,
            avg_latency_ms: AvgLatency {
                probe: avg("probe"),
                download: avg("download"),
            },
            recent_latencies: recent,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let m = Metrics::new();
        m.inc_jobs_created();
        m.inc_jobs_created();
        m.inc_jobs_finished();
        m.inc_jobs_cancelled();
        m.inc_probes_failed();

        let s = m.summary();
        assert_eq!(s.jobs_created, 2);
        assert_eq!(s.jobs_finished, 1);
        assert_eq!(s.jobs_cancelled, 1);
        assert_eq!(s.jobs_errored, 0);
        assert_eq!(s.probes_failed, 1);
    }

    #[test]
    fn test_latency_recording() {
        let m = Metrics::new();
        m.record_latency("probe", 120);
        m.record_latency("probe", 80);
        m.record_latency("download", 2000);

        let s = m.summary();
        assert!((s.avg_latency_ms.probe.unwrap() - 100.0).abs() < f64::EPSILON);
        assert!((s.avg_latency_ms.download.unwrap() - 2000.0).abs() < f64::EPSILON);
        assert_eq!(s.recent_latencies.len(), 3);
    }

    #[test]
    fn test_latency_cap() {
        let m = Metrics::new();
        for i in 0..1100 {
            m.record_latency("download", i);
        }
        let latencies = m.latencies.lock().unwrap();
        assert_eq!(latencies.len(), 1000);
    }
}
