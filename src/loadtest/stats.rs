use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointStats {
    pub requests: u64,
    pub failures: u64,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    #[serde(skip)]
    total_ms: f64,
}

impl EndpointStats {
    pub fn record(&mut self, latency: Duration, ok: bool) {
        let ms = latency.as_micros() as f64 / 1000.0;
        self.requests += 1;
        if !ok {
            self.failures += 1;
        }
        self.total_ms += ms;
        self.min_ms = Some(self.min_ms.map_or(ms, |m| m.min(ms)));
        self.max_ms = Some(self.max_ms.map_or(ms, |m| m.max(ms)));
    }

    pub fn mean_ms(&self) -> Option<f64> {
        (self.requests > 0).then(|| self.total_ms / self.requests as f64)
    }

    pub fn merge(&mut self, other: &EndpointStats) {
        self.requests += other.requests;
        self.failures += other.failures;
        self.total_ms += other.total_ms;
        self.min_ms = match (self.min_ms, other.min_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_ms = match (self.max_ms, other.max_ms) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Per-endpoint stats keyed by a request label such as `GET /games`.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    endpoints: BTreeMap<String, EndpointStats>,
}

#[derive(Debug, Serialize)]
pub struct EndpointReport<'a> {
    pub endpoint: &'a str,
    #[serde(flatten)]
    pub stats: &'a EndpointStats,
    pub mean_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LoadReport<'a> {
    pub total_requests: u64,
    pub total_failures: u64,
    pub endpoints: Vec<EndpointReport<'a>>,
}

impl LoadStats {
    pub fn record(&mut self, endpoint: &str, latency: Duration, ok: bool) {
        self.endpoints
            .entry(endpoint.to_string())
            .or_default()
            .record(latency, ok);
    }

    pub fn merge(&mut self, other: &LoadStats) {
        for (name, stats) in &other.endpoints {
            self.endpoints.entry(name.clone()).or_default().merge(stats);
        }
    }

    pub fn get(&self, endpoint: &str) -> Option<&EndpointStats> {
        self.endpoints.get(endpoint)
    }

    pub fn total_requests(&self) -> u64 {
        self.endpoints.values().map(|s| s.requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.endpoints.values().map(|s| s.failures).sum()
    }

    pub fn report(&self) -> LoadReport<'_> {
        LoadReport {
            total_requests: self.total_requests(),
            total_failures: self.total_failures(),
            endpoints: self
                .endpoints
                .iter()
                .map(|(endpoint, stats)| EndpointReport {
                    endpoint,
                    stats,
                    mean_ms: stats.mean_ms(),
                })
                .collect(),
        }
    }
}
