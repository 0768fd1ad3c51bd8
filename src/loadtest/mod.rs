//! Load generator for the game catalogue HTTP API.
//!
//! Each virtual user runs as its own tokio task, picks tasks uniformly at
//! random and sleeps a random wait between them. Users keep their own
//! statistics; they are merged once every user has stopped.

pub mod stats;
pub mod user;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::util::env::{env_opt, env_parse};
pub use stats::{EndpointStats, LoadStats};
pub use user::{Task, UserState, VirtualUser};

pub const DEFAULT_HOST: &str = "http://localhost:5000";

#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    pub host: String,
    pub users: usize,
    pub duration: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
    /// Fixed seed for reproducible task sequences; user `n` uses `seed + n`.
    pub seed: Option<u64>,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            users: 10,
            duration: Duration::from_secs(60),
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(5),
            seed: None,
        }
    }
}

impl LoadTestConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: env_opt("LOADTEST_HOST").unwrap_or(d.host),
            users: env_parse("LOADTEST_USERS", d.users),
            ..d
        }
    }

    fn rng_for(&self, user: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(user as u64)),
            None => StdRng::from_entropy(),
        }
    }
}

async fn drive(mut user: VirtualUser, cfg: LoadTestConfig, deadline: Instant) -> LoadStats {
    while Instant::now() < deadline {
        let task = user.next_task();
        user.run_task(task).await;
        let wait = user.pick_wait(cfg.min_wait, cfg.max_wait);
        tokio::time::sleep_until((Instant::now() + wait).min(deadline)).await;
    }
    user.on_stop().await;
    user.into_stats()
}

/// Run the load test to completion and return the merged statistics.
pub async fn run_load_test(cfg: &LoadTestConfig) -> Result<LoadStats> {
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;
    let deadline = Instant::now() + cfg.duration;
    info!(
        host = %cfg.host,
        users = cfg.users,
        duration_secs = cfg.duration.as_secs(),
        "starting load test"
    );

    let mut handles = Vec::with_capacity(cfg.users);
    for n in 0..cfg.users {
        let user = VirtualUser::new(n, client.clone(), &cfg.host, cfg.rng_for(n));
        handles.push(tokio::spawn(drive(user, cfg.clone(), deadline)));
    }

    let mut merged = LoadStats::default();
    for (n, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(stats) => merged.merge(&stats),
            Err(e) => warn!(user = n, error = %e, "virtual user task aborted"),
        }
    }
    info!(
        requests = merged.total_requests(),
        failures = merged.total_failures(),
        "load test finished"
    );
    Ok(merged)
}
