use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::stats::LoadStats;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    GetGames,
    PostSales,
    DeleteSales,
    AddReview,
    DeleteReview,
    GetReviews,
}

impl Task {
    pub const ALL: [Task; 6] = [
        Task::GetGames,
        Task::PostSales,
        Task::DeleteSales,
        Task::AddReview,
        Task::DeleteReview,
        Task::GetReviews,
    ];

    pub fn pick(rng: &mut StdRng) -> Task {
        Task::ALL[rng.gen_range(0..Task::ALL.len())]
    }
}

/// Lowercase alphanumeric suffix used to keep test game names unique.
pub fn unique_suffix(rng: &mut StdRng) -> String {
    (0..8)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Ids this user created and has not deleted yet.
#[derive(Debug, Default)]
pub struct UserState {
    pub sale_ids: Vec<i64>,
    pub review_ids: BTreeMap<i64, Vec<i64>>,
}

impl UserState {
    pub fn add_sale(&mut self, id: i64) {
        self.sale_ids.push(id);
    }

    pub fn add_review(&mut self, sale_id: i64, review_id: i64) {
        self.review_ids.entry(sale_id).or_default().push(review_id);
    }

    pub fn take_oldest_sale(&mut self) -> Option<i64> {
        if self.sale_ids.is_empty() {
            None
        } else {
            Some(self.sale_ids.remove(0))
        }
    }

    pub fn random_sale(&self, rng: &mut StdRng) -> Option<i64> {
        self.sale_ids.choose(rng).copied()
    }

    /// Forget a deleted sale's reviews and return them for cleanup.
    pub fn drop_reviews_of(&mut self, sale_id: i64) -> Vec<i64> {
        self.review_ids.remove(&sale_id).unwrap_or_default()
    }

    /// Pop the first review of a random sale that has any.
    pub fn take_random_review(&mut self, rng: &mut StdRng) -> Option<(i64, i64)> {
        let sale_ids: Vec<i64> = self.review_ids.keys().copied().collect();
        let sale_id = *sale_ids.choose(rng)?;
        let reviews = self.review_ids.get_mut(&sale_id)?;
        let review_id = if reviews.is_empty() {
            None
        } else {
            Some(reviews.remove(0))
        };
        if reviews.is_empty() {
            self.review_ids.remove(&sale_id);
        }
        review_id.map(|r| (sale_id, r))
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: Option<i64>,
}

pub struct VirtualUser {
    pub id: usize,
    client: Client,
    host: String,
    rng: StdRng,
    state: UserState,
    stats: LoadStats,
}

impl VirtualUser {
    pub fn new(id: usize, client: Client, host: &str, rng: StdRng) -> Self {
        Self {
            id,
            client,
            host: host.trim_end_matches('/').to_string(),
            rng,
            state: UserState::default(),
            stats: LoadStats::default(),
        }
    }

    pub fn into_stats(self) -> LoadStats {
        self.stats
    }

    pub fn pick_wait(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let ms = self
            .rng
            .gen_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(ms)
    }

    pub fn next_task(&mut self) -> Task {
        Task::pick(&mut self.rng)
    }

    pub async fn run_task(&mut self, task: Task) {
        match task {
            Task::GetGames => self.get_games().await,
            Task::PostSales => self.post_sales().await,
            Task::DeleteSales => self.delete_sales().await,
            Task::AddReview => {
                if let Some(sale_id) = self.state.random_sale(&mut self.rng) {
                    self.add_review_for_game(sale_id).await;
                }
            }
            Task::DeleteReview => self.delete_review().await,
            Task::GetReviews => self.get_reviews().await,
        }
    }

    /// Send one request, time it and record success per `accept`. Returns the
    /// response only when it was accepted.
    async fn call(
        &mut self,
        label: &str,
        req: reqwest::RequestBuilder,
        accept: fn(StatusCode) -> bool,
    ) -> Option<reqwest::Response> {
        let started = Instant::now();
        match req.send().await {
            Ok(resp) => {
                let ok = accept(resp.status());
                self.stats.record(label, started.elapsed(), ok);
                if ok {
                    Some(resp)
                } else {
                    debug!(user = self.id, endpoint = label, status = %resp.status(), "unexpected status");
                    None
                }
            }
            Err(e) => {
                self.stats.record(label, started.elapsed(), false);
                debug!(user = self.id, endpoint = label, error = %e, "request failed");
                None
            }
        }
    }

    async fn created_id(resp: reqwest::Response) -> Option<i64> {
        resp.json::<Created>().await.ok().and_then(|c| c.id)
    }

    async fn get_games(&mut self) {
        let req = self.client.get(format!("{}/games", self.host));
        self.call("GET /games", req, |s| s == StatusCode::OK).await;
    }

    async fn post_sales(&mut self) {
        let suffix = unique_suffix(&mut self.rng);
        let body = json!({
            "rank": 1,
            "name": format!("Test Game {suffix}"),
            "year": 2022,
            "genre": "Action",
            "publisher": "Test Publisher",
            "na_sales": 0.1,
            "eu_sales": 0.1,
            "jp_sales": 0.1,
            "other_sales": 0.1,
            "global_sales": 0.4
        });
        let req = self.client.post(format!("{}/sales", self.host)).json(&body);
        let Some(resp) = self.call("POST /sales", req, |s| s == StatusCode::CREATED).await else {
            return;
        };
        if let Some(sale_id) = Self::created_id(resp).await {
            self.state.add_sale(sale_id);
            self.add_review_for_game(sale_id).await;
        }
    }

    async fn add_review_for_game(&mut self, sale_id: i64) {
        let body = json!({
            "app_id": sale_id,
            "review_text": "This is a test review.",
            "review_score": 1
        });
        let req = self.client.post(format!("{}/reviews", self.host)).json(&body);
        match self.call("POST /reviews", req, |s| s == StatusCode::CREATED).await {
            Some(resp) => {
                if let Some(review_id) = Self::created_id(resp).await {
                    self.state.add_review(sale_id, review_id);
                }
            }
            None => error!(user = self.id, sale_id, "failed to add review"),
        }
    }

    async fn delete_sales(&mut self) {
        let Some(sale_id) = self.state.take_oldest_sale() else {
            return;
        };
        let req = self.client.delete(format!("{}/sales/{sale_id}", self.host));
        if self
            .call("DELETE /sales/{id}", req, |s| s == StatusCode::OK)
            .await
            .is_some()
        {
            for review_id in self.state.drop_reviews_of(sale_id) {
                self.delete_quietly(&format!("/reviews/{review_id}")).await;
            }
        }
    }

    async fn delete_review(&mut self) {
        let Some((_, review_id)) = self.state.take_random_review(&mut self.rng) else {
            return;
        };
        let req = self
            .client
            .delete(format!("{}/reviews/{review_id}", self.host));
        self.call("DELETE /reviews/{id}", req, |s| s == StatusCode::OK)
            .await;
    }

    async fn get_reviews(&mut self) {
        let Some(sale_id) = self.state.random_sale(&mut self.rng) else {
            return;
        };
        let req = self.client.get(format!("{}/reviews/{sale_id}", self.host));
        self.call("GET /reviews/{sale_id}", req, |s| {
            s == StatusCode::OK || s == StatusCode::NOT_FOUND
        })
        .await;
    }

    /// Cleanup request; outcome is not part of the stats.
    async fn delete_quietly(&self, path: &str) {
        if let Err(e) = self
            .client
            .delete(format!("{}{path}", self.host))
            .send()
            .await
        {
            debug!(user = self.id, path, error = %e, "cleanup delete failed");
        }
    }

    /// Delete everything this user still owns.
    pub async fn on_stop(&mut self) {
        let sales = std::mem::take(&mut self.state.sale_ids);
        for sale_id in sales {
            self.delete_quietly(&format!("/sales/{sale_id}")).await;
        }
        let reviews = std::mem::take(&mut self.state.review_ids);
        for review_id in reviews.into_values().flatten() {
            self.delete_quietly(&format!("/reviews/{review_id}")).await;
        }
    }
}
