//! The live queue: ordering and admission control.

use chrono::{DateTime, Utc};

use super::ids::RequestId;
use super::priority::Priority;
use super::request::QueuedRequest;

/// Ordered sequence of all live requests.
///
/// Order: priority (high → low), then `enqueued_at` ascending. Sorting is
/// stable, so requests with identical timestamps keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueState {
    requests: Vec<QueuedRequest>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_requests(requests: Vec<QueuedRequest>) -> Self {
        let mut state = Self { requests };
        state.sort();
        state
    }

    pub fn sort(&mut self) {
        self.requests.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(a.enqueued_at.cmp(&b.enqueued_at))
        });
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn get_mut(&mut self, id: &RequestId) -> Option<&mut QueuedRequest> {
        self.requests.iter_mut().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.iter().any(|r| &r.id == id)
    }

    pub fn to_vec(&self) -> Vec<QueuedRequest> {
        self.requests.clone()
    }

    /// Append and re-sort.
    pub fn push(&mut self, request: QueuedRequest) {
        self.requests.push(request);
        self.sort();
    }

    pub fn remove(&mut self, id: &RequestId) -> Option<QueuedRequest> {
        let index = self.requests.iter().position(|r| &r.id == id)?;
        Some(self.requests.remove(index))
    }

    pub fn clear(&mut self) -> usize {
        let n = self.requests.len();
        self.requests.clear();
        n
    }

    pub fn oldest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.requests.iter().map(|r| r.enqueued_at).min()
    }

    /// Make room for one more request under `max_size`.
    ///
    /// Evicts the oldest `low` request first; if there is none, the oldest
    /// request of any priority. Returns what was evicted (oldest first).
    pub fn admit(&mut self, max_size: usize) -> Vec<QueuedRequest> {
        let mut evicted = Vec::new();
        while !self.requests.is_empty() && self.requests.len() >= max_size {
            if let Some(victim) = self.evict_one() {
                evicted.push(victim);
            }
        }
        evicted
    }

    /// Trim down to `max_size` using the same eviction order as [`admit`](Self::admit).
    pub fn shrink_to(&mut self, max_size: usize) -> Vec<QueuedRequest> {
        let mut evicted = Vec::new();
        while self.requests.len() > max_size {
            if let Some(victim) = self.evict_one() {
                evicted.push(victim);
            }
        }
        evicted
    }

    fn evict_one(&mut self) -> Option<QueuedRequest> {
        let oldest_low = self
            .requests
            .iter()
            .enumerate()
            .filter(|(_, r)| r.priority == Priority::Low)
            .min_by_key(|(_, r)| r.enqueued_at)
            .map(|(i, _)| i);

        let index = oldest_low.or_else(|| {
            self.requests
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.enqueued_at)
                .map(|(i, _)| i)
        })?;

        Some(self.requests.remove(index))
    }
}
