use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::config::PolicyKind;
use crate::discovery::SandboxSet;

/// Strategy for choosing one endpoint out of a non-empty snapshot.
///
/// Implementations must be safe to call from many tasks at once. The selector
/// only calls `pick` with a non-empty set and calls `release` once for every
/// endpoint `pick` returned, when the caller is done with it.
pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn pick(&self, set: &SandboxSet) -> Option<String>;

    fn release(&self, _endpoint: &str) {}
}

pub fn policy_for(kind: PolicyKind) -> Box<dyn SelectionPolicy> {
    match kind {
        PolicyKind::Random => Box::new(RandomPolicy),
        PolicyKind::RoundRobin => Box::new(RoundRobinPolicy::default()),
        PolicyKind::LeastOutstanding => Box::new(LeastOutstandingPolicy::default()),
    }
}

/// Uniform random choice.
#[derive(Debug, Default)]
pub struct RandomPolicy;

impl SelectionPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn pick(&self, set: &SandboxSet) -> Option<String> {
        let endpoints = set.endpoints();
        if endpoints.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..endpoints.len());
        Some(endpoints[index].clone())
    }
}

/// Cycles through the sorted endpoint list.
///
/// The cursor is shared across snapshots, so a membership change shifts the
/// rotation but never breaks it.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    cursor: AtomicUsize,
}

impl SelectionPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn pick(&self, set: &SandboxSet) -> Option<String> {
        let endpoints = set.endpoints();
        if endpoints.is_empty() {
            return None;
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(endpoints[n % endpoints.len()].clone())
    }
}

/// Picks the endpoint with the fewest dispatches currently in flight from
/// this process. Ties go to the first endpoint in sorted order.
#[derive(Debug, Default)]
pub struct LeastOutstandingPolicy {
    in_flight: Mutex<HashMap<String, usize>>,
}

impl LeastOutstandingPolicy {
    pub fn outstanding(&self, endpoint: &str) -> usize {
        self.in_flight
            .lock()
            .map(|m| m.get(endpoint).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl SelectionPolicy for LeastOutstandingPolicy {
    fn name(&self) -> &'static str {
        "least_outstanding"
    }

    fn pick(&self, set: &SandboxSet) -> Option<String> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        let chosen = set
            .endpoints()
            .iter()
            .min_by_key(|e| in_flight.get(e.as_str()).copied().unwrap_or(0))?
            .clone();

        *in_flight.entry(chosen.clone()).or_insert(0) += 1;
        Some(chosen)
    }

    fn release(&self, endpoint: &str) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = in_flight.get_mut(endpoint) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_flight.remove(endpoint);
            }
        }
    }
}
