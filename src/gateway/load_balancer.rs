//! Load balancer implementation with multiple strategies

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::registry::models::Service;

/// Load balancing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadBalancingStrategy {
    /// Round-robin distribution
    #[default]
    RoundRobin,
    /// Weighted round-robin based on instance weights
    WeightedRoundRobin,
    /// Random selection
    Random,
}

/// Selects which instance of a service handles the next request
///
/// Selection state is kept per service and is not persisted.
#[derive(Default)]
pub struct LoadBalancer {
    round_robin: DashMap<String, AtomicUsize>,
    weighted: DashMap<String, WeightedRoundRobinState>,
}

/// State for weighted round-robin algorithm
#[derive(Default)]
struct WeightedRoundRobinState {
    last_index: Option<usize>,
    current_weight: i64,
}

impl LoadBalancer {
    /// Create a new load balancer
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the index into `service.instances` of the instance to use next
    ///
    /// Disabled instances are never selected.
    pub fn select_instance(&self, name: &str, service: &Service) -> Result<usize> {
        let eligible: Vec<usize> = service
            .instances
            .iter()
            .enumerate()
            .filter(|(_, instance)| instance.enabled)
            .map(|(index, _)| index)
            .collect();

        if eligible.is_empty() {
            return Err(AppError::NoAvailableInstance(name.to_string()));
        }

        let strategy = service.strategy.unwrap_or_default();
        let selected = match strategy {
            LoadBalancingStrategy::RoundRobin => self.select_round_robin(name, &eligible),
            LoadBalancingStrategy::WeightedRoundRobin => {
                let weights: Vec<u32> = eligible
                    .iter()
                    .map(|&index| service.instances[index].weight)
                    .collect();
                self.select_weighted_round_robin(name, &eligible, &weights)
            }
            LoadBalancingStrategy::Random => select_random(&eligible),
        };

        debug!(
            service = %name,
            index = selected,
            url = %service.instances[selected].url,
            strategy = ?strategy,
            "Selected instance for request"
        );

        Ok(selected)
    }

    /// Round-robin selection
    fn select_round_robin(&self, name: &str, eligible: &[usize]) -> usize {
        let count = match self.round_robin.get(name) {
            Some(counter) => counter.fetch_add(1, Ordering::Relaxed),
            None => self
                .round_robin
                .entry(name.to_string())
                .or_default()
                .fetch_add(1, Ordering::Relaxed),
        };
        eligible[count % eligible.len()]
    }

    /// Weighted round-robin selection
    fn select_weighted_round_robin(
        &self,
        name: &str,
        eligible: &[usize],
        weights: &[u32],
    ) -> usize {
        if eligible.len() == 1 {
            return eligible[0];
        }

        // The entry guard serializes selections for this service
        let mut state = self.weighted.entry(name.to_string()).or_default();

        let weights: Vec<i64> = weights.iter().map(|&w| i64::from(w.max(1))).collect();
        let max_weight = weights.iter().copied().max().unwrap_or(1);
        let gcd = weights.iter().fold(0, |acc, &w| gcd(acc, w));

        loop {
            let index = match state.last_index {
                Some(last) => (last + 1) % eligible.len(),
                None => 0,
            };
            state.last_index = Some(index);

            if index == 0 {
                state.current_weight -= gcd;
                if state.current_weight <= 0 {
                    state.current_weight = max_weight;
                }
            }

            if weights[index] >= state.current_weight {
                return eligible[index];
            }
        }
    }
}

/// Random selection
fn select_random(eligible: &[usize]) -> usize {
    eligible[rand::thread_rng().gen_range(0..eligible.len())]
}

/// Calculate greatest common divisor
fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}
