//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! RFC 4938-style link metrics delivered by Zebra, the cost formulas that
//! turn them into an interface cost, and the adjust-values filter
//! (spec.md §4.F, §3 "Link metrics packet").

use serde::{Deserialize, Serialize};
use tracing::warn;

/// The raw metric values as carried on the wire from Zebra.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RawLinkMetrics {
    pub rlq: u8,
    pub resource: u8,
    pub latency: u16,
    pub current_datarate: u16,
    pub max_datarate: u16,
}

impl RawLinkMetrics {
    /// Clamps out-of-range percentages and promotes `max_datarate` up to
    /// `current_datarate` when Zebra reports a rate inversion (spec.md
    /// §4.F "adjust-values filter").
    pub fn adjust(mut self) -> Self {
        if self.resource > 100 {
            warn!(
                value = self.resource,
                "overriding invalid link metric resource value"
            );
            self.resource = 100;
        }
        if self.rlq > 100 {
            warn!(value = self.rlq, "overriding invalid link metric rlq value");
            self.rlq = 100;
        }
        if self.current_datarate > self.max_datarate {
            warn!(
                current = self.current_datarate,
                max = self.max_datarate,
                "overriding invalid link metric datarate values"
            );
            self.max_datarate = self.current_datarate;
        }
        self
    }
}

/// Which link up/down state Zebra last reported for a neighbor's physical
/// link (spec.md §4.F "link status UP/DOWN").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum LinkStatus {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum CostFormula {
    Cisco,
    NrlCable,
}

/// Per-formula relative weights (spec.md §4.F); the Cisco-guide defaults
/// match the original implementation's.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct CostWeights {
    pub throughput: u8,
    pub resources: u8,
    pub latency: u8,
    pub l2_factor: u8,
}

impl Default for CostWeights {
    fn default() -> CostWeights {
        CostWeights {
            throughput: 0,
            resources: 29,
            latency: 29,
            l2_factor: 29,
        }
    }
}

const NRL_MAX_COST: f64 = 1000.0;
const NRL_LAT_STEEPNESS: f64 = 0.0015;
const NRL_CDR_STEEPNESS: f64 = 0.0015;

/// Turns adjusted link metrics into an interface cost using the
/// configured formula. Any input term that is zero or missing is dropped
/// from the sum (matching the original's "zero means unavailable, not
/// zero cost" convention) rather than treated as a measured zero.
pub fn compute_cost(
    formula: CostFormula,
    weights: &CostWeights,
    metrics: &RawLinkMetrics,
    fallback_cost: u16,
) -> u16 {
    let cost = match formula {
        CostFormula::Cisco => cisco_cost(weights, metrics, fallback_cost),
        CostFormula::NrlCable => nrlcable_cost(weights, metrics),
    };

    if cost < 1.0 {
        1
    } else if cost > u16::MAX as f64 {
        u16::MAX
    } else {
        cost as u16
    }
}

fn cisco_cost(
    weights: &CostWeights,
    metrics: &RawLinkMetrics,
    fallback_cost: u16,
) -> f64 {
    let oc = if metrics.max_datarate != 0 {
        1e5 / metrics.max_datarate as f64
    } else {
        warn!("link metrics max_datarate is zero");
        fallback_cost as f64
    };

    let bw = if metrics.max_datarate != 0 && metrics.current_datarate != 0 {
        (65536.0
            * (100.0
                - (100.0 * metrics.current_datarate as f64
                    / metrics.max_datarate as f64))
            / 100.0)
            * (weights.throughput as f64 / 100.0)
    } else {
        warn!("link metrics max_datarate or current_datarate is zero");
        0.0
    };

    let res = if metrics.resource != 0 {
        ((100 - metrics.resource) as f64).powi(3) * 65536.0 / 1e6
            * (weights.resources as f64 / 100.0)
    } else {
        warn!("link metrics resource is zero");
        0.0
    };

    let lat = if metrics.latency != 0 {
        metrics.latency as f64 * (weights.latency as f64 / 100.0)
    } else {
        warn!("link metrics latency is zero");
        0.0
    };

    let l2 = if metrics.rlq != 0 {
        ((100 - metrics.rlq) as f64 * 65536.0 / 100.0)
            * (weights.l2_factor as f64 / 100.0)
    } else {
        warn!("link metrics rlq is zero");
        0.0
    };

    oc + bw + res + lat + l2
}

fn nrlcable_cost(weights: &CostWeights, metrics: &RawLinkMetrics) -> f64 {
    let cdr_cost = if metrics.current_datarate != 0 {
        NRL_MAX_COST
            * (-NRL_CDR_STEEPNESS * metrics.current_datarate as f64).exp()
            * (weights.throughput as f64 / 100.0)
    } else {
        warn!("link metrics current_datarate is zero");
        0.0
    };

    let lat_cost = if metrics.latency != 0 {
        NRL_MAX_COST
            * (1.0 - (-NRL_LAT_STEEPNESS * metrics.latency as f64).exp())
            * (weights.latency as f64 / 100.0)
    } else {
        warn!("link metrics latency is zero");
        0.0
    };

    cdr_cost + lat_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_clamps_out_of_range_percentages() {
        let m = RawLinkMetrics {
            rlq: 150,
            resource: 200,
            latency: 10,
            current_datarate: 10,
            max_datarate: 100,
        }
        .adjust();
        assert_eq!(m.rlq, 100);
        assert_eq!(m.resource, 100);
    }

    #[test]
    fn adjust_promotes_max_datarate_on_inversion() {
        let m = RawLinkMetrics {
            rlq: 0,
            resource: 0,
            latency: 0,
            current_datarate: 500,
            max_datarate: 100,
        }
        .adjust();
        assert_eq!(m.max_datarate, 500);
    }

    #[test]
    fn cisco_cost_falls_back_on_zero_datarate() {
        let metrics = RawLinkMetrics::default();
        let cost = compute_cost(
            CostFormula::Cisco,
            &CostWeights::default(),
            &metrics,
            10,
        );
        assert_eq!(cost, 10);
    }

    #[test]
    fn nrlcable_cost_increases_with_latency() {
        let weights = CostWeights::default();
        let low_latency = RawLinkMetrics {
            rlq: 100,
            resource: 0,
            latency: 10,
            current_datarate: 1000,
            max_datarate: 1000,
        };
        let high_latency = RawLinkMetrics {
            latency: 500,
            ..low_latency
        };
        let cost_low =
            compute_cost(CostFormula::NrlCable, &weights, &low_latency, 10);
        let cost_high =
            compute_cost(CostFormula::NrlCable, &weights, &high_latency, 10);
        assert!(cost_high > cost_low);
    }

    #[test]
    fn cost_is_never_reported_as_zero() {
        let metrics = RawLinkMetrics {
            rlq: 100,
            resource: 100,
            latency: 1,
            current_datarate: 1000,
            max_datarate: 1000,
        };
        let cost =
            compute_cost(CostFormula::Cisco, &CostWeights::default(), &metrics, 10);
        assert!(cost >= 1);
    }
}
