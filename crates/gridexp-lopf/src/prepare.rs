//! Network adjustments applied once before the expansion loop.

use crate::error::LopfError;
use gridexp_core::{Generator, Network, Snapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info};

/// Hours in a non-leap year; `nhours` spreads them over the requested hours.
const HOURS_PER_YEAR: f64 = 8760.0;

/// Capacity of the synthetic load-shedding generators (MW).
const LOAD_SHEDDING_P_NOM: f64 = 1e6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareOptions {
    /// Availability and inflow values at or below this become zero
    pub clip_p_max_pu: Option<f64>,
    pub load_shedding: bool,
    /// Marginal cost of shed load
    pub load_shedding_cost: f64,
    /// Perturb marginal costs slightly to break ties between identical units
    pub noisy_costs: bool,
    pub noise_seed: Option<u64>,
    /// Shedding generators may not dispatch in the final snapshot
    pub no_shedding_last_snapshot: bool,
    /// Keep only the first `n` snapshots and weight each with `8760 / n`
    pub nhours: Option<usize>,
    /// Merge adjacent snapshots into this many segments of similar profile
    pub segments: Option<usize>,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            clip_p_max_pu: None,
            load_shedding: false,
            load_shedding_cost: 1e5,
            noisy_costs: false,
            noise_seed: None,
            no_shedding_last_snapshot: false,
            nhours: None,
            segments: None,
        }
    }
}

pub fn prepare_network(network: &mut Network, options: &PrepareOptions) -> Result<(), LopfError> {
    if options.nhours == Some(0) {
        return Err(LopfError::Config("nhours must be at least 1".into()));
    }
    if options.segments == Some(0) {
        return Err(LopfError::Config("segments must be at least 1".into()));
    }
    if options.no_shedding_last_snapshot && !options.load_shedding {
        return Err(LopfError::Config(
            "no_shedding_last_snapshot requires load_shedding".into(),
        ));
    }

    if let Some(threshold) = options.clip_p_max_pu {
        clip_availability(network, threshold);
    }

    let mut shedding = 0..0;
    if options.load_shedding {
        let first = network.generators.len();
        let added = add_load_shedding(network, options.load_shedding_cost);
        shedding = first..first + added;
        info!(generators = added, cost = options.load_shedding_cost, "added load shedding");
    }

    if options.noisy_costs {
        let mut rng = match options.noise_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut noise = || 1e-2 + 2e-3 * (rng.gen::<f64>() - 0.5);
        for gen in &mut network.generators {
            gen.marginal_cost += noise();
        }
        for su in &mut network.storage_units {
            su.marginal_cost += noise();
        }
        for link in &mut network.links {
            link.marginal_cost += noise();
        }
    }

    if let Some(n) = options.nhours {
        network.truncate_snapshots(n);
        let weighting = HOURS_PER_YEAR / n as f64;
        for snapshot in &mut network.snapshots {
            snapshot.weighting = weighting;
        }
        info!(snapshots = network.snapshots.len(), weighting, "reduced snapshots");
    }

    if let Some(target) = options.segments {
        segment_snapshots(network, target)?;
    }

    if options.no_shedding_last_snapshot {
        let n_t = network.snapshots.len();
        for gen in &mut network.generators[shedding] {
            let mut availability = vec![1.0; n_t];
            if let Some(last) = availability.last_mut() {
                *last = 0.0;
            }
            gen.p_max_pu_t = Some(availability);
        }
    }
    Ok(())
}

fn clip_availability(network: &mut Network, threshold: f64) {
    let clip = |v: &mut f64| {
        if *v <= threshold {
            *v = 0.0;
        }
    };
    for gen in &mut network.generators {
        if let Some(series) = gen.p_max_pu_t.as_mut() {
            series.iter_mut().for_each(clip);
        }
    }
    for su in &mut network.storage_units {
        if let Some(series) = su.inflow.as_mut() {
            series.iter_mut().for_each(clip);
        }
    }
}

fn add_load_shedding(network: &mut Network, cost: f64) -> usize {
    let shedding: Vec<Generator> = network
        .buses
        .iter()
        .map(|bus| {
            Generator::new(format!("{} load", bus.name), bus.name.clone(), "load")
                .with_p_nom(LOAD_SHEDDING_P_NOM)
                .with_marginal_cost(cost)
        })
        .collect();
    let added = shedding.len();
    network.generators.extend(shedding);
    added
}

/// Aggregate the snapshots into `target` contiguous segments.
///
/// Starts from one segment per snapshot and repeatedly merges the adjacent
/// pair whose combination adds the least squared deviation (Ward's
/// criterion) over the availability, load and inflow profiles, each scaled
/// by its column maximum. A segment is weighted with the sum of its member
/// weightings, keeps the timestamp of its first member and carries the
/// weighted mean of every input series. Result series are cleared.
fn segment_snapshots(network: &mut Network, target: usize) -> Result<(), LopfError> {
    let n_t = network.snapshots.len();
    if target >= n_t {
        debug!(snapshots = n_t, target, "segmentation leaves snapshots unchanged");
        return Ok(());
    }
    network.validate_references()?;

    let weights: Vec<f64> = network.snapshots.iter().map(|s| s.weighting).collect();
    let ranges = merge_segments(&profile_columns(network), &weights, target);

    let snapshots: Vec<Snapshot> = ranges
        .iter()
        .map(|r| Snapshot {
            timestamp: network.snapshots[r.start].timestamp,
            weighting: weights[r.clone()].iter().sum(),
        })
        .collect();
    let means = |series: &[f64]| segment_means(series, &weights, &ranges);
    let p_max_pu: Vec<Option<Vec<f64>>> = network
        .generators
        .iter()
        .map(|g| g.p_max_pu_t.as_deref().map(&means))
        .collect();
    let p_set: Vec<Vec<f64>> = network.loads.iter().map(|l| means(&l.p_set)).collect();
    let inflow: Vec<Option<Vec<f64>>> = network
        .storage_units
        .iter()
        .map(|su| su.inflow.as_deref().map(&means))
        .collect();

    network.truncate_snapshots(0);
    network.set_snapshots(snapshots);
    for (gen, series) in network.generators.iter_mut().zip(p_max_pu) {
        gen.p_max_pu_t = series;
    }
    for (load, series) in network.loads.iter_mut().zip(p_set) {
        load.p_set = series;
    }
    for (su, series) in network.storage_units.iter_mut().zip(inflow) {
        su.inflow = series;
    }
    info!(snapshots = n_t, segments = ranges.len(), "aggregated time series");
    Ok(())
}

/// Input series of length `n_t`, each divided by its maximum.
fn profile_columns(network: &Network) -> Vec<Vec<f64>> {
    let n_t = network.snapshots.len();
    let availability = network.generators.iter().filter_map(|g| g.p_max_pu_t.as_deref());
    let loads = network.loads.iter().map(|l| l.p_set.as_slice());
    let inflows = network.storage_units.iter().filter_map(|su| su.inflow.as_deref());
    availability
        .chain(loads)
        .chain(inflows)
        .filter(|series| series.len() == n_t)
        .map(|series| {
            let max = series.iter().copied().fold(0.0, f64::max);
            let scale = if max > 0.0 { max } else { 1.0 };
            series.iter().map(|v| v / scale).collect()
        })
        .collect()
}

struct Segment {
    start: usize,
    end: usize,
    weight: f64,
    centroid: Vec<f64>,
}

impl Segment {
    fn absorb(&mut self, other: Segment) {
        let total = self.weight + other.weight;
        let (a, b) = if total > 0.0 {
            (self.weight / total, other.weight / total)
        } else {
            (0.5, 0.5)
        };
        for (mine, theirs) in self.centroid.iter_mut().zip(&other.centroid) {
            *mine = a * *mine + b * theirs;
        }
        self.end = other.end;
        self.weight = total;
    }
}

fn merge_cost(left: &Segment, right: &Segment) -> f64 {
    let distance: f64 = left
        .centroid
        .iter()
        .zip(&right.centroid)
        .map(|(a, b)| (a - b).powi(2))
        .sum();
    let total = left.weight + right.weight;
    if total > 0.0 {
        left.weight * right.weight / total * distance
    } else {
        distance
    }
}

/// Contiguous snapshot ranges after merging down to `target` segments.
fn merge_segments(columns: &[Vec<f64>], weights: &[f64], target: usize) -> Vec<Range<usize>> {
    let mut segments: Vec<Segment> = weights
        .iter()
        .enumerate()
        .map(|(t, &weight)| Segment {
            start: t,
            end: t + 1,
            weight,
            centroid: columns.iter().map(|c| c[t]).collect(),
        })
        .collect();
    let mut costs: Vec<f64> = segments
        .windows(2)
        .map(|pair| merge_cost(&pair[0], &pair[1]))
        .collect();

    while segments.len() > target.max(1) {
        // earliest pair wins ties
        let Some(i) = costs
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
        else {
            break;
        };
        let right = segments.remove(i + 1);
        segments[i].absorb(right);
        costs.remove(i);
        if i < costs.len() {
            costs[i] = merge_cost(&segments[i], &segments[i + 1]);
        }
        if i > 0 {
            costs[i - 1] = merge_cost(&segments[i - 1], &segments[i]);
        }
    }
    segments.into_iter().map(|s| s.start..s.end).collect()
}

/// Weighted mean of `series` over each range; a range with no weight gets
/// the plain mean.
fn segment_means(series: &[f64], weights: &[f64], ranges: &[Range<usize>]) -> Vec<f64> {
    ranges
        .iter()
        .map(|r| {
            let total: f64 = weights[r.clone()].iter().sum();
            if total > 0.0 {
                r.clone().map(|t| series[t] * weights[t]).sum::<f64>() / total
            } else {
                series[r.clone()].iter().sum::<f64>() / r.len() as f64
            }
        })
        .collect()
}
