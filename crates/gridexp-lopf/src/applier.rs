//! Post-solve cleanup of solved capacities.
//!
//! Only extendable branches are ever touched here; fixed-capacity branches
//! keep their rating even when it is zero.

use crate::error::LopfError;
use crate::model::VarKey;
use crate::session::SolverSession;
use gridexp_core::Network;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Branches removed by [`prune`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneReport {
    pub lines: Vec<String>,
    pub links: Vec<String>,
}

impl PruneReport {
    pub fn count(&self) -> usize {
        self.lines.len() + self.links.len()
    }
}

/// Set solved capacities of extendable branches below `threshold` to exactly
/// zero. Returns how many branches changed, so a repeated call returns 0.
pub fn zero_out(network: &mut Network, threshold: f64) -> usize {
    let mut changed = 0;
    for line in network.lines.iter_mut().filter(|l| l.s_nom_extendable) {
        if line.s_nom_opt < threshold && line.s_nom_opt != 0.0 {
            line.s_nom_opt = 0.0;
            changed += 1;
        }
    }
    for link in network.links.iter_mut().filter(|l| l.p_nom_extendable) {
        if link.p_nom_opt < threshold && link.p_nom_opt != 0.0 {
            link.p_nom_opt = 0.0;
            changed += 1;
        }
    }
    if changed > 0 {
        debug!(branches = changed, threshold, "zeroed negligible capacities");
    }
    changed
}

/// Zero the rating of extendable branches solved to zero and pin their
/// capacity variables at zero in `session`.
///
/// Untyped lines get `s_nom = 0`, typed lines `num_parallel = 0` (the rating
/// follows from the template), links `p_nom = 0`.
pub fn pin_zero_capacity(
    network: &mut Network,
    session: &mut dyn SolverSession,
) -> Result<usize, LopfError> {
    let mut pinned = 0;
    for line in network
        .lines
        .iter_mut()
        .filter(|l| l.s_nom_extendable && l.s_nom_opt == 0.0)
    {
        if line.is_typed() {
            line.num_parallel = 0.0;
        } else {
            line.s_nom = 0.0;
        }
        session.fix(&VarKey::LineSNom(line.name.clone()), 0.0)?;
        pinned += 1;
    }
    for link in network
        .links
        .iter_mut()
        .filter(|l| l.p_nom_extendable && l.p_nom_opt == 0.0)
    {
        link.p_nom = 0.0;
        session.fix(&VarKey::LinkPNom(link.name.clone()), 0.0)?;
        pinned += 1;
    }
    network.calculate_dependent_values()?;
    if pinned > 0 {
        debug!(branches = pinned, "pinned zero-capacity branches");
    }
    Ok(pinned)
}

/// Remove extendable lines and links whose solved capacity is exactly zero.
pub fn prune(network: &mut Network) -> PruneReport {
    let report = PruneReport {
        lines: network
            .lines
            .iter()
            .filter(|l| l.s_nom_extendable && l.s_nom_opt == 0.0)
            .map(|l| l.name.clone())
            .collect(),
        links: network
            .links
            .iter()
            .filter(|l| l.p_nom_extendable && l.p_nom_opt == 0.0)
            .map(|l| l.name.clone())
            .collect(),
    };
    network.remove_lines(&report.lines);
    network.remove_links(&report.links);
    info!(
        lines = report.lines.len(),
        links = report.links.len(),
        "removed zero-capacity extendable branches"
    );
    report
}

/// Serialize full network state to `location`.
pub fn checkpoint(network: &Network, location: &Path) -> Result<(), LopfError> {
    network.to_json_file(location)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridexp_core::{Bus, Line, Link};

    fn network() -> Network {
        let mut n = Network::new("cleanup");
        n.buses.push(Bus::new("a", 220.0));
        n.buses.push(Bus::new("b", 220.0));
        let mut small = Line::new("small", "a", "b").with_s_nom(50.0).extendable(1.0);
        small.s_nom_opt = 3.0;
        let mut big = Line::new("big", "a", "b").with_s_nom(50.0).extendable(1.0);
        big.s_nom_opt = 800.0;
        let mut idle = Line::new("idle", "a", "b");
        idle.s_nom_opt = 0.0;
        n.lines.extend([small, big, idle]);

        let mut dc = Link::new("dc", "a", "b").extendable(1.0);
        dc.p_nom_opt = 1e-7;
        n.links.push(dc);
        n
    }

    #[test]
    fn test_zero_out_is_idempotent() {
        let mut n = network();
        assert_eq!(zero_out(&mut n, 10.0), 2);
        let after_first = n.to_json_string().unwrap();
        assert_eq!(zero_out(&mut n, 10.0), 0);
        assert_eq!(n.to_json_string().unwrap(), after_first);
        assert_eq!(n.lines[0].s_nom_opt, 0.0);
        assert_eq!(n.lines[1].s_nom_opt, 800.0);
        assert_eq!(n.links[0].p_nom_opt, 0.0);
    }

    #[test]
    fn test_zero_out_ignores_fixed_branches() {
        let mut n = network();
        n.lines[2].s_nom_opt = 4.0;
        zero_out(&mut n, 10.0);
        assert_eq!(n.lines[2].s_nom_opt, 4.0);
    }

    #[test]
    fn test_prune_keeps_fixed_zero_branch() {
        let mut n = network();
        zero_out(&mut n, 10.0);
        let report = prune(&mut n);
        assert_eq!(report.lines, vec!["small".to_string()]);
        assert_eq!(report.links, vec!["dc".to_string()]);
        assert_eq!(report.count(), 2);
        let names: Vec<&str> = n.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["big", "idle"]);
        assert!(n.links.is_empty());
    }

    #[test]
    fn test_checkpoint_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elec_checkpoint.json");
        checkpoint(&network(), &path).unwrap();
        let back = Network::from_json_file(&path).unwrap();
        assert_eq!(back.lines.len(), 3);
    }
}
