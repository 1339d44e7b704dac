//! Declared topology versus deployed state.
//!
//! Backend identifiers are unreliable, so matching is per category:
//! networks by CIDR value, instances and routers by the declared name being
//! contained in the reported one (exact names win over containment). Each
//! reported entity is claimed by at most one declared entity.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use topo_iac::{EnvironmentLayout, SHARED_NETWORK_DIR, STATE_FILE};
use topo_model::{net, MatchedInstance, ResourceCategory, Topology};

use crate::error::AuditResult;
use crate::state::{DeployedState, ReportedNetwork};

/// Verdict for one resource category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryStatus {
    Pass,
    Fail,
    /// Nothing declared and nothing reported.
    Skip,
}

impl CategoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryStatus::Pass => "PASS",
            CategoryStatus::Fail => "FAIL",
            CategoryStatus::Skip => "SKIP",
        }
    }
}

impl std::fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict for a whole environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Consistent,
    Inconsistent,
    /// The backend reported nothing at all.
    NoData,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Consistent => "CONSISTENT",
            OverallStatus::Inconsistent => "INCONSISTENT",
            OverallStatus::NoData => "NO_DATA",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An attribute that differs between a declared and a reported entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub entity: String,
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} expected '{}', found '{}'",
            self.entity, self.field, self.expected, self.actual
        )
    }
}

/// A declared entity and the reported entity it matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub declared: String,
    pub reported: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub status: CategoryStatus,
    /// Declared entity names.
    pub expected: Vec<String>,
    /// Reported entity labels.
    pub actual: Vec<String>,
    /// Every declared entity found a reported counterpart.
    pub matched: bool,
    pub pairs: Vec<MatchedPair>,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub mismatches: Vec<Mismatch>,
}

impl CategoryReport {
    fn build(expected: Vec<String>, actual: Vec<String>, slots: &[Option<usize>], mismatches: Vec<Mismatch>) -> Self {
        let mut pairs = Vec::new();
        let mut missing = Vec::new();
        let mut claimed = vec![false; actual.len()];
        for (name, slot) in expected.iter().zip(slots) {
            match slot {
                Some(index) => {
                    claimed[*index] = true;
                    pairs.push(MatchedPair {
                        declared: name.clone(),
                        reported: actual[*index].clone(),
                    });
                }
                None => missing.push(name.clone()),
            }
        }
        let unexpected = actual
            .iter()
            .zip(&claimed)
            .filter(|(_, claimed)| !**claimed)
            .map(|(label, _)| label.clone())
            .collect();

        let matched = missing.is_empty();
        let status = if expected.is_empty() && actual.is_empty() {
            CategoryStatus::Skip
        } else if matched && expected.len() == actual.len() && mismatches.is_empty() {
            CategoryStatus::Pass
        } else {
            CategoryStatus::Fail
        };

        Self {
            status,
            expected,
            actual,
            matched,
            pairs,
            missing,
            unexpected,
            mismatches,
        }
    }

    fn describe(&self) -> String {
        let mut text = format!("{} ({}/{}", self.status, self.pairs.len(), self.expected.len());
        if self.actual.len() != self.expected.len() {
            text.push_str(&format!(", {} reported", self.actual.len()));
        }
        if !self.missing.is_empty() {
            text.push_str(&format!(", missing: {}", self.missing.join(", ")));
        }
        if !self.mismatches.is_empty() {
            text.push_str(&format!(", {} mismatches", self.mismatches.len()));
        }
        text.push(')');
        text
    }
}

/// Result of one consistency check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub checked_at: DateTime<Utc>,
    pub status: OverallStatus,
    pub per_category: BTreeMap<ResourceCategory, CategoryReport>,
    pub summary: String,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.status == OverallStatus::Consistent
    }

    pub fn category(&self, category: ResourceCategory) -> Option<&CategoryReport> {
        self.per_category.get(&category)
    }

    pub fn to_json(&self) -> AuditResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Single-pass comparison of a topology against deployed state.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsistencyChecker<'a> {
    matches: Option<&'a BTreeMap<String, MatchedInstance>>,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also compare reported images and size classes with these matches,
    /// keyed by instance name.
    pub fn with_matches(mut self, matches: &'a BTreeMap<String, MatchedInstance>) -> Self {
        self.matches = Some(matches);
        self
    }

    pub fn check(&self, topology: &Topology, state: &DeployedState) -> ConsistencyReport {
        let mut per_category = BTreeMap::new();
        per_category.insert(ResourceCategory::Network, self.check_networks(topology, state));
        per_category.insert(ResourceCategory::Instance, self.check_instances(topology, state));
        per_category.insert(ResourceCategory::Router, self.check_routers(topology, state));

        for (category, report) in &per_category {
            info!(
                "{} check: {} ({} declared, {} reported)",
                category,
                report.status,
                report.expected.len(),
                report.actual.len()
            );
        }

        let status = if state.is_empty() {
            OverallStatus::NoData
        } else if per_category.values().all(|r| r.status != CategoryStatus::Fail) {
            OverallStatus::Consistent
        } else {
            OverallStatus::Inconsistent
        };
        if status != OverallStatus::Consistent {
            warn!("Environment is {}", status);
        }

        let summary = per_category
            .iter()
            .map(|(category, report)| format!("{}s {}", category, report.describe()))
            .collect::<Vec<_>>()
            .join("; ");

        ConsistencyReport {
            checked_at: Utc::now(),
            status,
            per_category,
            summary,
        }
    }

    /// Check a generated environment directory against its state file, or
    /// `state_path` when given. Copies that read their network from a
    /// shared environment also get the matching part of the shared state.
    pub fn check_environment(&self, dir: &Path, state_path: Option<&Path>) -> AuditResult<ConsistencyReport> {
        let layout = EnvironmentLayout::detect(dir)?;
        let topology = layout.load_topology()?;

        let mut state = match state_path.or(layout.state_path.as_deref()) {
            Some(path) => DeployedState::load(path)?,
            None => DeployedState::default(),
        };

        let owns_network = dir.join("modules").join("network").is_dir();
        if !owns_network && !layout.is_shared_network() {
            if let Some(parent) = dir.parent() {
                let shared = parent.join(SHARED_NETWORK_DIR).join(STATE_FILE);
                if shared.is_file() {
                    state.merge(DeployedState::load(&shared)?.scoped_to(&topology));
                }
            }
        }

        Ok(self.check(&topology, &state))
    }

    fn check_networks(&self, topology: &Topology, state: &DeployedState) -> CategoryReport {
        let declared = &topology.networks;
        let reported = &state.networks;
        let order: Vec<usize> = (0..declared.len()).collect();
        let slots = pair_up(
            declared,
            reported,
            &order,
            |d, r| match (net::parse_cidr(&d.cidr), net::parse_cidr(&r.cidr)) {
                (Ok(a), Ok(b)) => a == b,
                _ => d.cidr.trim() == r.cidr.trim(),
            },
            |_, _| false,
        );

        let mut mismatches = Vec::new();
        for (network, slot) in declared.iter().zip(&slots) {
            let Some(found) = slot.map(|i| &reported[i]) else { continue };
            if let (Some(expected), Some(actual)) = (&network.gateway_ip, &found.gateway_ip) {
                if expected != actual {
                    mismatches.push(Mismatch {
                        entity: network.name.clone(),
                        field: "gateway_ip".to_string(),
                        expected: expected.clone(),
                        actual: actual.clone(),
                    });
                }
            }
        }

        CategoryReport::build(
            declared.iter().map(|n| n.name.clone()).collect(),
            reported.iter().map(network_label).collect(),
            &slots,
            mismatches,
        )
    }

    fn check_instances(&self, topology: &Topology, state: &DeployedState) -> CategoryReport {
        let declared = &topology.instances;
        let reported = &state.instances;
        let order = longest_first(declared.iter().map(|i| i.name.as_str()));
        let slots = pair_up(
            declared,
            reported,
            &order,
            |d, r| r.name == d.name,
            |d, r| r.name.contains(&d.name),
        );

        let mut mismatches = Vec::new();
        for (instance, slot) in declared.iter().zip(&slots) {
            let Some(found) = slot.map(|i| &reported[i]) else { continue };

            if let Some(matched) = self.matches.and_then(|m| m.get(&instance.name)) {
                let checks = [
                    ("size_class", &matched.size_class, &found.size_class),
                    ("image_id", &matched.image_id, &found.image_id),
                ];
                for (field, expected, actual) in checks {
                    if let Some(actual) = actual.as_ref().filter(|a| *a != expected) {
                        mismatches.push(Mismatch {
                            entity: instance.name.clone(),
                            field: field.to_string(),
                            expected: expected.clone(),
                            actual: actual.clone(),
                        });
                    }
                }
            }

            if !found.addresses.is_empty() {
                for attachment in &instance.networks {
                    if !found.addresses.contains(&attachment.ip) {
                        mismatches.push(Mismatch {
                            entity: instance.name.clone(),
                            field: format!("ip on {}", attachment.network_name),
                            expected: attachment.ip.clone(),
                            actual: found.addresses.join(", "),
                        });
                    }
                }
            }
        }

        CategoryReport::build(
            declared.iter().map(|i| i.name.clone()).collect(),
            reported.iter().map(|i| i.name.clone()).collect(),
            &slots,
            mismatches,
        )
    }

    fn check_routers(&self, topology: &Topology, state: &DeployedState) -> CategoryReport {
        let declared = &topology.routers;
        let reported = &state.routers;
        let order = longest_first(declared.iter().map(|r| r.name.as_str()));
        let slots = pair_up(
            declared,
            reported,
            &order,
            |d, r| r.name == d.name,
            |d, r| r.name.contains(&d.name),
        );

        CategoryReport::build(
            declared.iter().map(|r| r.name.clone()).collect(),
            reported.iter().map(|r| r.name.clone()).collect(),
            &slots,
            Vec::new(),
        )
    }
}

/// Check `topology` against `state` without attribute matches.
pub fn check(topology: &Topology, state: &DeployedState) -> ConsistencyReport {
    ConsistencyChecker::new().check(topology, state)
}

fn network_label(network: &ReportedNetwork) -> String {
    if network.name.is_empty() {
        format!("(unnamed {})", network.cidr)
    } else {
        network.name.clone()
    }
}

/// Assign each declared entity at most one unclaimed reported entity.
/// Declared entities are visited in `order`; the `exact` rule runs over all
/// of them before `loose` is tried.
fn pair_up<D, R>(
    declared: &[D],
    reported: &[R],
    order: &[usize],
    exact: impl Fn(&D, &R) -> bool,
    loose: impl Fn(&D, &R) -> bool,
) -> Vec<Option<usize>> {
    let mut claimed = vec![false; reported.len()];
    let mut slots = vec![None; declared.len()];
    let rules: [&dyn Fn(&D, &R) -> bool; 2] = [&exact, &loose];

    for rule in rules {
        for &d in order {
            if slots[d].is_some() {
                continue;
            }
            if let Some(index) = (0..reported.len()).find(|&i| !claimed[i] && rule(&declared[d], &reported[i])) {
                claimed[index] = true;
                slots[d] = Some(index);
            }
        }
    }
    slots
}

/// Longest names first, so `web-10` claims `web-10-x` before `web-1` can.
fn longest_first<'n>(names: impl Iterator<Item = &'n str>) -> Vec<usize> {
    let lengths: Vec<usize> = names.map(str::len).collect();
    let mut order: Vec<usize> = (0..lengths.len()).collect();
    order.sort_by(|a, b| lengths[*b].cmp(&lengths[*a]));
    order
}
