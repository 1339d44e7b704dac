//! Topology duplication with collision-free names and addresses.
//!
//! Each copy gets a short token appended to every instance, network and
//! router name, with attachment references rewritten to match. Backends
//! that put every copy into one address space additionally get each copy
//! moved into its own child block of a super-block.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};

use topo_model::{net, Topology};

use crate::backend::Backend;
use crate::error::{IacError, IacResult};

/// Redraws allowed per requested token before giving up.
const MAX_REDRAWS_PER_TOKEN: usize = 16;

/// Prefix lengths AWS accepts for a VPC block.
pub const AWS_VPC_PREFIX_RANGE: std::ops::RangeInclusive<u8> = 16..=28;

/// Largest public subnet carved out for the bastion host.
const PUBLIC_SUBNET_PREFIX: u8 = 24;
/// Smallest public subnet worth carving out.
const MIN_PUBLIC_SUBNET_PREFIX: u8 = 28;

/// Source of clone tokens. Implementations need not guarantee uniqueness;
/// the engine redraws duplicates.
pub trait TokenSource {
    fn next_token(&mut self) -> String;
}

/// Six lowercase hex characters from a ChaCha stream.
pub struct SeededTokens {
    rng: ChaCha8Rng,
}

impl SeededTokens {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }
}

impl TokenSource for SeededTokens {
    fn next_token(&mut self) -> String {
        format!("{:06x}", self.rng.gen_range(0..=0x00ff_ffffu32))
    }
}

/// Monotonic tokens `c01`, `c02`, ...
#[derive(Debug, Default)]
pub struct CounterTokens {
    issued: u32,
}

impl TokenSource for CounterTokens {
    fn next_token(&mut self) -> String {
        self.issued += 1;
        format!("c{:02}", self.issued)
    }
}

/// The default super-block shared-address-space copies are carved from.
pub fn default_super_block() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 16).unwrap_or_default()
}

/// `<name>_<token>`.
pub fn suffixed(name: &str, token: &str) -> String {
    format!("{}_{}", name, token)
}

/// One member of a clone batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CloneCopy {
    /// `None` for a single, unsuffixed copy.
    pub token: Option<String>,
    pub topology: Topology,
    /// Address block this copy occupies in a shared address space.
    pub block: Option<Ipv4Net>,
}

impl CloneCopy {
    /// Name that `original` carries inside this copy.
    pub fn rename(&self, original: &str) -> String {
        match &self.token {
            Some(token) => suffixed(original, token),
            None => original.to_string(),
        }
    }

    /// Environment directory name for this copy.
    pub fn dir_name(&self, backend: Backend) -> String {
        self.rename(backend.as_str())
    }
}

/// Address layout of a shared-address-space batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressPlan {
    pub super_block: Ipv4Net,
    /// Smallest block enclosing the original topology's networks.
    pub span: Ipv4Net,
    /// One block per copy, in copy order.
    pub children: Vec<Ipv4Net>,
    /// Minimal block enclosing every child; the shared VPC range.
    pub vpc_cidr: Ipv4Net,
    /// Free block inside the VPC for the bastion host.
    pub public_subnet: Option<Ipv4Net>,
}

/// Ordered result of cloning one topology.
#[derive(Debug, Clone, PartialEq)]
pub struct CloneSet {
    pub copies: Vec<CloneCopy>,
    pub plan: Option<AddressPlan>,
}

impl CloneSet {
    pub fn len(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    pub fn topologies(&self) -> Vec<&Topology> {
        self.copies.iter().map(|c| &c.topology).collect()
    }

    pub fn into_topologies(self) -> Vec<Topology> {
        self.copies.into_iter().map(|c| c.topology).collect()
    }

    /// Re-check invariants that span the whole batch: names never repeat
    /// across copies, and copies in a shared address space never overlap.
    pub fn check_batch(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let names: Vec<BTreeSet<String>> = self.copies.iter().map(|c| c.topology.all_names()).collect();

        for (i, a) in self.copies.iter().enumerate() {
            for (j, b) in self.copies.iter().enumerate().skip(i + 1) {
                let shared: Vec<&str> = names[i].intersection(&names[j]).map(String::as_str).collect();
                if !shared.is_empty() {
                    problems.push(format!(
                        "Copies {} and {} share names: {}",
                        label(a),
                        label(b),
                        shared.join(", ")
                    ));
                }
                if self.plan.is_some() {
                    problems.extend(overlapping_networks(a, b));
                }
            }
        }

        for copy in &self.copies {
            let Some(block) = copy.block else { continue };
            for network in &copy.topology.networks {
                let inside = net::parse_cidr(&network.cidr).map_or(false, |n| block.contains(&n));
                if !inside {
                    problems.push(format!(
                        "Copy {}: network '{}' ({}) is outside its block {}",
                        label(copy),
                        network.name,
                        network.cidr,
                        block
                    ));
                }
            }
        }
        problems
    }
}

fn label(copy: &CloneCopy) -> &str {
    copy.token.as_deref().unwrap_or("original")
}

fn overlapping_networks(a: &CloneCopy, b: &CloneCopy) -> Vec<String> {
    let mut problems = Vec::new();
    for na in &a.topology.networks {
        let Ok(cidr_a) = net::parse_cidr(&na.cidr) else { continue };
        for nb in &b.topology.networks {
            let Ok(cidr_b) = net::parse_cidr(&nb.cidr) else { continue };
            if net::overlaps(&cidr_a, &cidr_b) {
                problems.push(format!(
                    "Copies {} and {} overlap: '{}' ({}) and '{}' ({})",
                    label(a),
                    label(b),
                    na.name,
                    na.cidr,
                    nb.name,
                    nb.cidr
                ));
            }
        }
    }
    problems
}

/// Produces clone batches from a token source.
pub struct CloneEngine<T: TokenSource> {
    tokens: T,
    super_block: Ipv4Net,
}

impl<T: TokenSource> CloneEngine<T> {
    pub fn new(tokens: T) -> Self {
        Self {
            tokens,
            super_block: default_super_block(),
        }
    }

    pub fn with_super_block(mut self, super_block: Ipv4Net) -> Self {
        self.super_block = super_block.trunc();
        self
    }

    /// Clone for a backend, planning a shared address space when the
    /// backend requires one.
    pub fn clone_for(&mut self, topology: &Topology, copies: usize, backend: Backend) -> IacResult<CloneSet> {
        if !backend.requires_shared_address_space() {
            return self.clone_topology(topology, copies);
        }

        let set = self.clone_shared(topology, copies)?;
        if let Some(plan) = &set.plan {
            let prefix = plan.vpc_cidr.prefix_len();
            if backend == Backend::Aws && !AWS_VPC_PREFIX_RANGE.contains(&prefix) {
                return Err(IacError::Clone(format!(
                    "shared block {} is outside the /{}../{} range AWS accepts for a VPC",
                    plan.vpc_cidr,
                    AWS_VPC_PREFIX_RANGE.start(),
                    AWS_VPC_PREFIX_RANGE.end()
                )));
            }
        }
        Ok(set)
    }

    /// Rename-only cloning. One copy returns the original untouched.
    pub fn clone_topology(&mut self, topology: &Topology, copies: usize) -> IacResult<CloneSet> {
        if copies == 0 {
            return Err(IacError::InvalidCopies(copies));
        }
        if copies == 1 {
            return Ok(CloneSet {
                copies: vec![CloneCopy {
                    token: None,
                    topology: topology.clone(),
                    block: None,
                }],
                plan: None,
            });
        }

        let tokens = self.draw_tokens(copies)?;
        let copies = tokens
            .into_iter()
            .map(|token| CloneCopy {
                topology: apply_suffix(topology, &token),
                token: Some(token),
                block: None,
            })
            .collect();
        Ok(CloneSet { copies, plan: None })
    }

    /// Cloning into one shared address space. Copies are placed in
    /// consecutive equal-sized children of the super-block, each sized to
    /// the span of the original topology's networks rather than to its
    /// largest subnet. Keeping the whole span lets every in-block address
    /// (gateways, pools, route next hops) move by one offset per copy.
    ///
    /// Sparse topologies pay for this: `192.168.10.0/24` plus
    /// `192.168.200.0/24` spans a /16, so each copy takes a /16 and the
    /// default `10.0.0.0/16` super-block holds a single copy. Pass a wider
    /// block through [`CloneEngine::with_super_block`] for such layouts.
    pub fn clone_shared(&mut self, topology: &Topology, copies: usize) -> IacResult<CloneSet> {
        if copies == 0 {
            return Err(IacError::InvalidCopies(copies));
        }

        let nets = topology
            .networks
            .iter()
            .map(|n| {
                net::parse_cidr(&n.cidr)
                    .map_err(|e| IacError::Clone(format!("network '{}': {}", n.name, e)))
            })
            .collect::<IacResult<Vec<_>>>()?;
        let span = net::enclosing_cidr(&nets)
            .ok_or_else(|| IacError::Clone("topology has no networks to place".to_string()))?;

        let mut set = self.clone_topology(topology, copies)?;
        let children = if copies == 1 {
            vec![span]
        } else {
            self.carve_children(span, copies)?
        };

        for (copy, child) in set.copies.iter_mut().zip(&children) {
            if *child != span {
                copy.topology = translate_topology(&copy.topology, &span, child);
            }
            copy.block = Some(*child);
        }

        let used: Vec<Ipv4Net> = set
            .copies
            .iter()
            .flat_map(|c| c.topology.networks.iter())
            .filter_map(|n| net::parse_cidr(&n.cidr).ok())
            .collect();
        let (vpc_cidr, public_subnet) = plan_vpc(&children, &used)?;

        info!(
            "Planned {} copies of {} inside {} (VPC {}, public {})",
            copies,
            span,
            self.super_block,
            vpc_cidr,
            public_subnet.map_or_else(|| "none".to_string(), |p| p.to_string())
        );

        set.plan = Some(AddressPlan {
            super_block: self.super_block,
            span,
            children,
            vpc_cidr,
            public_subnet,
        });
        Ok(set)
    }

    fn carve_children(&self, span: Ipv4Net, copies: usize) -> IacResult<Vec<Ipv4Net>> {
        let children: Vec<Ipv4Net> = self
            .super_block
            .subnets(span.prefix_len())
            .map_err(|_| {
                IacError::Clone(format!(
                    "a /{} copy does not fit in super-block {}",
                    span.prefix_len(),
                    self.super_block
                ))
            })?
            .take(copies)
            .collect();

        if children.len() < copies {
            return Err(IacError::Clone(format!(
                "super-block {} holds only {} copies of a /{} span, {} requested",
                self.super_block,
                children.len(),
                span.prefix_len(),
                copies
            )));
        }
        Ok(children)
    }

    fn draw_tokens(&mut self, copies: usize) -> IacResult<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut tokens = Vec::with_capacity(copies);
        let budget = copies * MAX_REDRAWS_PER_TOKEN;

        for _ in 0..budget {
            if tokens.len() == copies {
                break;
            }
            let token = self.tokens.next_token();
            if seen.insert(token.clone()) {
                tokens.push(token);
            } else {
                debug!("Token {} already drawn, redrawing", token);
            }
        }

        if tokens.len() < copies {
            return Err(IacError::Clone(format!(
                "token source produced only {} distinct tokens for {} copies",
                tokens.len(),
                copies
            )));
        }
        debug!("Clone tokens: {}", tokens.join(", "));
        Ok(tokens)
    }
}

/// Clone `topology` into `copies` rename-only copies.
pub fn clone_topology<T: TokenSource>(topology: &Topology, copies: usize, tokens: T) -> IacResult<Vec<Topology>> {
    Ok(CloneEngine::new(tokens)
        .clone_topology(topology, copies)?
        .into_topologies())
}

/// Rename every entity and rewrite references to match.
fn apply_suffix(topology: &Topology, token: &str) -> Topology {
    let mut copy = topology.clone();
    for network in &mut copy.networks {
        network.name = suffixed(&network.name, token);
    }
    for instance in &mut copy.instances {
        instance.name = suffixed(&instance.name, token);
        for attachment in &mut instance.networks {
            attachment.network_name = suffixed(&attachment.network_name, token);
        }
    }
    for router in &mut copy.routers {
        router.name = suffixed(&router.name, token);
        for attachment in &mut router.networks {
            attachment.network_name = suffixed(&attachment.network_name, token);
        }
    }
    copy
}

/// Shift every address inside `from` by the offset between `from` and `to`.
fn translate_topology(topology: &Topology, from: &Ipv4Net, to: &Ipv4Net) -> Topology {
    let shift_addr = |literal: &str| -> String {
        net::parse_ipv4(literal)
            .ok()
            .and_then(|addr| net::translate(addr, from, to))
            .map_or_else(|| literal.to_string(), |addr| addr.to_string())
    };
    let shift_cidr = |literal: &str| -> String {
        net::parse_cidr(literal)
            .ok()
            .filter(|cidr| from.contains(cidr))
            .and_then(|cidr| net::translate_net(&cidr, from, to))
            .map_or_else(|| literal.to_string(), |cidr| cidr.to_string())
    };

    let mut copy = topology.clone();
    for network in &mut copy.networks {
        network.cidr = shift_cidr(&network.cidr);
        network.gateway_ip = network.gateway_ip.as_deref().map(shift_addr);
        for pool in &mut network.pool {
            pool.start = shift_addr(&pool.start);
            pool.end = shift_addr(&pool.end);
        }
    }
    for instance in &mut copy.instances {
        for attachment in &mut instance.networks {
            attachment.ip = shift_addr(&attachment.ip);
        }
    }
    for router in &mut copy.routers {
        for attachment in &mut router.networks {
            attachment.ip = shift_addr(&attachment.ip);
        }
        for route in &mut router.routes {
            route.destination = shift_cidr(&route.destination);
            route.nexthop = shift_addr(&route.nexthop);
        }
    }
    copy
}

/// VPC block enclosing every child, plus a free public subnet. The block
/// is widened one bit at a time (down to a /16) until a public subnet fits.
fn plan_vpc(children: &[Ipv4Net], used: &[Ipv4Net]) -> IacResult<(Ipv4Net, Option<Ipv4Net>)> {
    let mut vpc = net::enclosing_cidr(children)
        .ok_or_else(|| IacError::Clone("no address blocks to enclose".to_string()))?;

    loop {
        if let Some(public) = free_public_subnet(&vpc, used) {
            return Ok((vpc, Some(public)));
        }
        match vpc.supernet() {
            Some(wider) if wider.prefix_len() >= *AWS_VPC_PREFIX_RANGE.start() => vpc = wider,
            _ => return Ok((vpc, None)),
        }
    }
}

/// Highest-addressed block inside `vpc`, at most a /24, that overlaps no
/// used network.
fn free_public_subnet(vpc: &Ipv4Net, used: &[Ipv4Net]) -> Option<Ipv4Net> {
    let largest = PUBLIC_SUBNET_PREFIX.max(vpc.prefix_len() + 1);
    for prefix in largest..=MIN_PUBLIC_SUBNET_PREFIX {
        let Ok(candidates) = vpc.subnets(prefix) else { continue };
        let candidates: Vec<Ipv4Net> = candidates.collect();
        if let Some(free) = candidates
            .into_iter()
            .rev()
            .find(|c| !used.iter().any(|u| net::overlaps(c, u)))
        {
            return Some(free);
        }
    }
    None
}
