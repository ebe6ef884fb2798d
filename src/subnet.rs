//! Subnet allocation from the reserved candidate pool
//!
//! Eight fixed /16 blocks in the 172.24-172.31 private range. Allocation is
//! a pure function over the observed subnet inventory: first free candidate
//! wins. No reservation is held between allocation and network creation, so
//! concurrent runs can race; this tool assumes a single operator per host.

use crate::error::{DeployError, DeployResult};

/// Reserved /16 candidate blocks, in allocation order
pub const RESERVED_BLOCKS: [&str; 8] = [
    "172.24.0.0/16",
    "172.25.0.0/16",
    "172.26.0.0/16",
    "172.27.0.0/16",
    "172.28.0.0/16",
    "172.29.0.0/16",
    "172.30.0.0/16",
    "172.31.0.0/16",
];

/// An allocated block and its conventional gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetLease {
    pub subnet: String,
    pub gateway: String,
}

/// First two octets of a dotted-quad CIDR string, if it has them
fn block_key(cidr: &str) -> Option<(u8, u8)> {
    let addr = cidr.split('/').next()?;
    let mut octets = addr.split('.');
    let a = octets.next()?.parse().ok()?;
    let b = octets.next()?.parse().ok()?;
    Some((a, b))
}

/// Whether an already-assigned subnet takes a /16 candidate out of play
///
/// Candidates are /16s, so any assigned block sharing the first two octets
/// collides with it regardless of the assigned prefix length.
fn takes(candidate: &str, assigned: &str) -> bool {
    match (block_key(candidate), block_key(assigned)) {
        (Some(c), Some(a)) => c == a,
        _ => false,
    }
}

/// Conventional gateway: the .1 host of the block
fn gateway_of(subnet: &str) -> String {
    let base = subnet.split('/').next().unwrap_or(subnet);
    match base.rsplit_once('.') {
        Some((prefix, _)) => format!("{}.1", prefix),
        None => base.to_string(),
    }
}

/// Allocate the first reserved candidate not taken by any assigned subnet
pub fn allocate(assigned: &[String]) -> DeployResult<SubnetLease> {
    for candidate in RESERVED_BLOCKS {
        if assigned.iter().any(|a| takes(candidate, a)) {
            continue;
        }
        return Ok(SubnetLease {
            subnet: candidate.to_string(),
            gateway: gateway_of(candidate),
        });
    }
    Err(DeployError::SubnetExhausted {
        candidates: RESERVED_BLOCKS.len(),
    })
}
