//! Allocation registry — the in-memory model of every port and UID handed out
//! on this host, plus the allocator that scans it.
//!
//! Pure data and rules only. Loading, locking, and persisting the document
//! lives in `crate::infra::registry`.

use std::collections::{BTreeMap, BTreeSet};

use deploy_common::{AllocationEntry, Variant};
use serde::{Deserialize, Serialize};

use crate::domain::error::DeployError;

/// Port tried first for a variant that has no `next_available` entry yet.
pub const DEFAULT_BASE_PORT: u16 = 19003;

/// Ports held back for the operator's own gateway and the platform.
pub const DEFAULT_RESERVED_PORTS: [u16; 2] = [18788, 19000];

/// First UID handed to an isolated user. Everything below belongs to
/// pre-existing accounts.
pub const UID_BASE: u32 = 503;

/// The persisted registry document.
///
/// `allocated` is append-only in registration order; the whole document is
/// rewritten on every mutation. A field missing from the file takes its
/// seeded default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationRegistry {
    pub allocated: Vec<AllocationEntry>,
    pub reserved: Vec<u16>,
    /// Keyed by variant tag (`l1`, `l2`).
    pub next_available: BTreeMap<String, u16>,
}

impl Default for AllocationRegistry {
    fn default() -> Self {
        let mut next_available = BTreeMap::new();
        next_available.insert(Variant::SharedProfile.tag().to_string(), 19003);
        next_available.insert(Variant::IsolatedUser.tag().to_string(), 19004);
        Self {
            allocated: Vec::new(),
            reserved: DEFAULT_RESERVED_PORTS.to_vec(),
            next_available,
        }
    }
}

impl AllocationRegistry {
    /// True if `port` is reserved or already claimed by any entry.
    #[must_use]
    pub fn is_port_allocated(&self, port: u16) -> bool {
        self.reserved.contains(&port) || self.allocated.iter().any(|e| e.port == port)
    }

    /// True if any entry carries `uid`.
    #[must_use]
    pub fn is_uid_allocated(&self, uid: u32) -> bool {
        self.allocated.iter().any(|e| e.uid == Some(uid))
    }

    /// Where the scan for `variant` starts.
    #[must_use]
    pub fn next_available(&self, variant: Variant) -> u16 {
        self.next_available
            .get(variant.tag())
            .copied()
            .unwrap_or(DEFAULT_BASE_PORT)
    }

    /// First free port at or after `next_available[variant]`.
    ///
    /// Does not mutate the registry; repeated calls return the same value
    /// until something is registered.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Config` if the scan runs off the end of the port
    /// space.
    pub fn allocate_port(&self, variant: Variant) -> Result<u16, DeployError> {
        self.first_free_port_from(self.next_available(variant))
    }

    /// First UID at or above [`UID_BASE`] that is neither registered nor in
    /// `occupied` (UIDs the OS already reports in use).
    #[must_use]
    pub fn allocate_uid(&self, occupied: &BTreeSet<u32>) -> u32 {
        let mut uid = UID_BASE;
        while self.is_uid_allocated(uid) || occupied.contains(&uid) {
            uid += 1;
        }
        uid
    }

    /// Append `entry` and advance `next_available[entry.variant]` to the first
    /// free port strictly after `entry.port`.
    ///
    /// Refuses, without mutating anything, an entry whose port or UID is
    /// already taken.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Prerequisite` on a port or UID collision.
    pub fn register(&mut self, entry: AllocationEntry) -> Result<(), DeployError> {
        if self.is_port_allocated(entry.port) {
            return Err(DeployError::Prerequisite(format!(
                "port {} is already allocated",
                entry.port
            )));
        }
        if let Some(uid) = entry.uid
            && self.is_uid_allocated(uid)
        {
            return Err(DeployError::Prerequisite(format!(
                "uid {uid} is already allocated"
            )));
        }
        let variant = entry.variant;
        let port = entry.port;
        self.allocated.push(entry);
        // A registration at the very top of the port space leaves the cursor
        // where it was; the next allocate_port call reports exhaustion.
        if let Some(start) = port.checked_add(1)
            && let Ok(next) = self.first_free_port_from(start)
        {
            self.next_available.insert(variant.tag().to_string(), next);
        }
        Ok(())
    }

    /// Latest entry registered under `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&AllocationEntry> {
        self.allocated.iter().rev().find(|e| e.name == name)
    }

    /// Check the uniqueness invariants of a loaded document.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Config` naming the first duplicate port or UID.
    pub fn validate(&self) -> Result<(), DeployError> {
        let mut ports = BTreeSet::new();
        let mut uids = BTreeSet::new();
        for entry in &self.allocated {
            if !ports.insert(entry.port) {
                return Err(DeployError::Config(format!(
                    "registry lists port {} more than once",
                    entry.port
                )));
            }
            if self.reserved.contains(&entry.port) {
                return Err(DeployError::Config(format!(
                    "registry allocates reserved port {}",
                    entry.port
                )));
            }
            if let Some(uid) = entry.uid
                && !uids.insert(uid)
            {
                return Err(DeployError::Config(format!(
                    "registry lists uid {uid} more than once"
                )));
            }
        }
        Ok(())
    }

    fn first_free_port_from(&self, start: u16) -> Result<u16, DeployError> {
        (start..=u16::MAX)
            .find(|p| !self.is_port_allocated(*p))
            .ok_or_else(|| DeployError::Config(format!("no free port at or above {start}")))
    }
}
