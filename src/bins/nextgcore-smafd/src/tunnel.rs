//! UP Tunnel
//!
//! Per-session user plane state: the data path pool, the tunnel endpoints
//! hanging off every path node, and the session-scoped rule identifier
//! allocators.

use ogs_core::IdGenerator;
use ogs_pfcp::prelude::*;

use crate::datapath::DataPathPool;
use crate::error::{SmafError, SmafResult};
use crate::user_plane::UserPlaneTopology;

/// Precedence of every PDR installed for a session
pub const PDR_PRECEDENCE: u32 = 255;

// ============================================================================
// Tunnel endpoint
// ============================================================================

/// Uplink or downlink anchor point of one path node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelEndpoint {
    pub teid: Option<u32>,
    pub pdr: Option<Pdr>,
}

// ============================================================================
// Rule identifiers
// ============================================================================

#[derive(Debug)]
pub struct RuleIds {
    pdr: IdGenerator,
    far: IdGenerator,
    bar: IdGenerator,
}

fn narrow<T: TryFrom<i64>>(value: i64, what: &str) -> SmafResult<T> {
    T::try_from(value).map_err(|_| SmafError::ResourceExhausted(format!("{} id {} out of range", what, value)))
}

impl RuleIds {
    pub fn new() -> SmafResult<Self> {
        Ok(Self {
            pdr: IdGenerator::new("PDR", 1, i64::from(u16::MAX))?,
            far: IdGenerator::new("FAR", 1, i64::from(u32::MAX))?,
            bar: IdGenerator::new("BAR", 1, i64::from(u8::MAX))?,
        })
    }

    pub fn allocate_pdr(&self) -> SmafResult<u16> {
        narrow(self.pdr.allocate()?, "PDR")
    }

    pub fn allocate_far(&self) -> SmafResult<u32> {
        narrow(self.far.allocate()?, "FAR")
    }

    pub fn allocate_bar(&self) -> SmafResult<u8> {
        narrow(self.bar.allocate()?, "BAR")
    }

    pub fn free_bar(&self, bar_id: u8) {
        self.bar.free(i64::from(bar_id));
    }

    /// Return the ids of a PDR, its FAR and its BAR
    pub fn release(&self, pdr: &Pdr) {
        self.pdr.free(i64::from(pdr.pdr_id));
        self.far.free(i64::from(pdr.far.far_id));
        if let Some(bar) = pdr.far.bar.as_ref() {
            self.free_bar(bar.bar_id);
        }
    }

    /// Build a PDR with a fresh FAR (and BAR when buffering)
    pub fn new_pdr(
        &self,
        pdi: Pdi,
        apply_action: ApplyAction,
        forwarding: Option<ForwardingParameters>,
    ) -> SmafResult<Pdr> {
        let far_id = self.allocate_far()?;
        let bar = if apply_action.buff {
            match self.allocate_bar() {
                Ok(bar_id) => Some(Bar::new(bar_id)),
                Err(e) => {
                    self.far.free(i64::from(far_id));
                    return Err(e);
                }
            }
        } else {
            None
        };
        let pdr_id = match self.allocate_pdr() {
            Ok(id) => id,
            Err(e) => {
                self.far.free(i64::from(far_id));
                if let Some(bar) = bar.as_ref() {
                    self.free_bar(bar.bar_id);
                }
                return Err(e);
            }
        };

        let mut far = Far::new(far_id, apply_action);
        far.forwarding_parameters = forwarding;
        far.bar = bar;
        Ok(Pdr::new(pdr_id, PDR_PRECEDENCE, pdi, far))
    }

    pub fn pdrs_in_use(&self) -> usize {
        self.pdr.in_use()
    }

    pub fn fars_in_use(&self) -> usize {
        self.far.in_use()
    }

    pub fn bars_in_use(&self) -> usize {
        self.bar.in_use()
    }
}

// ============================================================================
// UP tunnel
// ============================================================================

#[derive(Debug)]
pub struct UpTunnel {
    pub pool: DataPathPool,
    pub rule_ids: RuleIds,
}

impl UpTunnel {
    pub fn new() -> SmafResult<Self> {
        Ok(Self {
            pool: DataPathPool::new()?,
            rule_ids: RuleIds::new()?,
        })
    }

    /// Drop every rule and TEID of every path
    pub fn release_all(&mut self, topology: &UserPlaneTopology) {
        self.pool.release_all(&self.rule_ids, topology);
    }
}
