//! Cluster — a group of lights that change state together.
//!
//! Both flavours share the same membership rules: members keep their
//! insertion order, a light may appear only once, and an [`add`](Cluster::add)
//! either takes every light it was given or none of them. Members cannot be
//! removed, so a tethered cluster's master (its first member) never changes.

mod membership;
mod polar;
mod tethered;

pub use polar::PolarCluster;
pub use tethered::TetheredCluster;

use std::collections::HashSet;
use std::sync::Arc;

use trafficsync_domain::error::MembershipError;
use trafficsync_domain::id::{ClusterId, LightId};
use trafficsync_domain::light::LightState;

use crate::light::Light;

/// Contract shared by [`TetheredCluster`] and [`PolarCluster`].
pub trait Cluster {
    fn id(&self) -> ClusterId;

    fn name(&self) -> &str;

    /// Members in insertion order.
    fn members(&self) -> Vec<Arc<Light>>;

    /// Append every light, or none if any of them is already a member
    /// (including twice in `lights`).
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] naming the first offending light.
    fn add(&self, lights: &[Arc<Light>]) -> Result<(), MembershipError>;

    /// Drive the cluster from its master: `state` is applied the way this
    /// flavour propagates it.
    fn set_master_state_to(&self, state: LightState);

    fn member_ids(&self) -> Vec<LightId> {
        self.members().iter().map(|light| light.id()).collect()
    }

    /// Whether every id in `ids` is currently a member.
    fn is_member(&self, ids: &[LightId]) -> bool {
        let members: HashSet<LightId> = self.member_ids().into_iter().collect();
        ids.iter().all(|id| members.contains(id))
    }
}

/// Raised by a cluster when its master's state expired.
#[derive(Debug)]
pub struct ClusterUpdate<C> {
    pub cluster: Arc<C>,
    /// The state the master held when it expired.
    pub master_state: LightState,
}
