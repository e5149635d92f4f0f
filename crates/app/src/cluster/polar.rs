//! Polar cluster — members show the state opposite to a master light.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use trafficsync_domain::error::MembershipError;
use trafficsync_domain::event::LightStateExpired;
use trafficsync_domain::id::{ClusterId, LightId, SubscriptionId};
use trafficsync_domain::light::LightState;

use super::membership::Membership;
use super::{Cluster, ClusterUpdate, TetheredCluster};
use crate::event_bus::Subscribers;
use crate::light::Light;

/// Lights whose state must oppose the master light.
///
/// The master is fixed at construction and is never a member. The cluster
/// listens to the master directly, so its expirations propagate regardless of
/// how the member list evolves.
pub struct PolarCluster {
    id: ClusterId,
    name: String,
    master: Arc<Light>,
    master_subscription: SubscriptionId,
    members: Membership,
    updates: Subscribers<ClusterUpdate<PolarCluster>>,
}

impl PolarCluster {
    #[must_use]
    pub fn new(name: impl Into<String>, master: Arc<Light>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let cluster = me.clone();
            let master_subscription = master.subscribe_state_expired(move |event| {
                if let Some(cluster) = cluster.upgrade() {
                    cluster.on_master_expired(event);
                }
            });
            Self {
                id: ClusterId::new(),
                name: name.into(),
                master,
                master_subscription,
                members: Membership::default(),
                updates: Subscribers::new(),
            }
        })
    }

    #[must_use]
    pub fn master(&self) -> &Arc<Light> {
        &self.master
    }

    /// A tethered cluster of the current members only.
    ///
    /// Built fresh on every call and detached from the lights, so it never
    /// raises updates and always reflects the latest membership.
    #[must_use]
    pub fn tethered_view(&self) -> TetheredCluster {
        TetheredCluster::detached(format!("{} (members)", self.name), self.members.snapshot())
    }

    /// Whether `tether` may be paired with this cluster: it must not be this
    /// cluster's own member view, and the two member sets must be disjoint.
    #[must_use]
    pub fn is_compatible(&self, tether: &TetheredCluster) -> bool {
        if *tether == self.tethered_view() {
            return false;
        }
        self.member_id_set().is_disjoint(&tether.member_id_set())
    }

    pub fn subscribe_updates<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ClusterUpdate<PolarCluster>) + Send + Sync + 'static,
    {
        self.updates.subscribe(handler)
    }

    pub fn unsubscribe_updates(&self, id: SubscriptionId) -> bool {
        self.updates.unsubscribe(id)
    }

    fn member_id_set(&self) -> HashSet<LightId> {
        self.members.id_set()
    }

    fn on_master_expired(self: &Arc<Self>, event: &LightStateExpired) {
        if event.light_id != self.master.id() {
            return;
        }
        tracing::debug!(cluster_id = %self.id, name = %self.name, state = %event.state, "polar cluster requires update");
        self.updates.publish(&ClusterUpdate {
            cluster: Arc::clone(self),
            master_state: event.state,
        });
    }
}

impl Cluster for PolarCluster {
    fn id(&self) -> ClusterId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> Vec<Arc<Light>> {
        self.members.snapshot()
    }

    fn add(&self, lights: &[Arc<Light>]) -> Result<(), MembershipError> {
        if lights.iter().any(|light| light.id() == self.master.id()) {
            return Err(MembershipError::MasterAsMember(self.master.id()));
        }
        self.members.extend(lights)
    }

    /// Set the master to `state` and every member to its polar opposite.
    fn set_master_state_to(&self, state: LightState) {
        self.master.set_state(state);
        let polar_state = state.polar();
        for light in self.members.snapshot() {
            light.set_state(polar_state);
        }
    }
}

impl Drop for PolarCluster {
    fn drop(&mut self) {
        self.master.unsubscribe(self.master_subscription);
    }
}

impl PartialEq for PolarCluster {
    fn eq(&self, other: &Self) -> bool {
        self.master.id() == other.master.id() && self.member_id_set() == other.member_id_set()
    }
}

impl std::fmt::Debug for PolarCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolarCluster")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("master", &self.master.id())
            .field("members", &self.member_ids())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for PolarCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name: {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use trafficsync_domain::light::{Configuration, StateDuration};

    use super::*;

    fn lights(count: usize) -> Vec<Arc<Light>> {
        (0..count).map(|_| Light::builder().build()).collect()
    }

    fn polar(master: &Arc<Light>, members: &[Arc<Light>]) -> Arc<PolarCluster> {
        let cluster = PolarCluster::new("PC", Arc::clone(master));
        cluster.add(members).unwrap();
        cluster
    }

    fn tether(members: &[Arc<Light>]) -> Arc<TetheredCluster> {
        let cluster = TetheredCluster::new("TC");
        cluster.add(members).unwrap();
        cluster
    }

    #[test]
    fn should_treat_clusters_with_identical_attributes_as_equal() {
        let l = lights(4);
        let first = polar(&l[0], &[l[1].clone(), l[2].clone()]);
        let second = polar(&l[0], &[l[2].clone(), l[1].clone()]);
        assert_eq!(*first, *second);

        second.add(&[l[3].clone()]).unwrap();
        assert_ne!(*first, *second);
    }

    #[test]
    fn should_treat_clusters_with_different_master_as_not_equal() {
        let l = lights(4);
        let first = polar(&l[0], &[l[1].clone(), l[2].clone()]);
        let second = polar(&l[3], &[l[1].clone(), l[2].clone()]);
        assert_ne!(*first, *second);
    }

    #[test]
    fn should_not_permit_master_to_join_as_member() {
        let l = lights(3);
        let cluster = polar(&l[0], &[l[1].clone(), l[2].clone()]);

        let result = cluster.add(&[l[0].clone()]);

        assert_eq!(result, Err(MembershipError::MasterAsMember(l[0].id())));
    }

    #[test]
    fn should_reject_whole_batch_containing_master() {
        let l = lights(2);
        let cluster = PolarCluster::new("PC", l[0].clone());

        assert!(cluster.add(&[l[1].clone(), l[0].clone()]).is_err());
        assert!(cluster.members().is_empty());
    }

    #[test]
    fn should_consider_overlapping_tethers_incompatible() {
        let l = lights(3);
        let cluster = polar(&l[0], &[l[1].clone(), l[2].clone()]);
        let overlapping = tether(&[l[1].clone(), l[2].clone()]);
        assert!(!cluster.is_compatible(&overlapping));
    }

    #[test]
    fn should_consider_tethers_compatible_when_no_common_members() {
        let l = lights(4);
        let cluster = polar(&l[0], &[l[1].clone(), l[2].clone()]);
        let disjoint = tether(&[l[3].clone()]);
        assert!(cluster.is_compatible(&disjoint));

        disjoint.add(&[l[1].clone()]).unwrap();
        assert!(!cluster.is_compatible(&disjoint));
    }

    #[test]
    fn should_consider_tether_holding_master_compatible() {
        let l = lights(3);
        let cluster = polar(&l[0], &[l[1].clone()]);
        let paired = tether(&[l[0].clone(), l[2].clone()]);
        assert!(cluster.is_compatible(&paired));
    }

    #[test]
    fn should_produce_tethered_view_of_members() {
        let l = lights(4);
        let cluster = polar(&l[0], &[l[1].clone(), l[2].clone()]);

        let view = cluster.tethered_view();
        assert_eq!(view.member_ids(), vec![l[1].id(), l[2].id()]);
        assert!(!view.is_member(&[l[0].id()]));

        cluster.add(&[l[3].clone()]).unwrap();
        assert!(cluster.tethered_view().is_member(&[l[3].id()]));
    }

    #[test]
    fn should_update_master_and_oppose_members_when_requested() {
        let l = lights(2);
        let cluster = polar(&l[0], &[l[1].clone()]);
        assert_eq!(l[0].state(), LightState::StopThenGo);
        assert_eq!(l[1].state(), LightState::StopThenGo);

        cluster.set_master_state_to(LightState::Go);

        assert_eq!(l[0].state(), LightState::Go);
        assert_eq!(l[1].state(), LightState::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn should_raise_update_when_master_expires() {
        let configuration = Arc::new(Configuration::new());
        configuration.add(LightState::Go, StateDuration::from_secs(3));
        let light = Light::builder()
            .name("State Expired Test Light")
            .configuration(configuration)
            .build();
        let cluster = PolarCluster::new("PC", light.clone());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        cluster.subscribe_updates(move |update| sink.lock().unwrap().push(update.master_state));

        light.set_state(LightState::Go);
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(*received.lock().unwrap(), vec![LightState::Go]);
    }

    #[test]
    fn should_release_master_subscription_when_dropped() {
        let master = Light::builder().build();
        let cluster = PolarCluster::new("PC", master.clone());
        let subscription = cluster.master_subscription;

        drop(cluster);

        assert!(!master.unsubscribe(subscription));
    }
}
