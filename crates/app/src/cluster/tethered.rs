//! Tethered cluster — every member shows the same state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use trafficsync_domain::error::MembershipError;
use trafficsync_domain::event::LightStateExpired;
use trafficsync_domain::id::{ClusterId, LightId, SubscriptionId};
use trafficsync_domain::light::LightState;

use super::membership::Membership;
use super::{Cluster, ClusterUpdate};
use crate::event_bus::Subscribers;
use crate::light::Light;

/// Lights whose state must match the inbound signal.
///
/// The master is the first light ever added. When the master's state expires
/// the cluster raises a [`ClusterUpdate`] carrying the expired state.
pub struct TetheredCluster {
    id: ClusterId,
    name: String,
    me: Weak<TetheredCluster>,
    members: Membership,
    updates: Subscribers<ClusterUpdate<TetheredCluster>>,
    watches_members: bool,
    /// Expiration handlers installed on members, released on drop.
    member_subscriptions: Mutex<Vec<(Arc<Light>, SubscriptionId)>>,
}

impl TetheredCluster {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| Self {
            id: ClusterId::new(),
            name: name.into(),
            me: me.clone(),
            members: Membership::default(),
            updates: Subscribers::new(),
            watches_members: true,
            member_subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// A cluster holding `lights` that never listens to them, used as a
    /// read-only view for compatibility checks.
    pub(crate) fn detached(name: String, lights: Vec<Arc<Light>>) -> Self {
        Self {
            id: ClusterId::new(),
            name,
            me: Weak::new(),
            members: Membership::from_lights(lights),
            updates: Subscribers::new(),
            watches_members: false,
            member_subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// The light whose expirations drive the cluster, `None` while empty.
    #[must_use]
    pub fn master(&self) -> Option<Arc<Light>> {
        self.members.first()
    }

    pub fn subscribe_updates<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ClusterUpdate<TetheredCluster>) + Send + Sync + 'static,
    {
        self.updates.subscribe(handler)
    }

    pub fn unsubscribe_updates(&self, id: SubscriptionId) -> bool {
        self.updates.unsubscribe(id)
    }

    pub(crate) fn member_id_set(&self) -> HashSet<LightId> {
        self.members.id_set()
    }

    fn after_add(&self, light: &Arc<Light>) {
        let cluster = self.me.clone();
        let subscription = light.subscribe_state_expired(move |event| {
            if let Some(cluster) = cluster.upgrade() {
                cluster.on_light_expired(event);
            }
        });
        self.member_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Arc::clone(light), subscription));
    }

    fn on_light_expired(self: &Arc<Self>, event: &LightStateExpired) {
        let is_master = self
            .master()
            .is_some_and(|master| master.id() == event.light_id);
        if !is_master {
            return;
        }
        tracing::debug!(cluster_id = %self.id, name = %self.name, state = %event.state, "tethered cluster requires update");
        self.updates.publish(&ClusterUpdate {
            cluster: Arc::clone(self),
            master_state: event.state,
        });
    }
}

impl Cluster for TetheredCluster {
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
        self.members.extend(lights)?;
        if self.watches_members {
            for light in lights {
                self.after_add(light);
            }
        }
        Ok(())
    }

    /// Apply `state` to every member.
    fn set_master_state_to(&self, state: LightState) {
        for light in self.members.snapshot() {
            light.set_state(state);
        }
    }
}

impl Drop for TetheredCluster {
    fn drop(&mut self) {
        let subscriptions = self
            .member_subscriptions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (light, subscription) in subscriptions.drain(..) {
            light.unsubscribe(subscription);
        }
    }
}

impl PartialEq for TetheredCluster {
    fn eq(&self, other: &Self) -> bool {
        self.member_id_set() == other.member_id_set()
    }
}

impl std::fmt::Debug for TetheredCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetheredCluster")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.member_ids())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for TetheredCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name: {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use trafficsync_domain::light::{Configuration, StateDuration};

    use super::*;

    fn lights(count: usize) -> Vec<Arc<Light>> {
        (0..count).map(|_| Light::builder().build()).collect()
    }

    #[test]
    fn should_treat_clusters_with_identical_sets_as_equal() {
        let l = lights(3);
        let first = TetheredCluster::new("TC-1");
        let second = TetheredCluster::new("TC-2");
        first.add(&[l[0].clone(), l[1].clone()]).unwrap();
        second.add(&[l[1].clone(), l[0].clone()]).unwrap();
        assert_eq!(*first, *second);

        second.add(&[l[2].clone()]).unwrap();
        assert_ne!(*first, *second);
    }

    #[test]
    fn should_treat_empty_clusters_as_equal() {
        assert_eq!(*TetheredCluster::new("a"), *TetheredCluster::new("b"));
    }

    #[test]
    fn should_reject_light_already_present() {
        let l = lights(2);
        let cluster = TetheredCluster::new("TC-1");
        cluster.add(&[l[0].clone()]).unwrap();

        let result = cluster.add(&[l[1].clone(), l[0].clone()]);

        assert_eq!(result, Err(MembershipError::DuplicateLight(l[0].id())));
        assert_eq!(cluster.member_ids(), vec![l[0].id()]);
    }

    #[test]
    fn should_report_membership_of_every_given_id() {
        let l = lights(3);
        let cluster = TetheredCluster::new("TC-1");
        cluster.add(&[l[0].clone(), l[1].clone()]).unwrap();

        assert!(cluster.is_member(&[l[0].id(), l[1].id()]));
        assert!(!cluster.is_member(&[l[0].id(), l[2].id()]));
        assert!(cluster.is_member(&[]));
    }

    #[test]
    fn should_use_first_inserted_light_as_master() {
        let l = lights(2);
        let cluster = TetheredCluster::new("TC-1");
        assert!(cluster.master().is_none());

        cluster.add(&[l[1].clone(), l[0].clone()]).unwrap();

        assert_eq!(cluster.master().unwrap().id(), l[1].id());
    }

    #[test]
    fn should_update_every_member_when_requested() {
        let l = lights(2);
        let cluster = TetheredCluster::new("TC-1");
        cluster.add(&l).unwrap();
        assert!(l.iter().all(|light| light.state() == LightState::StopThenGo));

        cluster.set_master_state_to(LightState::Go);

        assert!(l.iter().all(|light| light.state() == LightState::Go));
    }

    #[tokio::test(start_paused = true)]
    async fn should_raise_update_when_master_expires() {
        let configuration = Arc::new(Configuration::new());
        configuration.add(LightState::Go, StateDuration::from_secs(3));
        let light = Light::builder()
            .name("State Expired Test Light")
            .configuration(configuration)
            .build();
        let cluster = TetheredCluster::new("TC-1");
        cluster.add(&[light.clone()]).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        cluster.subscribe_updates(move |update| {
            sink.lock()
                .unwrap()
                .push((update.cluster.id(), update.master_state));
        });

        light.set_state(LightState::Go);
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(*received.lock().unwrap(), vec![(cluster.id(), LightState::Go)]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_expiration_of_non_master_member() {
        let configuration = Arc::new(Configuration::new());
        configuration.add(LightState::Go, StateDuration::from_secs(1));
        let master = Light::builder().build();
        let member = Light::builder().configuration(configuration).build();
        let cluster = TetheredCluster::new("TC-1");
        cluster.add(&[master, member.clone()]).unwrap();
        let received = Arc::new(Mutex::new(0_usize));
        let sink = Arc::clone(&received);
        cluster.subscribe_updates(move |_| *sink.lock().unwrap() += 1);

        member.set_state(LightState::Go);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(*received.lock().unwrap(), 0);
    }

    #[test]
    fn should_not_watch_members_of_detached_view() {
        let light = Light::builder().build();
        let view = TetheredCluster::detached("view".to_string(), vec![light.clone()]);
        assert!(view.is_member(&[light.id()]));
        assert!(view.master().is_some());
        assert!(!view.watches_members);
    }

    #[test]
    fn should_release_member_subscriptions_when_dropped() {
        let l = lights(2);
        let cluster = TetheredCluster::new("TC-1");
        cluster.add(&l).unwrap();
        let subscriptions: Vec<_> = cluster
            .member_subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(light, id)| (Arc::clone(light), *id))
            .collect();
        assert_eq!(subscriptions.len(), 2);

        drop(cluster);

        for (light, id) in subscriptions {
            assert!(!light.unsubscribe(id));
        }
    }
}
