//! Registry — the consistency gate between lights and clusters.
//!
//! Every light tracked here carries at most one tethered cluster and at most
//! one polar cluster (the polar cluster it drives as master). Clusters are
//! validated once, when they are registered; members added to a cluster
//! afterwards are not re-checked.
//!
//! Each `add_*` call is staged on a copy of the registry and only committed
//! when every light or cluster in the call passed, so a rejected call never
//! leaves anything behind.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use trafficsync_domain::error::RegistrationError;
use trafficsync_domain::id::LightId;

use crate::cluster::{Cluster, PolarCluster, TetheredCluster};
use crate::light::Light;

/// The clusters a light is assigned to.
#[derive(Debug, Clone, Default)]
pub struct ClusterPair {
    pub tethered: Option<Arc<TetheredCluster>>,
    /// Only set for the light that is the polar cluster's master.
    pub polar: Option<Arc<PolarCluster>>,
}

impl ClusterPair {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tethered.is_none() && self.polar.is_none()
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    light: Arc<Light>,
    pair: ClusterPair,
}

#[derive(Debug, Clone, Default)]
struct RegistryState {
    order: Vec<LightId>,
    tracked: HashMap<LightId, Tracked>,
    tethered: Vec<Arc<TetheredCluster>>,
    polar: Vec<Arc<PolarCluster>>,
}

/// Tracks every light and cluster and enforces their pairing rules.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track standalone lights.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::AlreadyTracked`] if any light is tracked
    /// already or appears twice in `lights`; nothing is tracked in that case.
    pub fn add_lights(&self, lights: &[Arc<Light>]) -> Result<(), RegistrationError> {
        self.commit(|staged| {
            for light in lights {
                if staged.tracked.contains_key(&light.id()) {
                    return Err(RegistrationError::AlreadyTracked(light.id()));
                }
                staged.track(light);
            }
            Ok(())
        })
        .inspect(|_| tracing::info!(count = lights.len(), "lights registered"))
    }

    /// Register tethered clusters, tracking any member not seen before.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistrationError`] found among the members of
    /// `clusters`; no cluster is registered in that case.
    pub fn add_tethered(&self, clusters: &[Arc<TetheredCluster>]) -> Result<(), RegistrationError> {
        self.commit(|staged| {
            for cluster in clusters {
                let members = cluster.members();
                for light in &members {
                    staged.check_tether_member(light, cluster)?;
                }
                let registered = staged.register_tethered(cluster);
                for light in &members {
                    staged.track(light).tethered = Some(Arc::clone(&registered));
                }
            }
            Ok(())
        })
        .inspect(|_| tracing::info!(count = clusters.len(), "tethered clusters registered"))
    }

    /// Register polar clusters, tracking the master and any member not seen
    /// before.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistrationError`] found among `clusters`; no
    /// cluster is registered in that case.
    pub fn add_polar(&self, clusters: &[Arc<PolarCluster>]) -> Result<(), RegistrationError> {
        self.commit(|staged| {
            for cluster in clusters {
                staged.check_polar(cluster)?;
                let registered = staged.register_polar(cluster);
                staged.track(cluster.master()).polar = Some(registered);
                for light in cluster.members() {
                    staged.track(&light);
                }
            }
            Ok(())
        })
        .inspect(|_| tracing::info!(count = clusters.len(), "polar clusters registered"))
    }

    /// Clusters assigned to `light_id`; empty when the light is not tracked.
    #[must_use]
    pub fn cluster_for(&self, light_id: LightId) -> ClusterPair {
        self.read()
            .tracked
            .get(&light_id)
            .map(|tracked| tracked.pair.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn cluster_for_light(&self, light: &Light) -> ClusterPair {
        self.cluster_for(light.id())
    }

    #[must_use]
    pub fn contains(&self, light_id: LightId) -> bool {
        self.read().tracked.contains_key(&light_id)
    }

    /// Tracked lights in the order they were first seen.
    #[must_use]
    pub fn lights(&self) -> Vec<Arc<Light>> {
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.tracked.get(id))
            .map(|tracked| Arc::clone(&tracked.light))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn tethered_clusters(&self) -> Vec<Arc<TetheredCluster>> {
        self.read().tethered.clone()
    }

    #[must_use]
    pub fn polar_clusters(&self) -> Vec<Arc<PolarCluster>> {
        self.read().polar.clone()
    }

    /// Polar clusters whose master belongs to no tethered cluster.
    ///
    /// These cycle on their own; the others follow the cadence of the tether
    /// their master belongs to.
    #[must_use]
    pub fn unpaired_polar_clusters(&self) -> Vec<Arc<PolarCluster>> {
        let state = self.read();
        let mut unpaired: Vec<Arc<PolarCluster>> = Vec::new();
        for id in &state.order {
            let Some(tracked) = state.tracked.get(id) else {
                continue;
            };
            if tracked.pair.tethered.is_some() {
                continue;
            }
            if let Some(polar) = &tracked.pair.polar
                && !unpaired.iter().any(|known| Arc::ptr_eq(known, polar))
            {
                unpaired.push(Arc::clone(polar));
            }
        }
        unpaired
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit<F>(&self, stage: F) -> Result<(), RegistrationError>
    where
        F: FnOnce(&mut RegistryState) -> Result<(), RegistrationError>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = state.clone();
        if let Err(error) = stage(&mut staged) {
            tracing::warn!(%error, "registration rejected");
            return Err(error);
        }
        *state = staged;
        Ok(())
    }
}

impl RegistryState {
    fn track(&mut self, light: &Arc<Light>) -> &mut ClusterPair {
        let id = light.id();
        if !self.tracked.contains_key(&id) {
            self.order.push(id);
        }
        &mut self
            .tracked
            .entry(id)
            .or_insert_with(|| Tracked {
                light: Arc::clone(light),
                pair: ClusterPair::default(),
            })
            .pair
    }

    fn polar_driven_by(&self, light_id: LightId) -> Option<&Arc<PolarCluster>> {
        self.polar
            .iter()
            .find(|cluster| cluster.master().id() == light_id)
    }

    fn polar_with_member(&self, light_id: LightId) -> Option<&Arc<PolarCluster>> {
        self.polar
            .iter()
            .find(|cluster| cluster.is_member(&[light_id]))
    }

    fn check_tether_member(
        &self,
        light: &Light,
        candidate: &TetheredCluster,
    ) -> Result<(), RegistrationError> {
        let light_id = light.id();
        let Some(tracked) = self.tracked.get(&light_id) else {
            return Ok(());
        };
        if let Some(polar) = self.polar_driven_by(light_id) {
            return Err(RegistrationError::PolarMasterInTether {
                light: light_id,
                polar: polar.id(),
            });
        }
        if let Some(polar) = self.polar_with_member(light_id)
            && !polar.is_compatible(candidate)
        {
            return Err(RegistrationError::IncompatiblePolar {
                polar: polar.id(),
                tether: candidate.id(),
            });
        }
        match (&tracked.pair.tethered, &tracked.pair.polar) {
            (None, None) => Ok(()),
            (None, Some(polar)) if polar.is_compatible(candidate) => Ok(()),
            (None, Some(polar)) => Err(RegistrationError::IncompatiblePolar {
                polar: polar.id(),
                tether: candidate.id(),
            }),
            (Some(existing), _) if **existing == *candidate => Ok(()),
            (Some(existing), _) => Err(RegistrationError::TetherConflict {
                light: light_id,
                tether: existing.id(),
            }),
        }
    }

    fn check_polar(&self, candidate: &PolarCluster) -> Result<(), RegistrationError> {
        for light in candidate.tethered_view().members() {
            let light_id = light.id();
            if let Some(polar) = self.polar_driven_by(light_id) {
                return Err(RegistrationError::PolarMasterConflict {
                    light: light_id,
                    polar: polar.id(),
                });
            }
            if let Some(polar) = self.polar_with_member(light_id)
                && **polar != *candidate
            {
                return Err(RegistrationError::PolarMemberConflict {
                    light: light_id,
                    polar: polar.id(),
                });
            }
            if let Some(tether) = self
                .tracked
                .get(&light_id)
                .and_then(|tracked| tracked.pair.tethered.as_ref())
                && !candidate.is_compatible(tether)
            {
                return Err(RegistrationError::IncompatiblePolar {
                    polar: candidate.id(),
                    tether: tether.id(),
                });
            }
        }

        let master_id = candidate.master().id();
        if let Some(polar) = self.polar_with_member(master_id) {
            return Err(RegistrationError::PolarMemberConflict {
                light: master_id,
                polar: polar.id(),
            });
        }
        let Some(tracked) = self.tracked.get(&master_id) else {
            return Ok(());
        };
        match (&tracked.pair.tethered, &tracked.pair.polar) {
            (None, None) => Ok(()),
            (Some(tether), _) if candidate.is_compatible(tether) => Ok(()),
            (Some(tether), _) => Err(RegistrationError::IncompatiblePolar {
                polar: candidate.id(),
                tether: tether.id(),
            }),
            (None, Some(existing)) if **existing == *candidate => Ok(()),
            (None, Some(existing)) => Err(RegistrationError::PolarMasterConflict {
                light: master_id,
                polar: existing.id(),
            }),
        }
    }

    /// The registered cluster equal to `cluster`, registering it if new.
    fn register_tethered(&mut self, cluster: &Arc<TetheredCluster>) -> Arc<TetheredCluster> {
        if let Some(existing) = self.tethered.iter().find(|known| ***known == **cluster) {
            return Arc::clone(existing);
        }
        self.tethered.push(Arc::clone(cluster));
        Arc::clone(cluster)
    }

    fn register_polar(&mut self, cluster: &Arc<PolarCluster>) -> Arc<PolarCluster> {
        if let Some(existing) = self.polar.iter().find(|known| ***known == **cluster) {
            return Arc::clone(existing);
        }
        self.polar.push(Arc::clone(cluster));
        Arc::clone(cluster)
    }
}
