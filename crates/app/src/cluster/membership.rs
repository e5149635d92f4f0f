//! Ordered, duplicate-free member list shared by both cluster flavours.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use trafficsync_domain::error::MembershipError;
use trafficsync_domain::id::LightId;

use crate::light::Light;

#[derive(Debug, Default)]
pub(crate) struct Membership {
    lights: RwLock<Vec<Arc<Light>>>,
}

impl Membership {
    pub(crate) fn from_lights(lights: Vec<Arc<Light>>) -> Self {
        Self {
            lights: RwLock::new(lights),
        }
    }

    /// Append all of `incoming` unless that would repeat a light.
    pub(crate) fn extend(&self, incoming: &[Arc<Light>]) -> Result<(), MembershipError> {
        let mut lights = self.lights.write().unwrap_or_else(PoisonError::into_inner);
        let mut seen: HashSet<LightId> = lights.iter().map(|light| light.id()).collect();
        if let Some(duplicate) = incoming.iter().find(|light| !seen.insert(light.id())) {
            return Err(MembershipError::DuplicateLight(duplicate.id()));
        }
        lights.extend(incoming.iter().cloned());
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Light>> {
        self.lights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn first(&self) -> Option<Arc<Light>> {
        self.lights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }

    pub(crate) fn id_set(&self) -> HashSet<LightId> {
        self.lights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|light| light.id())
            .collect()
    }
}
