//! Layout — turns the configured clusters into a populated registry.

use std::collections::HashMap;
use std::sync::Arc;

use trafficsync_app::cluster::{Cluster, PolarCluster, TetheredCluster};
use trafficsync_app::light::Light;
use trafficsync_app::registry::Registry;
use trafficsync_domain::error::{MembershipError, RegistrationError};
use trafficsync_domain::light::Configuration;

use crate::config::Config;

/// Errors raised while building the configured layout.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("cluster {cluster} rejected its lights")]
    Membership {
        cluster: String,
        #[source]
        source: MembershipError,
    },
    #[error("cluster registration rejected")]
    Registration(#[from] RegistrationError),
}

/// Lights by configured name, created on first mention.
struct Lights {
    configuration: Arc<Configuration>,
    by_name: HashMap<String, Arc<Light>>,
}

impl Lights {
    fn get(&mut self, name: &str) -> Arc<Light> {
        let configuration = &self.configuration;
        Arc::clone(self.by_name.entry(name.to_string()).or_insert_with(|| {
            Light::builder()
                .name(name)
                .configuration(Arc::clone(configuration))
                .build()
        }))
    }

    fn all(&mut self, names: &[String]) -> Vec<Arc<Light>> {
        names.iter().map(|name| self.get(name)).collect()
    }
}

/// Build every configured light and cluster and register them.
///
/// Tethered clusters are registered before polar clusters, so a polar master
/// may share a tether but a tether may not contain a polar master.
///
/// # Errors
///
/// Returns [`LayoutError`] if a cluster lists a light twice, a polar cluster
/// lists its master as a member, or the registry rejects a cluster.
pub fn build(config: &Config) -> Result<Arc<Registry>, LayoutError> {
    let mut lights = Lights {
        configuration: config.light_configuration(),
        by_name: HashMap::new(),
    };

    let mut tethered = Vec::with_capacity(config.tethered.len());
    for entry in &config.tethered {
        let cluster = TetheredCluster::new(entry.name.clone());
        cluster
            .add(&lights.all(&entry.lights))
            .map_err(|source| LayoutError::Membership {
                cluster: entry.name.clone(),
                source,
            })?;
        tethered.push(cluster);
    }

    let mut polar = Vec::with_capacity(config.polar.len());
    for entry in &config.polar {
        let cluster = PolarCluster::new(entry.name.clone(), lights.get(&entry.master));
        cluster
            .add(&lights.all(&entry.members))
            .map_err(|source| LayoutError::Membership {
                cluster: entry.name.clone(),
                source,
            })?;
        polar.push(cluster);
    }

    let registry = Registry::new();
    registry.add_tethered(&tethered)?;
    registry.add_polar(&polar)?;
    tracing::info!(
        lights = registry.len(),
        tethered = tethered.len(),
        polar = polar.len(),
        "layout built"
    );
    Ok(Arc::new(registry))
}
