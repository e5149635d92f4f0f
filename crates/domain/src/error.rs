//! Typed errors returned by membership and registration checks.
//!
//! A rejected operation never leaves partial state behind: either every light
//! or cluster in the call is accepted, or none is.

use crate::id::{ClusterId, LightId};

/// Why a cluster refused to take a set of lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError {
    #[error("light {0} is already a member of the cluster")]
    DuplicateLight(LightId),
    #[error("light {0} is the master of the polar cluster and cannot be a member")]
    MasterAsMember(LightId),
}

/// Why the registry refused to track a set of lights or clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("light {0} is already tracked")]
    AlreadyTracked(LightId),
    #[error("light {light} is the master of polar cluster {polar} and cannot join a tether")]
    PolarMasterInTether { light: LightId, polar: ClusterId },
    #[error("light {light} already belongs to tethered cluster {tether}")]
    TetherConflict { light: LightId, tether: ClusterId },
    #[error("polar cluster {polar} is not compatible with tethered cluster {tether}")]
    IncompatiblePolar { polar: ClusterId, tether: ClusterId },
    #[error("light {light} is already a member of polar cluster {polar}")]
    PolarMemberConflict { light: LightId, polar: ClusterId },
    #[error("light {light} already drives polar cluster {polar}")]
    PolarMasterConflict { light: LightId, polar: ClusterId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_mention_light_in_duplicate_message() {
        let id = LightId::new();
        let message = MembershipError::DuplicateLight(id).to_string();
        assert!(message.contains(&id.to_string()));
    }

    #[test]
    fn should_mention_both_clusters_when_incompatible() {
        let polar = ClusterId::new();
        let tether = ClusterId::new();
        let message = RegistrationError::IncompatiblePolar { polar, tether }.to_string();
        assert!(message.contains(&polar.to_string()));
        assert!(message.contains(&tether.to_string()));
    }
}
