//! Interface ownership claim and release

use super::DeviceAdapter;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What a claim call did to the interface field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceClaim {
    Claimed,
    Released,
    /// Already in the wanted state, or owned by someone else
    Unchanged,
}

impl DeviceAdapter {
    /// Claim an unowned interface for `owner`, or release it when `owner`
    /// holds it and `want` is false. Any other state is left alone.
    pub async fn claim_interface(&mut self, owner: &str, want: bool) -> Result<InterfaceClaim> {
        if self.record.is_none() {
            return Ok(InterfaceClaim::Unchanged);
        }

        let current = self.interface().await?;

        if current.is_empty() && want {
            self.set_interface(owner).await?;
            info!(
                ref_id = self.ref_id,
                name = %self.name,
                owner,
                "Device is used by owner, setting interface"
            );
            return Ok(InterfaceClaim::Claimed);
        }

        if current == owner && !want {
            self.set_interface("").await?;
            info!(
                ref_id = self.ref_id,
                name = %self.name,
                owner,
                "Device is no longer used by owner, removing interface"
            );
            return Ok(InterfaceClaim::Released);
        }

        Ok(InterfaceClaim::Unchanged)
    }

    /// [`claim_interface`](Self::claim_interface) for the configured owner
    pub async fn claim_for_owner(&mut self, want: bool) -> Result<InterfaceClaim> {
        let owner = self.settings.owner.clone();
        self.claim_interface(&owner, want).await
    }
}
