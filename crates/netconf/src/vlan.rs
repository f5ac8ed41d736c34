//! 802.1Q VLAN sub-interfaces.

use tracing::{debug, info};

use crate::config::VlanDefinition;
use crate::error::{Error, Result};
use crate::system::{Link, LinkKind, LinkProvider};

/// Ensure the VLAN `def` describes exists on `parent`.
///
/// An existing VLAN of that name is returned as is; any other link kind
/// holding the name is an error.
pub async fn new_vlan<S: LinkProvider + ?Sized>(
    sys: &S,
    parent: &Link,
    def: &VlanDefinition,
) -> Result<Link> {
    let name = def.device_name(&parent.name);
    let id = def.id;

    if let Some(link) = sys.link_by_name(&name).await? {
        if link.kind != LinkKind::Vlan {
            return Err(Error::LinkExists {
                name,
                kind: link.kind.to_string(),
            });
        }
        debug!(vlan = %name, "vlan exists");
        return Ok(link);
    }

    info!(vlan = %name, parent = %parent.name, id, "creating vlan");
    sys.add_vlan(parent, &name, id).await?;

    sys.link_by_name(&name)
        .await?
        .ok_or(Error::LinkNotFound(name))
}
