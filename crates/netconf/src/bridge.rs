//! Bridge devices.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::system::{Link, LinkKind, LinkProvider};

/// An existing (or freshly created) bridge.
#[derive(Debug)]
pub struct BridgeDevice<'a, S: ?Sized> {
    sys: &'a S,
    link: Link,
}

impl<'a, S: LinkProvider + ?Sized> BridgeDevice<'a, S> {
    /// Look up bridge `name`, creating it when absent.
    ///
    /// A non-bridge link already holding the name is an error.
    pub async fn open(sys: &'a S, name: &str) -> Result<Self> {
        if let Some(link) = sys.link_by_name(name).await? {
            if link.kind != LinkKind::Bridge {
                return Err(Error::LinkExists {
                    name: name.to_string(),
                    kind: link.kind.to_string(),
                });
            }
            return Ok(Self { sys, link });
        }

        info!(bridge = %name, "creating bridge");
        sys.add_bridge(name).await?;

        let link = sys
            .link_by_name(name)
            .await?
            .ok_or_else(|| Error::LinkNotFound(name.to_string()))?;
        Ok(Self { sys, link })
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Attach `port`; no-op when it is already enslaved to this bridge.
    pub async fn add_link(&self, port: &Link) -> Result<()> {
        if port.master == Some(self.link.index) {
            debug!(bridge = %self.link.name, port = %port.name, "already attached");
            return Ok(());
        }

        info!(bridge = %self.link.name, port = %port.name, "attaching port");
        self.sys.set_master(port, &self.link).await
    }
}
