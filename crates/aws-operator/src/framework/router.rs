use snafu::ensure;

use crate::{
    error::{InvalidConfigSnafu, InvalidVersionSnafu, Result},
    framework::{ReconcileObject, ResourceSet},
};

/// Selects the single [`ResourceSet`] responsible for an object.
pub struct Router<K: ReconcileObject> {
    resource_sets: Vec<ResourceSet<K>>,
}

impl<K: ReconcileObject> Router<K> {
    pub fn new(resource_sets: Vec<ResourceSet<K>>) -> Result<Self> {
        ensure!(!resource_sets.is_empty(), InvalidConfigSnafu {
            reason: "a router needs at least one resource set",
        });

        Ok(Self { resource_sets })
    }

    /// Returns the resource set handling `obj`.
    ///
    /// Fails with [`InvalidVersion`](crate::error::Error::InvalidVersion) if no set handles
    /// the object and with [`InvalidConfig`](crate::error::Error::InvalidConfig) if more than
    /// one does. The result only depends on the object.
    pub fn resource_set(&self, obj: &K) -> Result<&ResourceSet<K>> {
        let mut matching = self.resource_sets.iter().filter(|set| set.handles(obj));

        let resource_set = matching.next().ok_or_else(|| {
            InvalidVersionSnafu {
                version: obj.version_bundle_version(),
            }
            .build()
        })?;

        let ambiguous = matching.count();
        ensure!(ambiguous == 0, InvalidConfigSnafu {
            reason: format!(
                "{} resource sets handle version bundle version {:?}",
                ambiguous + 1,
                obj.version_bundle_version()
            ),
        });

        Ok(resource_set)
    }
}
