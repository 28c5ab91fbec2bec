use crate::errors::{ErrorKind, MapError, MapResult};
use crate::feature::FeatureDecoder;
use crate::header::UnitCategory;
use crate::map_index::MapIndex;
use crate::registry::UnitLock;
use crate::unit::{FeatureId, UnitId};

/// Keeps one unit locked and loads its features by offset.
///
/// The guard holds the unit's handle for as long as it lives, so offsets
/// collected by a query stay loadable even if the unit is updated or removed
/// meanwhile.
pub struct FeaturesLoaderGuard<D: FeatureDecoder> {
    lock: UnitLock,
    decoder: D,
}

impl<D: FeatureDecoder> FeaturesLoaderGuard<D> {
    pub fn new(index: &MapIndex, id: UnitId, decoder: D) -> Self {
        FeaturesLoaderGuard {
            lock: index.lock_unit(id),
            decoder,
        }
    }

    pub fn id(&self) -> UnitId {
        self.lock.id()
    }

    /// Name of the unit, or an empty string if it could not be locked.
    pub fn file_name(&self) -> &str {
        self.lock.file_name()
    }

    pub fn is_world(&self) -> bool {
        self.lock
            .header()
            .is_some_and(|header| header.category == UnitCategory::World)
    }

    pub fn is_valid(&self) -> bool {
        self.lock.is_valid()
    }

    /// Decodes the feature stored at `offset`.
    pub fn get_feature(&self, offset: u32) -> MapResult<D::Feature> {
        let Some(value) = self.lock.value() else {
            log::error!("Unit {} is not available for loading", self.lock.id());
            return Err(MapError::new(
                &format!("Unit {} is not available for loading", self.lock.id()),
                ErrorKind::UnknownUnit,
            ));
        };
        let data = value.features()?;
        self.decoder
            .decode(&data, offset, FeatureId::new(self.lock.id(), offset))
    }
}
