use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::config::{MapIndexBuilder, MapIndexConfig};
use crate::container::ContainerOpener;
use crate::covering::{CoveringGetter, CoveringMode};
use crate::errors::MapResult;
use crate::feature::FeatureDecoder;
use crate::geometry::BoundingRect;
use crate::header::UnitCategory;
use crate::loader_guard::FeaturesLoaderGuard;
use crate::registry::{UnitLock, UnitRegistry};
use crate::unit::{FeatureId, UnitId, UnitInfo, UnitValue};

/// How a query ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Every matching feature was visited.
    Completed,
    /// The visitor asked to stop.
    Stopped,
}

impl QueryOutcome {
    pub fn is_stopped(&self) -> bool {
        *self == QueryOutcome::Stopped
    }
}

impl From<ControlFlow<()>> for QueryOutcome {
    fn from(flow: ControlFlow<()>) -> Self {
        match flow {
            ControlFlow::Continue(()) => QueryOutcome::Completed,
            ControlFlow::Break(()) => QueryOutcome::Stopped,
        }
    }
}

/// Spatial query front end over a [`UnitRegistry`].
///
/// A query takes one snapshot of the registry, locks each matching unit for
/// the time it is being read and visits every feature of the unit reachable
/// from the query's covering once. Country units are visited in registry
/// order first, then coastline units, then world units, so background data
/// never comes before detailed data for the same area.
///
/// A unit that vanished since the snapshot, failed to open or has an
/// unreadable index is skipped; it never fails the whole query.
///
/// `MapIndex` is cheap to clone and every clone shares the same registry.
///
/// # Examples
///
/// ```rust
/// use std::ops::ControlFlow;
/// use std::sync::Arc;
/// use mapunit::builder::UnitBuilder;
/// use mapunit::container::MemoryOpener;
/// use mapunit::{BoundingRect, CoveringMode, MapIndex, UnitCategory};
///
/// let opener = Arc::new(MemoryOpener::new());
/// let bounds = BoundingRect::new(0.0, 0.0, 10.0, 10.0);
/// let mut unit = UnitBuilder::new(UnitCategory::Country, bounds, 1, 10, vec![5, 10]);
/// let offset = unit.add_feature(b"park", &BoundingRect::new(1.0, 1.0, 2.0, 2.0), 3).unwrap();
/// opener.insert(unit.into_memory_container("A").unwrap());
///
/// let index = MapIndex::new(opener);
/// let id = index.register_unit("A").unwrap();
///
/// let mut found = Vec::new();
/// index.for_each_feature_id_in_rect(
///     |fid| {
///         found.push(fid);
///         ControlFlow::Continue(())
///     },
///     &bounds,
///     5,
///     CoveringMode::ViewportWithLowLevels,
/// );
/// assert_eq!(found.len(), 1);
/// assert_eq!((found[0].unit_id, found[0].offset), (id, offset));
/// ```
#[derive(Clone)]
pub struct MapIndex {
    inner: Arc<MapIndexInner>,
}

struct MapIndexInner {
    registry: UnitRegistry,
    config: MapIndexConfig,
}

impl std::fmt::Debug for MapIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapIndex")
            .field("config", &self.inner.config)
            .field("units", &self.inner.registry.len())
            .finish()
    }
}

impl MapIndex {
    pub fn builder() -> MapIndexBuilder {
        MapIndexBuilder::new()
    }

    /// Creates an index with the default configuration.
    pub fn new(opener: Arc<dyn ContainerOpener>) -> Self {
        Self::with_config(opener, MapIndexConfig::default())
    }

    pub fn with_config(opener: Arc<dyn ContainerOpener>, config: MapIndexConfig) -> Self {
        MapIndex {
            inner: Arc::new(MapIndexInner {
                registry: UnitRegistry::new(opener, config.handle_cache_size()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &MapIndexConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.inner.registry
    }

    pub fn register_unit(&self, name: &str) -> MapResult<UnitId> {
        self.inner.registry.register_unit(name)
    }

    /// Re-reads unit `name`; returns its new bounds.
    pub fn update_unit(&self, name: &str) -> MapResult<BoundingRect> {
        self.inner.registry.update_unit(name)
    }

    pub fn remove_unit(&self, name: &str) -> MapResult<()> {
        self.inner.registry.remove_unit(name)
    }

    pub fn lock_unit(&self, id: UnitId) -> UnitLock {
        self.inner.registry.lock_unit(id)
    }

    pub fn snapshot(&self) -> Vec<UnitInfo> {
        self.inner.registry.snapshot()
    }

    /// Visits the id of every feature of `rect` at `scale`.
    pub fn for_each_feature_id_in_rect<F>(
        &self,
        mut visitor: F,
        rect: &BoundingRect,
        scale: u32,
        mode: CoveringMode,
    ) -> QueryOutcome
    where
        F: FnMut(FeatureId) -> ControlFlow<()>,
    {
        self.for_each_offset(rect, scale, mode, |_, id| visitor(id))
    }

    /// Visits every feature of `rect` at `scale`, decoded by `decoder`.
    ///
    /// Decoding failures are handed to the visitor, which decides whether to
    /// go on.
    pub fn for_each_in_rect<D, F>(
        &self,
        decoder: &D,
        mut visitor: F,
        rect: &BoundingRect,
        scale: u32,
        mode: CoveringMode,
    ) -> QueryOutcome
    where
        D: FeatureDecoder + ?Sized,
        F: FnMut(MapResult<D::Feature>) -> ControlFlow<()>,
    {
        self.for_each_offset(rect, scale, mode, |value, id| {
            let feature = value
                .features()
                .and_then(|data| decoder.decode(&data, id.offset, id));
            visitor(feature)
        })
    }

    /// Visits every feature visible at `scale`, wherever it is.
    pub fn for_each_in_scale<D, F>(&self, decoder: &D, visitor: F, scale: u32) -> QueryOutcome
    where
        D: FeatureDecoder + ?Sized,
        F: FnMut(MapResult<D::Feature>) -> ControlFlow<()>,
    {
        self.for_each_in_rect(
            decoder,
            visitor,
            &BoundingRect::infinite(),
            scale,
            CoveringMode::FullCover,
        )
    }

    pub fn for_each_feature_id_in_scale<F>(&self, visitor: F, scale: u32) -> QueryOutcome
    where
        F: FnMut(FeatureId) -> ControlFlow<()>,
    {
        self.for_each_feature_id_in_rect(
            visitor,
            &BoundingRect::infinite(),
            scale,
            CoveringMode::FullCover,
        )
    }

    /// Locks unit `id` for point lookups through `decoder`.
    pub fn features_loader<D: FeatureDecoder>(&self, id: UnitId, decoder: D) -> FeaturesLoaderGuard<D> {
        FeaturesLoaderGuard::new(self, id, decoder)
    }

    fn for_each_offset<F>(
        &self,
        rect: &BoundingRect,
        scale: u32,
        mode: CoveringMode,
        mut visitor: F,
    ) -> QueryOutcome
    where
        F: FnMut(&UnitValue, FeatureId) -> ControlFlow<()>,
    {
        let units = self.inner.registry.snapshot();
        let mut covering = CoveringGetter::new(*rect, mode, self.inner.config.viewport_max_cells());

        let mut coasts = Vec::new();
        let mut world = Vec::new();
        for info in units.iter().filter(|info| info.matches(rect, scale)) {
            match info.category {
                UnitCategory::Country => {
                    if self
                        .visit_unit(info, scale, &mut covering, &mut visitor)
                        .is_break()
                    {
                        return QueryOutcome::Stopped;
                    }
                }
                UnitCategory::Coasts => coasts.push(info),
                UnitCategory::World => world.push(info),
            }
        }

        for info in coasts.into_iter().chain(world) {
            if self
                .visit_unit(info, scale, &mut covering, &mut visitor)
                .is_break()
            {
                return QueryOutcome::Stopped;
            }
        }
        QueryOutcome::Completed
    }

    fn visit_unit<F>(
        &self,
        info: &UnitInfo,
        scale: u32,
        covering: &mut CoveringGetter,
        visitor: &mut F,
    ) -> ControlFlow<()>
    where
        F: FnMut(&UnitValue, FeatureId) -> ControlFlow<()>,
    {
        let lock = self.inner.registry.lock_unit(info.id);
        // Removed since the snapshot, or its slot already went to another unit.
        let Some(value) = lock
            .value()
            .map(|value| &**value)
            .filter(|value| value.name() == info.name)
        else {
            log::debug!("Skipping unit {} ({}): not available", info.name, info.id);
            return ControlFlow::Continue(());
        };

        let index = match value.scale_index() {
            Ok(index) => index,
            Err(err) => {
                log::warn!("Skipping unit {} ({}): {}", info.name, info.id, err);
                return ControlFlow::Continue(());
            }
        };

        let last_scale = value.header().last_scale();
        let scale = scale.min(last_scale);
        let mut seen = HashSet::new();
        for &(begin, end) in covering.get(last_scale) {
            index.for_each_in_interval_and_scale(
                |offset| {
                    if seen.insert(offset) {
                        visitor(value, FeatureId::new(info.id, offset))
                    } else {
                        ControlFlow::Continue(())
                    }
                },
                begin,
                end,
                scale,
            )?;
        }
        ControlFlow::Continue(())
    }
}
