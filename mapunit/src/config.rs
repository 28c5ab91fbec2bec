use std::sync::Arc;

use crate::container::ContainerOpener;
use crate::covering::DEFAULT_VIEWPORT_MAX_CELLS;
use crate::errors::{ErrorKind, MapError, MapResult};
use crate::map_index::MapIndex;

/// Tunables of a [`MapIndex`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapIndexConfig {
    handle_cache_size: Option<usize>,
    viewport_max_cells: usize,
}

impl Default for MapIndexConfig {
    fn default() -> Self {
        MapIndexConfig {
            handle_cache_size: None,
            viewport_max_cells: DEFAULT_VIEWPORT_MAX_CELLS,
        }
    }
}

impl MapIndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle handles kept open after their last lock drops; `None` keeps all.
    pub fn handle_cache_size(&self) -> Option<usize> {
        self.handle_cache_size
    }

    pub fn set_handle_cache_size(&mut self, size: Option<usize>) {
        self.handle_cache_size = size;
    }

    /// Cell budget of `ViewportWithLowLevels` coverings.
    pub fn viewport_max_cells(&self) -> usize {
        self.viewport_max_cells
    }

    pub fn set_viewport_max_cells(&mut self, max_cells: usize) -> MapResult<()> {
        if max_cells == 0 {
            log::error!("Viewport cell budget must be positive");
            return Err(MapError::new(
                "Viewport cell budget must be positive",
                ErrorKind::InvalidArgument,
            ));
        }
        self.viewport_max_cells = max_cells;
        Ok(())
    }
}

/// Builder for a [`MapIndex`].
///
/// Configuration errors are captured as they happen and returned from
/// [`build`](MapIndexBuilder::build), so calls can be chained freely.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use mapunit::container::MemoryOpener;
/// use mapunit::MapIndex;
///
/// let index = MapIndex::builder()
///     .opener(Arc::new(MemoryOpener::new()))
///     .handle_cache_size(16)
///     .viewport_max_cells(12)
///     .build()
///     .unwrap();
/// assert_eq!(index.config().viewport_max_cells(), 12);
/// ```
#[derive(Default)]
pub struct MapIndexBuilder {
    error: Option<MapError>,
    config: MapIndexConfig,
    opener: Option<Arc<dyn ContainerOpener>>,
}

impl MapIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source of unit containers. Required.
    pub fn opener(mut self, opener: Arc<dyn ContainerOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Bounds the number of idle handles kept open.
    pub fn handle_cache_size(mut self, size: usize) -> Self {
        self.config.set_handle_cache_size(Some(size));
        self
    }

    pub fn viewport_max_cells(mut self, max_cells: usize) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_viewport_max_cells(max_cells) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn build(self) -> MapResult<MapIndex> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let Some(opener) = self.opener else {
            log::error!("No container opener configured");
            return Err(MapError::new(
                "No container opener configured",
                ErrorKind::InvalidArgument,
            ));
        };
        Ok(MapIndex::with_config(opener, self.config))
    }
}
