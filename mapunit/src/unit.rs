//! Unit identifiers, metadata and the opened resource handle.

use std::sync::{Arc, OnceLock};

use crate::container::{ContainerOpener, MapContainer};
use crate::errors::{ErrorKind, MapError, MapResult};
use crate::geometry::BoundingRect;
use crate::header::{DataHeader, UnitCategory, DATA_TAG, INDEX_TAG};
use crate::scale_index::ScaleIndex;

/// Dense registry slot number of a unit.
pub type UnitId = usize;

/// Globally unique handle of one feature record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    pub unit_id: UnitId,
    pub offset: u32,
}

impl FeatureId {
    pub fn new(unit_id: UnitId, offset: u32) -> Self {
        FeatureId { unit_id, offset }
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeatureId({}, {})", self.unit_id, self.offset)
    }
}

/// Lifecycle of a registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    Registered,
    /// Removal requested while locks were outstanding.
    PendingRemoval,
    /// Slot retired; its id may be reused.
    Removed,
}

/// Metadata of one registered unit.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitInfo {
    pub id: UnitId,
    pub name: String,
    pub format_version: u32,
    pub bounds: BoundingRect,
    pub min_scale: u32,
    pub max_scale: u32,
    pub category: UnitCategory,
    pub status: UnitStatus,
}

impl UnitInfo {
    pub fn from_header(id: UnitId, name: &str, header: &DataHeader) -> Self {
        UnitInfo {
            id,
            name: name.to_string(),
            format_version: header.format_version,
            bounds: header.bounds,
            min_scale: header.min_scale,
            max_scale: header.max_scale,
            category: header.category,
            status: UnitStatus::Registered,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.status == UnitStatus::Registered
    }

    /// True when `scale` is in the unit's range and `rect` touches its bounds.
    pub fn matches(&self, rect: &BoundingRect, scale: u32) -> bool {
        self.min_scale <= scale && scale <= self.max_scale && rect.intersects(&self.bounds)
    }
}

/// An opened unit: its container, parsed header and lazily decoded sections.
///
/// The value is immutable once constructed apart from the one-time decoding
/// of the index and feature sections, and is shared between every lock
/// taken on the same generation of the unit.
#[derive(Debug)]
pub struct UnitValue {
    name: String,
    container: Box<dyn MapContainer>,
    header: DataHeader,
    index: OnceLock<MapResult<Arc<ScaleIndex>>>,
    features: OnceLock<MapResult<Arc<[u8]>>>,
}

impl UnitValue {
    /// Opens the container of `name` and parses its header.
    pub fn open(opener: &dyn ContainerOpener, name: &str) -> MapResult<Self> {
        let container = opener.open(name)?;
        let header = DataHeader::read(container.as_ref())?;
        log::debug!("Opened unit {} ({:?}, {})", name, header.category, header.bounds);
        Ok(UnitValue {
            name: name.to_string(),
            container,
            header,
            index: OnceLock::new(),
            features: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    /// The unit's scale index, decoded on first use.
    pub fn scale_index(&self) -> MapResult<Arc<ScaleIndex>> {
        self.index
            .get_or_init(|| {
                let bytes = self.container.section(INDEX_TAG).map_err(|e| {
                    MapError::new_with_cause(
                        &format!("Unit {} has no readable index", self.name),
                        ErrorKind::IndexDecodeFailed,
                        e,
                    )
                })?;
                ScaleIndex::decode(&bytes, &self.header).map(Arc::new)
            })
            .clone()
    }

    /// The unit's feature data section, read on first use.
    pub fn features(&self) -> MapResult<Arc<[u8]>> {
        self.features
            .get_or_init(|| self.container.section(DATA_TAG))
            .clone()
    }
}
