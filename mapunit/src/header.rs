//! Unit header: category, scale range, extent and coding scale tiers.

use serde::{Deserialize, Serialize};

use crate::container::MapContainer;
use crate::errors::{ErrorKind, MapError, MapResult};
use crate::geometry::BoundingRect;
use crate::scales::UPPER_SCALE;

/// Section holding the encoded [`DataHeader`].
pub const HEADER_TAG: &str = "header";
/// Section holding the encoded scale index.
pub const INDEX_TAG: &str = "index";
/// Section holding the feature records.
pub const DATA_TAG: &str = "dat";

/// Header format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// What kind of data a unit carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitCategory {
    /// Detailed regional data.
    Country,
    /// Coarse global background.
    World,
    /// Coastline-only background.
    Coasts,
}

/// Parsed header of one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataHeader {
    pub format_version: u32,
    pub category: UnitCategory,
    pub bounds: BoundingRect,
    pub min_scale: u32,
    pub max_scale: u32,
    /// Coding scale tiers, strictly ascending. The last one is the finest
    /// tier actually stored.
    pub scales: Vec<u32>,
}

impl DataHeader {
    pub fn new(
        category: UnitCategory,
        bounds: BoundingRect,
        min_scale: u32,
        max_scale: u32,
        scales: Vec<u32>,
    ) -> Self {
        DataHeader {
            format_version: FORMAT_VERSION,
            category,
            bounds,
            min_scale,
            max_scale,
            scales,
        }
    }

    /// The finest coding scale stored in the unit.
    pub fn last_scale(&self) -> u32 {
        self.scales.last().copied().unwrap_or(0)
    }

    /// Index of the first tier able to answer `scale`; scales finer than the
    /// last tier map to the last tier.
    pub fn bucket_by_scale(&self, scale: u32) -> usize {
        bucket_by_scale(&self.scales, scale)
    }

    /// Checks the invariants a reader relies on.
    pub fn validate(&self) -> MapResult<()> {
        if self.format_version == 0 || self.format_version > FORMAT_VERSION {
            log::error!("Unsupported header version {}", self.format_version);
            return Err(MapError::new(
                &format!("Unsupported header version {}", self.format_version),
                ErrorKind::HeaderParseFailed,
            ));
        }
        if self.scales.is_empty() || self.scales.windows(2).any(|w| w[0] >= w[1]) {
            log::error!("Header scale tiers must be non-empty and ascending: {:?}", self.scales);
            return Err(MapError::new(
                "Header scale tiers must be non-empty and ascending",
                ErrorKind::HeaderParseFailed,
            ));
        }
        if self.min_scale > self.max_scale || self.last_scale() > UPPER_SCALE {
            log::error!(
                "Invalid header scale range [{}, {}] with last tier {}",
                self.min_scale,
                self.max_scale,
                self.last_scale()
            );
            return Err(MapError::new(
                "Invalid header scale range",
                ErrorKind::HeaderParseFailed,
            ));
        }
        if self.bounds.is_empty() {
            log::error!("Header bounds are empty: {}", self.bounds);
            return Err(MapError::new(
                "Header bounds are empty",
                ErrorKind::HeaderParseFailed,
            ));
        }
        Ok(())
    }

    pub fn encode(&self) -> MapResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy()).map_err(|e| {
            MapError::new(
                &format!("Failed to encode header: {}", e),
                ErrorKind::InternalError,
            )
        })
    }

    /// Decodes and validates a header section.
    pub fn decode(bytes: &[u8]) -> MapResult<Self> {
        let header: DataHeader =
            bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
                .map(|(header, _)| header)
                .map_err(|e| {
                    log::error!("Failed to decode header: {}", e);
                    MapError::new(
                        &format!("Failed to decode header: {}", e),
                        ErrorKind::HeaderParseFailed,
                    )
                })?;
        header.validate()?;
        Ok(header)
    }

    /// Reads the header section of an opened container.
    pub fn read(container: &dyn MapContainer) -> MapResult<Self> {
        let bytes = container.section(HEADER_TAG).map_err(|e| {
            MapError::new_with_cause(
                &format!("Unit {} has no readable header", container.name()),
                ErrorKind::HeaderParseFailed,
                e,
            )
        })?;
        DataHeader::decode(&bytes)
    }
}

pub(crate) fn bucket_by_scale(scales: &[u32], scale: u32) -> usize {
    scales
        .iter()
        .position(|&tier| scale <= tier)
        .unwrap_or(scales.len().saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> DataHeader {
        DataHeader::new(
            UnitCategory::Country,
            BoundingRect::new(0.0, 0.0, 10.0, 10.0),
            1,
            10,
            vec![3, 6, 10],
        )
    }

    #[test]
    fn test_bucket_by_scale() {
        let h = header();
        assert_eq!(h.bucket_by_scale(0), 0);
        assert_eq!(h.bucket_by_scale(3), 0);
        assert_eq!(h.bucket_by_scale(4), 1);
        assert_eq!(h.bucket_by_scale(10), 2);
        assert_eq!(h.bucket_by_scale(17), 2);
        assert_eq!(h.last_scale(), 10);
    }

    #[test]
    fn test_encode_decode() {
        let h = header();
        let bytes = h.encode().unwrap();
        assert_eq!(DataHeader::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = DataHeader::decode(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::HeaderParseFailed);
    }

    #[test]
    fn test_validate_rejects_unsorted_tiers() {
        let mut h = header();
        h.scales = vec![6, 3];
        assert_eq!(h.validate().unwrap_err().kind(), &ErrorKind::HeaderParseFailed);
        h.scales = Vec::new();
        assert!(h.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut h = header();
        h.min_scale = 11;
        assert!(h.validate().is_err());

        let mut h = header();
        h.scales = vec![5, UPPER_SCALE + 1];
        assert!(h.validate().is_err());

        let mut h = header();
        h.format_version = FORMAT_VERSION + 1;
        assert!(h.validate().is_err());

        let mut h = header();
        h.bounds = BoundingRect::empty();
        assert!(h.validate().is_err());
    }
}
