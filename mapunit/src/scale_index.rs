//! Per-unit scale index.
//!
//! For every coding scale tier of a unit the index keeps a table of
//! `(cell code, feature offset)` pairs sorted by code. A lookup for a cell
//! interval binary-searches each eligible tier, so the cost is logarithmic in
//! the table size plus the number of hits.
//!
//! A feature first visible at scale `s` is stored in the first tier whose
//! scale is `>= s`; a query at scale `q` reads every tier up to the one that
//! answers `q`, so coarse features stay visible at finer scales.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::cell_id::CellId;
use crate::covering::cover_area;
use crate::errors::{ErrorKind, MapError, MapResult};
use crate::geometry::BoundingRect;
use crate::header::{bucket_by_scale, DataHeader};
use crate::scales::{coding_depth, coding_level};

/// Cell budget used to cover one feature while building.
pub const FEATURE_MAX_CELLS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct IndexEntry {
    code: u64,
    offset: u32,
}

/// Immutable, binary-searchable index of one unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleIndex {
    scales: Vec<u32>,
    tiers: Vec<Vec<IndexEntry>>,
}

impl ScaleIndex {
    /// Decodes an index section and checks it against the unit header.
    pub fn decode(bytes: &[u8], header: &DataHeader) -> MapResult<Self> {
        let index: ScaleIndex =
            bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
                .map(|(index, _)| index)
                .map_err(|e| {
                    log::error!("Failed to decode scale index: {}", e);
                    MapError::new(
                        &format!("Failed to decode scale index: {}", e),
                        ErrorKind::IndexDecodeFailed,
                    )
                })?;

        if index.scales != header.scales || index.tiers.len() != index.scales.len() {
            log::error!(
                "Scale index tiers {:?} do not match header tiers {:?}",
                index.scales,
                header.scales
            );
            return Err(MapError::new(
                "Scale index tiers do not match header",
                ErrorKind::IndexDecodeFailed,
            ));
        }
        if index.tiers.iter().any(|t| t.windows(2).any(|w| w[0] > w[1])) {
            log::error!("Scale index tier is not sorted");
            return Err(MapError::new(
                "Scale index tier is not sorted",
                ErrorKind::IndexDecodeFailed,
            ));
        }
        Ok(index)
    }

    pub fn encode(&self) -> MapResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy()).map_err(|e| {
            MapError::new(
                &format!("Failed to encode scale index: {}", e),
                ErrorKind::InternalError,
            )
        })
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Total number of `(code, offset)` entries over all tiers.
    pub fn entry_count(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    /// Visits every feature offset stored under a code in `[begin, end)` in
    /// the tiers answering `scale`, in ascending offset order.
    ///
    /// `scale` is capped to the last tier. An offset stored under several
    /// codes of the interval is visited once.
    pub fn for_each_in_interval_and_scale<F>(
        &self,
        mut visitor: F,
        begin: u64,
        end: u64,
        scale: u32,
    ) -> ControlFlow<()>
    where
        F: FnMut(u32) -> ControlFlow<()>,
    {
        if self.tiers.is_empty() || begin >= end {
            return ControlFlow::Continue(());
        }

        let bucket = bucket_by_scale(&self.scales, scale);
        let mut offsets = Vec::new();
        for tier in &self.tiers[..=bucket] {
            let start = tier.partition_point(|e| e.code < begin);
            offsets.extend(
                tier[start..]
                    .iter()
                    .take_while(|e| e.code < end)
                    .map(|e| e.offset),
            );
        }
        offsets.sort_unstable();
        offsets.dedup();

        for offset in offsets {
            visitor(offset)?;
        }
        ControlFlow::Continue(())
    }
}

/// Builds a [`ScaleIndex`] for one unit.
///
/// Features are keyed by the pre-order codes of the cells covering them, in
/// a tree as deep as the unit's last coding scale requires. That is the same
/// depth queries use for the unit, so the two sides always agree.
#[derive(Debug)]
pub struct ScaleIndexBuilder {
    scales: Vec<u32>,
    depth: u32,
    tiers: Vec<Vec<IndexEntry>>,
}

impl ScaleIndexBuilder {
    pub fn new(header: &DataHeader) -> Self {
        ScaleIndexBuilder {
            scales: header.scales.clone(),
            depth: coding_depth(header.last_scale()),
            tiers: vec![Vec::new(); header.scales.len()],
        }
    }

    /// Indexes the feature at `offset`, first visible at `min_scale`.
    ///
    /// A feature with an area is covered by a few cells; a point or segment
    /// goes into the cell containing its center.
    pub fn add_feature(
        &mut self,
        offset: u32,
        rect: &BoundingRect,
        min_scale: u32,
    ) -> MapResult<()> {
        if rect.is_empty() {
            log::error!("Feature at offset {} has an empty extent", offset);
            return Err(MapError::new(
                &format!("Feature at offset {} has an empty extent", offset),
                ErrorKind::InvalidArgument,
            ));
        }
        let Some(&last_scale) = self.scales.last() else {
            return Err(MapError::new(
                "Unit header has no scale tiers",
                ErrorKind::InvalidArgument,
            ));
        };
        if min_scale > last_scale {
            log::error!(
                "Feature at offset {} becomes visible at {} past the last tier {}",
                offset,
                min_scale,
                last_scale
            );
            return Err(MapError::new(
                &format!(
                    "Feature at offset {} is not visible at any stored scale",
                    offset
                ),
                ErrorKind::InvalidArgument,
            ));
        }

        let bucket = bucket_by_scale(&self.scales, min_scale);
        let level = coding_level(self.scales[bucket]).min(self.depth - 1);
        let cells = if rect.is_degenerate() {
            let (cx, cy) = rect.center();
            vec![CellId::from_point(cx, cy, level)]
        } else {
            let cells = cover_area(rect, FEATURE_MAX_CELLS, level);
            if cells.is_empty() {
                // Entirely outside the world: keep it reachable from the root.
                vec![CellId::root()]
            } else {
                cells
            }
        };

        let depth = self.depth;
        self.tiers[bucket].extend(cells.into_iter().map(|cell| IndexEntry {
            code: cell.code(depth),
            offset,
        }));
        Ok(())
    }

    pub fn build(mut self) -> ScaleIndex {
        for tier in &mut self.tiers {
            tier.sort_unstable();
            tier.dedup();
        }
        ScaleIndex {
            scales: self.scales,
            tiers: self.tiers,
        }
    }
}
