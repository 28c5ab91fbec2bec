//! Rectangle-to-interval covering.
//!
//! A query rectangle is approximated by quad-tree cells and turned into a
//! sorted list of half-open intervals of pre-order cell codes. The result
//! depends only on the inputs: no registry state and no I/O is involved.

use std::collections::HashMap;

use crate::cell_id::CellId;
use crate::geometry::BoundingRect;
use crate::scales;

/// Half-open range `[begin, end)` of pre-order cell codes.
pub type Interval = (u64, u64);

/// Cell budget used for viewport coverings unless configured otherwise.
pub const DEFAULT_VIEWPORT_MAX_CELLS: usize = 8;

/// The single interval spanning every code.
pub const FULL_INTERVAL: Interval = (0, i64::MAX as u64);

/// Which cell resolutions a rectangle query expands into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoveringMode {
    /// Cells covering the rectangle at the scale's depth plus every ancestor
    /// cell, so features indexed at coarser levels are found too.
    ViewportWithLowLevels,
    /// One coarse cell containing the whole rectangle plus its ancestors.
    LowLevelsOnly,
    /// The whole addressable space.
    FullCover,
}

/// Covers `rect` for `scale`, returning sorted, merged intervals.
///
/// An empty or degenerate rectangle yields no intervals.
pub fn cover(rect: &BoundingRect, scale: u32, mode: CoveringMode, max_cells: usize) -> Vec<Interval> {
    cover_at_depth(rect, scales::coding_depth(scale), mode, max_cells)
}

/// Covers `rect` with codes of a `depth`-level tree.
///
/// `depth` is at least one; zero is treated as one.
pub fn cover_at_depth(
    rect: &BoundingRect,
    depth: u32,
    mode: CoveringMode,
    max_cells: usize,
) -> Vec<Interval> {
    if rect.is_degenerate() {
        return Vec::new();
    }

    let depth = depth.max(1);
    let max_level = depth - 1;
    let mut intervals = Vec::new();
    match mode {
        CoveringMode::ViewportWithLowLevels => {
            for cell in cover_rect(rect, max_cells, max_level) {
                append_lower_levels(&cell, depth, &mut intervals);
            }
        }
        CoveringMode::LowLevelsOnly => {
            if let Some(cell) = enclosing_cell(rect, max_level) {
                append_lower_levels(&cell, depth, &mut intervals);
            }
        }
        CoveringMode::FullCover => {
            if !rect.intersection(&BoundingRect::world()).is_degenerate() {
                intervals.push(FULL_INTERVAL);
            }
        }
    }
    merge_intervals(intervals)
}

/// Approximates the closed `rect` with at most `max_cells` cells no finer
/// than `max_level`.
///
/// Starting from the root, the coarsest cells that are only partially inside
/// the rectangle are split as long as the budget allows. Cells fully inside
/// the rectangle are never split. A child touching the rectangle only along
/// an edge or at a corner is kept, since a point on the max edge falls into
/// the cell beyond it.
pub fn cover_rect(rect: &BoundingRect, max_cells: usize, max_level: u32) -> Vec<CellId> {
    split_cover(rect, max_cells, max_level, BoundingRect::intersects)
}

/// Like [`cover_rect`], but keeps only cells sharing a region of positive
/// area with `rect`. Used to index features with an area.
pub fn cover_area(rect: &BoundingRect, max_cells: usize, max_level: u32) -> Vec<CellId> {
    split_cover(rect, max_cells, max_level, BoundingRect::overlaps)
}

fn split_cover(
    rect: &BoundingRect,
    max_cells: usize,
    max_level: u32,
    keep: fn(&BoundingRect, &BoundingRect) -> bool,
) -> Vec<CellId> {
    let rect = rect.intersection(&BoundingRect::world());
    if rect.is_degenerate() {
        return Vec::new();
    }

    let max_cells = max_cells.max(1);
    let mut cells = vec![CellId::root()];
    loop {
        let split_level = cells
            .iter()
            .filter(|c| c.level() < max_level && !rect.contains(&c.rect()))
            .map(|c| c.level())
            .min();
        let Some(split_level) = split_level else {
            break;
        };

        let mut next = Vec::with_capacity(cells.len() * 4);
        for cell in &cells {
            if cell.level() == split_level && !rect.contains(&cell.rect()) {
                next.extend(
                    cell.children()
                        .into_iter()
                        .filter(|child| keep(&child.rect(), &rect)),
                );
            } else {
                next.push(*cell);
            }
        }

        if next.len() > max_cells {
            break;
        }
        cells = next;
    }
    cells
}

/// The smallest cell no finer than `max_level` holding every point of the
/// closed `rect`, including points on its max edges.
fn enclosing_cell(rect: &BoundingRect, max_level: u32) -> Option<CellId> {
    let rect = rect.intersection(&BoundingRect::world());
    if rect.is_degenerate() {
        return None;
    }

    let mut low = CellId::from_point(rect.min_x, rect.min_y, max_level);
    let mut high = CellId::from_point(rect.max_x, rect.max_y, max_level);
    while low != high {
        match (low.parent(), high.parent()) {
            (Some(a), Some(b)) => {
                low = a;
                high = b;
            }
            _ => break,
        }
    }
    Some(low)
}

/// Pushes the sub-tree interval of `cell` and one single-code interval for
/// each of its ancestors.
fn append_lower_levels(cell: &CellId, depth: u32, intervals: &mut Vec<Interval>) {
    let code = cell.code(depth);
    intervals.push((code, code + cell.subtree_size(depth)));

    let mut ancestor = cell.parent();
    while let Some(parent) = ancestor {
        let code = parent.code(depth);
        intervals.push((code, code + 1));
        ancestor = parent.parent();
    }
}

/// Sorts intervals and joins overlapping or adjacent ones.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_unstable();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (begin, end) in intervals {
        match merged.last_mut() {
            Some(last) if begin <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((begin, end)),
        }
    }
    merged
}

/// Lazily computes and caches the covering of one rectangle per coding depth.
///
/// Units with the same last coding scale share one interval list within a
/// query.
#[derive(Debug)]
pub struct CoveringGetter {
    rect: BoundingRect,
    mode: CoveringMode,
    max_cells: usize,
    by_depth: HashMap<u32, Vec<Interval>>,
}

impl CoveringGetter {
    pub fn new(rect: BoundingRect, mode: CoveringMode, max_cells: usize) -> Self {
        CoveringGetter {
            rect,
            mode,
            max_cells,
            by_depth: HashMap::new(),
        }
    }

    /// Intervals for `scale`, computed on first use.
    pub fn get(&mut self, scale: u32) -> &[Interval] {
        let depth = scales::coding_depth(scale);
        let (rect, mode, max_cells) = (self.rect, self.mode, self.max_cells);
        self.by_depth
            .entry(depth)
            .or_insert_with(|| cover_at_depth(&rect, depth, mode, max_cells))
    }
}
