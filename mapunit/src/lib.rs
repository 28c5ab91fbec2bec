//! # mapunit - Map Unit Registry and Spatial Queries
//!
//! This crate manages a changing set of map-data containers ("units") and
//! answers "which features intersect this rectangle at this scale" across
//! all of them.
//!
//! ## Features
//!
//! - **Safe Lifecycle**: units can be registered, updated and removed while
//!   queries run; a locked unit's handle stays valid until its lock drops
//! - **Lazy Handles**: containers are opened on first lock and kept in an
//!   idle-handle LRU cache afterwards
//! - **Hilbert Covering**: query rectangles become sorted intervals of
//!   quad-tree cell codes
//! - **Scale Tiers**: each unit carries binary-searchable tables per scale tier
//! - **Ordered Dispatch**: country units first, then coastlines, then world
//!   background data
//! - **Pluggable Collaborators**: container opening and feature decoding are
//!   traits
//!
//! ## Quick Start
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use std::sync::Arc;
//! use mapunit::builder::UnitBuilder;
//! use mapunit::container::MemoryOpener;
//! use mapunit::feature::RawRecordDecoder;
//! use mapunit::{BoundingRect, CoveringMode, MapIndex, UnitCategory};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let opener = Arc::new(MemoryOpener::new());
//! let bounds = BoundingRect::new(0.0, 0.0, 10.0, 10.0);
//! let mut unit = UnitBuilder::new(UnitCategory::Country, bounds, 1, 10, vec![5, 10]);
//! unit.add_feature(b"lake", &BoundingRect::new(2.0, 2.0, 3.0, 3.0), 4)?;
//! opener.insert(unit.into_memory_container("Country")?);
//!
//! let index = MapIndex::builder().opener(opener).build()?;
//! index.register_unit("Country")?;
//!
//! index.for_each_in_rect(
//!     &RawRecordDecoder,
//!     |feature| {
//!         println!("{:?}", feature);
//!         ControlFlow::Continue(())
//!     },
//!     &bounds,
//!     6,
//!     CoveringMode::ViewportWithLowLevels,
//! );
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cell_id;
pub mod config;
pub mod container;
pub mod covering;
pub mod errors;
pub mod feature;
pub mod geometry;
pub mod handle_cache;
pub mod header;
pub mod loader_guard;
pub mod map_index;
pub mod registry;
pub mod scale_index;
pub mod scales;
pub mod unit;

pub use config::{MapIndexBuilder, MapIndexConfig};
pub use covering::CoveringMode;
pub use errors::{ErrorKind, MapError, MapResult};
pub use geometry::BoundingRect;
pub use header::{DataHeader, UnitCategory};
pub use loader_guard::FeaturesLoaderGuard;
pub use map_index::{MapIndex, QueryOutcome};
pub use registry::{UnitLock, UnitRegistry};
pub use unit::{FeatureId, UnitId, UnitInfo, UnitStatus};
