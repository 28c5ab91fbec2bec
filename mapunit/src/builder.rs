//! Assembles unit containers: header, scale index and feature records.
//!
//! Feature records are appended to the data section in the raw record
//! layout understood by [`RawRecordDecoder`](crate::feature::RawRecordDecoder);
//! each record's byte offset is its identity inside the unit.

use std::path::Path;

use crate::container::{ContainerWriter, MemoryContainer};
use crate::errors::MapResult;
use crate::feature::write_raw_record;
use crate::geometry::BoundingRect;
use crate::header::{DataHeader, UnitCategory, DATA_TAG, HEADER_TAG, INDEX_TAG};
use crate::scale_index::ScaleIndexBuilder;

#[derive(Debug)]
pub struct UnitBuilder {
    header: DataHeader,
    index: ScaleIndexBuilder,
    data: Vec<u8>,
}

impl UnitBuilder {
    pub fn new(
        category: UnitCategory,
        bounds: BoundingRect,
        min_scale: u32,
        max_scale: u32,
        scales: Vec<u32>,
    ) -> Self {
        let header = DataHeader::new(category, bounds, min_scale, max_scale, scales);
        let index = ScaleIndexBuilder::new(&header);
        UnitBuilder {
            header,
            index,
            data: Vec::new(),
        }
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    /// Appends a feature record and indexes it; returns its offset.
    pub fn add_feature(
        &mut self,
        payload: &[u8],
        rect: &BoundingRect,
        min_scale: u32,
    ) -> MapResult<u32> {
        let offset = self.data.len() as u32;
        self.index.add_feature(offset, rect, min_scale)?;
        write_raw_record(&mut self.data, payload);
        Ok(offset)
    }

    fn into_sections(self) -> MapResult<[(&'static str, Vec<u8>); 3]> {
        self.header.validate()?;
        let header = self.header.encode()?;
        let index = self.index.build().encode()?;
        Ok([
            (HEADER_TAG, header),
            (INDEX_TAG, index),
            (DATA_TAG, self.data),
        ])
    }

    pub fn into_memory_container(self, name: &str) -> MapResult<MemoryContainer> {
        let mut container = MemoryContainer::new(name);
        for (tag, bytes) in self.into_sections()? {
            container.insert_section(tag, bytes);
        }
        Ok(container)
    }

    pub fn write_file(self, path: impl AsRef<Path>) -> MapResult<()> {
        let mut writer = ContainerWriter::new();
        for (tag, bytes) in self.into_sections()? {
            writer.add_section(tag, bytes);
        }
        writer.write(path)
    }
}
