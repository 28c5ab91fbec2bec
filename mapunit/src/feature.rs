//! Feature decoding collaborator.
//!
//! The registry and the query engine only produce [`FeatureId`]s. Turning the
//! bytes at an offset into a feature is the job of a [`FeatureDecoder`].

use crate::errors::{ErrorKind, MapError, MapResult};
use crate::unit::FeatureId;

/// Decodes one feature record from a unit's data section.
pub trait FeatureDecoder {
    type Feature;

    /// Decodes the record at `offset` of `data` and stamps it with `id`.
    fn decode(&self, data: &[u8], offset: u32, id: FeatureId) -> MapResult<Self::Feature>;
}

impl<T: FeatureDecoder + ?Sized> FeatureDecoder for &T {
    type Feature = T::Feature;

    fn decode(&self, data: &[u8], offset: u32, id: FeatureId) -> MapResult<Self::Feature> {
        (**self).decode(data, offset, id)
    }
}

/// An undecoded record: the payload bytes and the id assigned to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFeature {
    pub id: FeatureId,
    pub payload: Vec<u8>,
}

/// Reads length-prefixed records: a little-endian `u32` length followed by
/// the payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawRecordDecoder;

impl FeatureDecoder for RawRecordDecoder {
    type Feature = RawFeature;

    fn decode(&self, data: &[u8], offset: u32, id: FeatureId) -> MapResult<RawFeature> {
        let start = offset as usize;
        let body = start
            .checked_add(4)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| decode_error(id, "record header past end of data"))?;
        let mut len = [0u8; 4];
        len.copy_from_slice(&data[start..body]);
        let end = body
            .checked_add(u32::from_le_bytes(len) as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| decode_error(id, "record body past end of data"))?;

        Ok(RawFeature {
            id,
            payload: data[body..end].to_vec(),
        })
    }
}

fn decode_error(id: FeatureId, reason: &str) -> MapError {
    log::error!("Cannot decode {}: {}", id, reason);
    MapError::new(
        &format!("Cannot decode {}: {}", id, reason),
        ErrorKind::DecodeFailed,
    )
}

/// Appends a length-prefixed record to `buffer`, returning its offset.
pub fn write_raw_record(buffer: &mut Vec<u8>, payload: &[u8]) -> u32 {
    let offset = buffer.len() as u32;
    buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buffer.extend_from_slice(payload);
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_records() {
        let mut data = Vec::new();
        let a = write_raw_record(&mut data, b"alpha");
        let b = write_raw_record(&mut data, b"");
        let c = write_raw_record(&mut data, b"gamma");

        let decoder = RawRecordDecoder;
        let fa = decoder.decode(&data, a, FeatureId::new(1, a)).unwrap();
        assert_eq!(fa.payload, b"alpha");
        assert_eq!(fa.id, FeatureId::new(1, a));
        assert!(decoder.decode(&data, b, FeatureId::new(1, b)).unwrap().payload.is_empty());
        assert_eq!(decoder.decode(&data, c, FeatureId::new(1, c)).unwrap().payload, b"gamma");
    }

    #[test]
    fn test_decode_out_of_range() {
        let mut data = Vec::new();
        write_raw_record(&mut data, b"abc");
        let decoder = RawRecordDecoder;
        let err = decoder.decode(&data, 100, FeatureId::new(0, 100)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DecodeFailed);

        data.truncate(5);
        let err = decoder.decode(&data, 0, FeatureId::new(0, 0)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DecodeFailed);
    }

    #[test]
    fn test_decoder_by_reference() {
        let mut data = Vec::new();
        write_raw_record(&mut data, b"x");
        let decoder = RawRecordDecoder;
        let by_ref = &decoder;
        assert_eq!(by_ref.decode(&data, 0, FeatureId::new(0, 0)).unwrap().payload, b"x");
    }
}
