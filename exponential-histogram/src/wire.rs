//! The byte-exact, big-endian serialization contract: a leading `u16`
//! version discriminates the variant (`0x02xx` [`SimpleSketch`],
//! `0x03xx` [`ComboSketch`], `0x04xx` [`ConcurrentSketch`]); everything
//! else is a fixed layout per type. Encoding is two-pass: callers never see
//! a partially-sized buffer, matching the size-then-write discipline this
//! crate's pack uses for its `prost`-generated types.

use crate::counter::WindowedCounterArray;
use crate::error::{HistogramError, Result};
use crate::index::IndexerPolicy;
use crate::sketch::{ComboSketch, ConcurrentSketch, SimpleSketch};

const SIMPLE_SKETCH_VERSION: u16 = 0x0200;
const COMBO_SKETCH_VERSION: u16 = 0x0300;
const CONCURRENT_SKETCH_VERSION: u16 = 0x0400;
const WINDOWED_COUNTER_ARRAY_VERSION: u8 = 1;

/// A type that can round-trip through this crate's wire format.
pub trait Wire: Sized {
    /// Serialize `self` into a freshly allocated, exactly-sized buffer.
    fn encode(&self) -> Vec<u8>;
    /// Deserialize a value previously produced by [`Wire::encode`].
    fn decode(bytes: &[u8]) -> Result<Self>;
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(HistogramError::DecodeError(format!(
                "expected {n} more bytes at offset {}, only {} remain",
                self.pos,
                self.bytes.len() - self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            if shift >= 64 {
                return Err(HistogramError::DecodeError(
                    "varint did not terminate within 64 bits".into(),
                ));
            }
            let byte = self.u8()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    value >>= 7;
    while value > 0 {
        len += 1;
        value >>= 7;
    }
    len
}

fn encode_windowed_counter_array(array: &WindowedCounterArray, buf: &mut Vec<u8>) {
    buf.push(WINDOWED_COUNTER_ARRAY_VERSION);
    buf.extend_from_slice(&(array.max_size() as u32).to_be_bytes());
    match (array.index_start(), array.index_end()) {
        (Some(start), Some(end)) => {
            buf.push(1); // has_data
            buf.extend_from_slice(&start.to_be_bytes());
            buf.extend_from_slice(&end.to_be_bytes());
            buf.push(array.bytes_per_counter());
            for idx in start..=end {
                write_varint(buf, array.get(idx));
            }
        }
        _ => buf.push(0),
    }
}

fn windowed_counter_array_len(array: &WindowedCounterArray) -> usize {
    let mut len = 1 + 4 + 1; // version + max_size + has_data
    if let (Some(start), Some(end)) = (array.index_start(), array.index_end()) {
        len += 8 + 8 + 1; // index_start + index_end + bytes_per_counter
        for idx in start..=end {
            len += varint_len(array.get(idx));
        }
    }
    len
}

fn decode_windowed_counter_array(reader: &mut Reader<'_>) -> Result<WindowedCounterArray> {
    let version = reader.u8()?;
    if version != WINDOWED_COUNTER_ARRAY_VERSION {
        return Err(HistogramError::DecodeError(format!(
            "unknown WindowedCounterArray version {version}"
        )));
    }
    let max_size = reader.u32()? as usize;
    if max_size == 0 {
        return Err(HistogramError::DecodeError(
            "WindowedCounterArray max_size must be positive".into(),
        ));
    }
    let has_data = reader.u8()?;
    let mut array = WindowedCounterArray::new(max_size);
    if has_data == 0 {
        return Ok(array);
    }
    let start = reader.i64()?;
    let end = reader.i64()?;
    let bytes_per_counter = reader.u8()?;
    if ![1u8, 2, 4, 8].contains(&bytes_per_counter) {
        return Err(HistogramError::DecodeError(format!(
            "bytes_per_counter must be one of 1, 2, 4, 8, got {bytes_per_counter}"
        )));
    }
    if end < start || (end - start + 1) as usize > max_size {
        return Err(HistogramError::DecodeError(
            "WindowedCounterArray window wider than max_size".into(),
        ));
    }
    for idx in start..=end {
        let count = reader.varint()?;
        if count > 0 && !array.increment(idx, count) {
            return Err(HistogramError::DecodeError(format!(
                "decoded window [{start}, {end}] does not fit max_size {max_size}"
            )));
        }
    }
    Ok(array)
}

fn encode_simple_sketch_body(sketch: &SimpleSketch, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&sketch.total_count().to_be_bytes());
    buf.extend_from_slice(&sketch.sum().to_be_bytes());
    buf.extend_from_slice(&sketch.min().to_be_bytes());
    buf.extend_from_slice(&sketch.max().to_be_bytes());
    buf.push(if sketch.positive_indexed() { 1 } else { 0 });
    buf.push(sketch.scale() as i8 as u8);
    buf.push(sketch.policy().code());
    buf.extend_from_slice(&sketch.count_for_wrong_sign().to_be_bytes());
    buf.extend_from_slice(&sketch.count_for_zero().to_be_bytes());
    encode_windowed_counter_array(sketch.counters(), buf);
}

fn simple_sketch_body_len(sketch: &SimpleSketch) -> usize {
    8 + 8 + 8 + 8 + 1 + 1 + 1 + 8 + 8 + windowed_counter_array_len(sketch.counters())
}

fn decode_simple_sketch_body(reader: &mut Reader<'_>) -> Result<SimpleSketch> {
    let total_count = reader.u64()?;
    let sum = reader.f64()?;
    let min = reader.f64()?;
    let max = reader.f64()?;
    let positive_indexed = reader.u8()? == 1;
    let scale = reader.i8()? as i32;
    let policy = IndexerPolicy::from_code(reader.u8()?)?;
    let count_for_wrong_sign = reader.u64()?;
    let count_for_zero = reader.u64()?;
    let counters = decode_windowed_counter_array(reader)?;

    let mut sketch = SimpleSketch::new(counters.max_size(), scale, positive_indexed, policy)?;
    sketch.restore_from_wire(total_count, sum, min, max, count_for_wrong_sign, count_for_zero, counters);
    Ok(sketch)
}

impl Wire for SimpleSketch {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + simple_sketch_body_len(self));
        buf.extend_from_slice(&SIMPLE_SKETCH_VERSION.to_be_bytes());
        encode_simple_sketch_body(self, &mut buf);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.u16()?;
        if version != SIMPLE_SKETCH_VERSION {
            return Err(HistogramError::DecodeError(format!(
                "unknown SimpleSketch version {version:#06x}"
            )));
        }
        decode_simple_sketch_body(&mut reader)
    }
}

impl Wire for ComboSketch {
    fn encode(&self) -> Vec<u8> {
        let children: Vec<&SimpleSketch> = [self.negative(), self.positive()].into_iter().flatten().collect();

        let mut len = 2 + 4 + 1 + 1 + 1; // version + max_buckets + initial_scale + policy + children_len
        if children.len() > 1 {
            len += 8 + 8 + 8 + 8; // summary block
        }
        for child in &children {
            len += 2 + simple_sketch_body_len(child);
        }

        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&COMBO_SKETCH_VERSION.to_be_bytes());
        buf.extend_from_slice(&(self.max_buckets_per_side() as u32).to_be_bytes());
        buf.push(self.initial_scale() as i8 as u8);
        buf.push(self.policy().code());
        buf.push(children.len() as u8);
        if children.len() > 1 {
            buf.extend_from_slice(&self.total_count().to_be_bytes());
            buf.extend_from_slice(&self.sum().to_be_bytes());
            buf.extend_from_slice(&self.min().to_be_bytes());
            buf.extend_from_slice(&self.max().to_be_bytes());
        }
        for child in &children {
            buf.extend_from_slice(&SIMPLE_SKETCH_VERSION.to_be_bytes());
            encode_simple_sketch_body(child, &mut buf);
        }
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.u16()?;
        if version != COMBO_SKETCH_VERSION {
            return Err(HistogramError::DecodeError(format!(
                "unknown ComboSketch version {version:#06x}"
            )));
        }
        let max_buckets_per_side = reader.u32()? as usize;
        let initial_scale = reader.i8()? as i32;
        let policy = IndexerPolicy::from_code(reader.u8()?)?;
        let children_len = reader.u8()?;
        if children_len > 2 {
            return Err(HistogramError::DecodeError(format!(
                "ComboSketch children_len must be 0, 1, or 2, got {children_len}"
            )));
        }
        if children_len > 1 {
            // Summary block is redundant with the children's own summaries;
            // consumed here only to advance the reader past it.
            let _ = (reader.u64()?, reader.f64()?, reader.f64()?, reader.f64()?);
        }

        let mut combo = ComboSketch::new(max_buckets_per_side, initial_scale, policy);
        for _ in 0..children_len {
            let child_version = reader.u16()?;
            if child_version != SIMPLE_SKETCH_VERSION {
                return Err(HistogramError::DecodeError(format!(
                    "unknown nested SimpleSketch version {child_version:#06x}"
                )));
            }
            let child = decode_simple_sketch_body(&mut reader)?;
            combo.restore_child_from_wire(child);
        }
        Ok(combo)
    }
}

impl<S: Wire> Wire for ConcurrentSketch<S> {
    fn encode(&self) -> Vec<u8> {
        self.locked(|inner| {
            let nested = inner.encode();
            let mut buf = Vec::with_capacity(2 + nested.len());
            buf.extend_from_slice(&CONCURRENT_SKETCH_VERSION.to_be_bytes());
            buf.extend_from_slice(&nested);
            buf
        })
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.u16()?;
        if version != CONCURRENT_SKETCH_VERSION {
            return Err(HistogramError::DecodeError(format!(
                "unknown ConcurrentSketch version {version:#06x}"
            )));
        }
        let inner = S::decode(&bytes[reader.pos..])?;
        Ok(ConcurrentSketch::new(inner))
    }
}

/// Serialize any [`Wire`] value.
pub fn encode<T: Wire>(value: &T) -> Vec<u8> {
    value.encode()
}

/// Deserialize any [`Wire`] value.
pub fn decode<T: Wire>(bytes: &[u8]) -> Result<T> {
    T::decode(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sketch::SimpleSketch;

    #[test]
    fn empty_simple_sketch_round_trips() {
        let sketch = SimpleSketch::default();
        let bytes = sketch.encode();
        let decoded = SimpleSketch::decode(&bytes).unwrap();
        assert_eq!(sketch, decoded);
    }

    #[test]
    fn populated_simple_sketch_round_trips() {
        let mut sketch = SimpleSketch::new(10, 12, true, IndexerPolicy::AutoSelect).unwrap();
        sketch.insert(10.0, 1).unwrap();
        sketch.insert(100.0, 5).unwrap();
        sketch.insert(0.0, 2).unwrap();
        sketch.insert(-1.0, 3).unwrap();
        let bytes = sketch.encode();
        let decoded = SimpleSketch::decode(&bytes).unwrap();
        assert_eq!(sketch, decoded);
    }

    #[test]
    fn empty_combo_sketch_is_exactly_nine_bytes() {
        let combo = ComboSketch::default();
        let bytes = combo.encode();
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[0..2], &[0x03, 0x00]);
        assert_eq!(u32::from_be_bytes(bytes[2..6].try_into().unwrap()), 320);
        assert_eq!(bytes[6] as i8, 12);
        assert_eq!(bytes[7], 3);
        assert_eq!(bytes[8], 0);
        let decoded = ComboSketch::decode(&bytes).unwrap();
        assert_eq!(combo, decoded);
    }

    #[test]
    fn populated_combo_sketch_round_trips() {
        let mut combo = ComboSketch::new(20, 10, IndexerPolicy::AutoSelect);
        combo.insert(5.0, 1).unwrap();
        combo.insert(-5.0, 2).unwrap();
        let bytes = combo.encode();
        let decoded = ComboSketch::decode(&bytes).unwrap();
        assert_eq!(combo, decoded);
    }

    #[test]
    fn concurrent_sketch_round_trips() {
        let sketch: ConcurrentSketch<SimpleSketch> = ConcurrentSketch::default();
        sketch.insert(3.0, 4).unwrap();
        let bytes = sketch.encode();
        let decoded: ConcurrentSketch<SimpleSketch> = ConcurrentSketch::decode(&bytes).unwrap();
        assert_eq!(decoded.total_count(), 4);
    }

    #[test]
    fn unknown_version_is_a_decode_error() {
        let bytes = [0xFFu8, 0xFF];
        assert!(SimpleSketch::decode(&bytes).is_err());
    }

    #[test]
    fn truncated_buffer_is_a_decode_error() {
        let sketch = SimpleSketch::default();
        let bytes = sketch.encode();
        assert!(SimpleSketch::decode(&bytes[..bytes.len() - 3]).is_err());
    }
}
