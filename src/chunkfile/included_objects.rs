//! IncludedObjects chunk (object placements in `.soc` containers)
//!
//! The object run is a sequence of tagged records of which only a few shapes are
//! known. Unknown tags are stepped over four bytes at a time until a known tag shows
//! up again; every such gap is recorded in [`IncludedObjects::skipped`].

use serde::Serialize;

use crate::chunkfile::defs::{CHUNK_STR_LEN, INCLUDED_OBJECT_TYPE1};
use crate::cursor::BinaryCursor;
use crate::error::Result;
use crate::structs::FieldValue;

const TYPE1_SIZE: u64 = 168;
/// Trailer present when `unknown3` is zero
const TYPE1_TRAILER: u64 = 16;
const TYPE7_SIZE: u64 = 4 + 148;
const TYPE10_SIZE: u64 = 136;

/// A placed geometry instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectPlacement {
    /// Offset of the record within the chunk
    pub offset: u64,
    /// Index into [`IncludedObjects::cgfs`]
    pub id: u16,
    pub vector1: [f64; 3],
    pub vector2: [f64; 3],
    /// Row-major 3x4 affine transform
    pub transform: [[f64; 4]; 3],
}

impl ObjectPlacement {
    pub fn position(&self) -> [f64; 3] {
        [self.transform[0][3], self.transform[1][3], self.transform[2][3]]
    }

    /// Length of each basis column
    pub fn scale(&self) -> [f64; 3] {
        let m = &self.transform;
        let column = |c: usize| (m[0][c] * m[0][c] + m[1][c] * m[1][c] + m[2][c] * m[2][c]).sqrt();
        [column(0), column(1), column(2)]
    }

    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let m = &self.transform;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncludedObject {
    Placement(ObjectPlacement),
    /// A record whose tag and size are known but whose fields are not
    Opaque { object_type: u32, offset: u64, size: u64 },
}

/// Bytes stepped over while looking for a known record tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedRegion {
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludedObjects {
    pub cgfs: Vec<String>,
    pub materials: Vec<String>,
    pub tint_palettes: Vec<String>,
    pub objects: Vec<IncludedObject>,
    pub skipped: Vec<SkippedRegion>,
    /// Declared object bytes left over (or overrun, if negative) after the walk
    pub unaccounted: i64,
}

impl IncludedObjects {
    /// Geometry file a placement refers to
    pub fn file_name(&self, placement: &ObjectPlacement) -> Option<&str> {
        self.cgfs.get(placement.id as usize).map(String::as_str)
    }

    pub fn placements(&self) -> impl Iterator<Item = &ObjectPlacement> {
        self.objects.iter().filter_map(|o| match o {
            IncludedObject::Placement(p) => Some(p),
            IncludedObject::Opaque { .. } => None,
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = BinaryCursor::new(data);
        cursor.skip(4)?;

        let num_cgfs = cursor.read_u32()?;
        let cgfs = read_strings(&mut cursor, num_cgfs as usize)?;
        let num_mtls = cursor.read_u16()?;
        let num_palettes = cursor.read_u16()?;
        let materials = read_strings(&mut cursor, num_mtls as usize)?;
        let tint_palettes = read_strings(&mut cursor, num_palettes as usize)?;

        cursor.skip(28)?;
        let mut remaining = cursor.read_u32()? as i64;

        let mut objects = Vec::new();
        let mut skipped = Vec::new();
        let mut gap_start: Option<u64> = None;

        while remaining > 0 {
            let tag = match cursor.peek(4).try_into() {
                Ok(bytes) => u32::from_le_bytes(bytes),
                Err(_) => break,
            };

            let limit = (remaining as u64).min(cursor.remaining() as u64);
            match read_object(&cursor, tag, limit)? {
                Some((object, size)) => {
                    if let Some(start) = gap_start.take() {
                        close_gap(&mut skipped, start, cursor.tell());
                    }
                    objects.push(object);
                    cursor.skip(size as usize)?;
                    remaining -= size as i64;
                }
                None => {
                    gap_start.get_or_insert(cursor.tell());
                    let step = remaining.min(4);
                    if cursor.skip(step as usize).is_err() {
                        break;
                    }
                    remaining -= step;
                }
            }
        }
        if let Some(start) = gap_start {
            close_gap(&mut skipped, start, cursor.tell());
        }
        if remaining != 0 {
            log::warn!(
                "IncludedObjects: {} of the declared object bytes unaccounted for",
                remaining
            );
        }

        Ok(IncludedObjects {
            cgfs,
            materials,
            tint_palettes,
            objects,
            skipped,
            unaccounted: remaining,
        })
    }
}

fn read_strings(cursor: &mut BinaryCursor<'_>, count: usize) -> Result<Vec<String>> {
    (0..count)
        .map(|_| cursor.read_fixed_str(CHUNK_STR_LEN))
        .collect()
}

fn close_gap(skipped: &mut Vec<SkippedRegion>, start: u64, end: u64) {
    log::warn!(
        "IncludedObjects: skipped block of {} bytes starting at {:#x}",
        end - start,
        start
    );
    skipped.push(SkippedRegion {
        offset: start,
        len: end - start,
    });
}

/// Decode the record at the cursor without advancing; `None` for unknown tags and
/// records longer than the `remaining` declared bytes
fn read_object(
    cursor: &BinaryCursor<'_>,
    tag: u32,
    remaining: u64,
) -> Result<Option<(IncludedObject, u64)>> {
    let offset = cursor.tell();

    let opaque = |size: u64| {
        (size <= remaining).then_some((
            IncludedObject::Opaque {
                object_type: tag,
                offset,
                size,
            },
            size,
        ))
    };

    Ok(match tag {
        0x01 => {
            if remaining < TYPE1_SIZE {
                return Ok(None);
            }
            let record = INCLUDED_OBJECT_TYPE1.decode(cursor.data(), offset)?;
            let size = if record.uint("unknown3")? == 0 {
                TYPE1_SIZE + TYPE1_TRAILER
            } else {
                TYPE1_SIZE
            };
            if size > remaining {
                return Ok(None);
            }

            let floats = |name: &str| -> Vec<f64> {
                match record.get(name) {
                    Some(FieldValue::Array(items)) => items
                        .iter()
                        .map(|v| match v {
                            FieldValue::Float(f) => *f,
                            _ => 0.0,
                        })
                        .collect(),
                    _ => Vec::new(),
                }
            };
            let (v1, v2, m) = (floats("vector1"), floats("vector2"), floats("transform"));
            let mut transform = [[0.0; 4]; 3];
            for (i, value) in m.iter().enumerate().take(12) {
                transform[i / 4][i % 4] = *value;
            }

            Some((
                IncludedObject::Placement(ObjectPlacement {
                    offset,
                    id: record.uint("id")? as u16,
                    vector1: [v1[0], v1[1], v1[2]],
                    vector2: [v2[0], v2[1], v2[2]],
                    transform,
                }),
                size,
            ))
        }
        0x07 => opaque(TYPE7_SIZE),
        0x10 => opaque(TYPE10_SIZE),
        _ => None,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn fixed(s: &str) -> Vec<u8> {
        let mut out = s.as_bytes().to_vec();
        out.resize(CHUNK_STR_LEN, 0);
        out
    }

    pub(crate) fn type1_record(id: u16, translation: [f64; 3], unknown3: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1u32.to_le_bytes());
        for v in [0.0f64; 6] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        // scale 2 on x, identity otherwise
        let rows = [
            [2.0, 0.0, 0.0, translation[0]],
            [0.0, 1.0, 0.0, translation[1]],
            [0.0, 0.0, 1.0, translation[2]],
        ];
        for row in rows {
            for v in row {
                out.extend_from_slice(&f64::to_le_bytes(v));
            }
        }
        out.extend_from_slice(&unknown3.to_le_bytes());
        if unknown3 == 0 {
            out.extend_from_slice(&[0; TYPE1_TRAILER as usize]);
        }
        out
    }

    /// An IncludedObjects payload with one geometry file, one material and the given
    /// object bytes
    pub(crate) fn chunk_bytes(objects: &[u8], declared: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend(fixed("objects/props/crate.cgf"));
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend(fixed("objects/props/crate.mtl"));
        out.extend_from_slice(&[0; 28]);
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(objects);
        out
    }

    #[test]
    fn test_skips_unknown_filler() {
        let mut objects = vec![0xAA; 8];
        objects.extend(type1_record(0, [1.0, 2.0, 3.0], 5));
        let data = chunk_bytes(&objects, objects.len() as u32);
        let header_len = (data.len() - objects.len()) as u64;

        let parsed = IncludedObjects::parse(&data).unwrap();
        assert_eq!(parsed.cgfs, vec!["objects/props/crate.cgf"]);
        assert_eq!(parsed.materials, vec!["objects/props/crate.mtl"]);
        assert!(parsed.tint_palettes.is_empty());
        assert_eq!(
            parsed.skipped,
            vec![SkippedRegion {
                offset: header_len,
                len: 8
            }]
        );
        assert_eq!(parsed.unaccounted, 0);

        let placement = parsed.placements().next().unwrap();
        assert_eq!(placement.position(), [1.0, 2.0, 3.0]);
        assert_eq!(placement.scale(), [2.0, 1.0, 1.0]);
        assert_eq!(placement.rotation()[0], [2.0, 0.0, 0.0]);
        assert_eq!(parsed.file_name(placement), Some("objects/props/crate.cgf"));
    }

    #[test]
    fn test_recovers_records_around_filler() {
        let first = type1_record(0, [1.0, 0.0, 0.0], 5);
        let mut objects = first.clone();
        objects.extend_from_slice(&[0xAA; 8]);
        objects.extend(type1_record(0, [2.0, 0.0, 0.0], 5));
        let data = chunk_bytes(&objects, objects.len() as u32);
        let header_len = (data.len() - objects.len()) as u64;

        let parsed = IncludedObjects::parse(&data).unwrap();
        let positions: Vec<_> = parsed.placements().map(|p| p.position()).collect();
        assert_eq!(positions, vec![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        assert_eq!(
            parsed.skipped,
            vec![SkippedRegion {
                offset: header_len + first.len() as u64,
                len: 8
            }]
        );
        assert_eq!(parsed.unaccounted, 0);
    }

    #[test]
    fn test_record_past_declared_end_is_skipped() {
        let mut objects = type1_record(0, [0.0; 3], 5);
        let declared = objects.len() as u32 - 8;
        // bytes after the declared run belong to whatever follows in the chunk
        objects.extend_from_slice(&[0; 16]);
        let data = chunk_bytes(&objects, declared);

        let parsed = IncludedObjects::parse(&data).unwrap();
        assert!(parsed.objects.is_empty());
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].len, declared as u64);
        assert_eq!(parsed.unaccounted, 0);
    }

    #[test]
    fn test_zero_unknown3_adds_trailer() {
        let mut objects = type1_record(0, [0.0; 3], 0);
        objects.extend_from_slice(&0x10u32.to_le_bytes());
        objects.extend_from_slice(&[0; TYPE10_SIZE as usize - 4]);
        let data = chunk_bytes(&objects, objects.len() as u32);

        let parsed = IncludedObjects::parse(&data).unwrap();
        assert_eq!(parsed.objects.len(), 2);
        assert!(matches!(
            parsed.objects[1],
            IncludedObject::Opaque { object_type: 0x10, size: TYPE10_SIZE, .. }
        ));
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.unaccounted, 0);
    }

    #[test]
    fn test_overstated_length_is_reported_not_fatal() {
        let objects = type1_record(0, [0.0; 3], 9);
        let data = chunk_bytes(&objects, objects.len() as u32 + 12);
        let parsed = IncludedObjects::parse(&data).unwrap();
        assert_eq!(parsed.objects.len(), 1);
        assert_eq!(parsed.unaccounted, 12);
    }
}
