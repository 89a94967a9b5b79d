//! Instance decoding and pointer resolution

use indexmap::IndexMap;
use std::io::SeekFrom;
use std::sync::Arc;

use crate::cursor::BinaryCursor;
use crate::dataforge::reader::{DataForge, Record};
use crate::dataforge::types::*;
use crate::error::{Error, Result};

impl DataForge {
    /// Decode every property of struct `structure_index` laid out at `offset`
    pub fn decode_structure_instance(
        &self,
        structure_index: u32,
        offset: u64,
    ) -> Result<IndexMap<String, Value>> {
        let resolved = self.resolved_struct(structure_index)?;
        let mut properties = IndexMap::with_capacity(resolved.properties.len());
        let mut position = offset;
        for &p in &resolved.properties {
            let (value, next) = self.decode_property(p, position)?;
            properties.insert(self.property_name(p)?.to_string(), value);
            position = next;
        }
        Ok(properties)
    }

    /// Decode property `property_index` at `offset`, returning the value and the offset
    /// just past it
    pub fn decode_property(&self, property_index: usize, offset: u64) -> Result<(Value, u64)> {
        let prop = self
            .property_definitions()
            .get(property_index)
            .ok_or_else(|| {
                Error::BadRecord(format!("property index {} out of range", property_index))
            })?;
        let mut cursor = BinaryCursor::at(self.data(), offset)?;

        if prop.is_array() {
            let count = cursor.read_u32()?;
            let first_index = cursor.read_u32()?;
            let range = ArrayRange {
                data_type: prop.data_type,
                type_index: prop.index,
                first_index,
                count,
            };
            return Ok((Value::Array(range), cursor.tell()));
        }

        let value = match prop.data_type {
            DataType::Class => {
                let structure_index = prop.index as u32;
                let properties = self.decode_structure_instance(structure_index, offset)?;
                let size = self.struct_size_of(structure_index)?;
                cursor.seek(SeekFrom::Start(offset + size))?;
                Value::Class(StructValue {
                    structure_index,
                    properties,
                })
            }
            DataType::Unknown(code) => {
                return Err(Error::BadRecord(format!(
                    "property {} has unknown data type {:#x}",
                    self.property_name(property_index)?,
                    code
                )))
            }
            data_type => self.read_scalar(&mut cursor, data_type, prop.index)?,
        };
        Ok((value, cursor.tell()))
    }

    /// Read one non-class value; shared by inline properties and pool elements
    fn read_scalar(
        &self,
        cursor: &mut BinaryCursor<'_>,
        data_type: DataType,
        type_index: u16,
    ) -> Result<Value> {
        Ok(match data_type {
            DataType::Boolean => Value::Bool(cursor.read_u8()? != 0),
            DataType::Int8 => Value::Int8(cursor.read_i8()?),
            DataType::Int16 => Value::Int16(cursor.read_i16()?),
            DataType::Int32 => Value::Int32(cursor.read_i32()?),
            DataType::Int64 => Value::Int64(cursor.read_i64()?),
            DataType::UInt8 => Value::UInt8(cursor.read_u8()?),
            DataType::UInt16 => Value::UInt16(cursor.read_u16()?),
            DataType::UInt32 => Value::UInt32(cursor.read_u32()?),
            DataType::UInt64 => Value::UInt64(cursor.read_u64()?),
            DataType::Single => Value::Single(cursor.read_f32()?),
            DataType::Double => Value::Double(cursor.read_f64()?),
            DataType::String => Value::String(self.read_text_at_offset(cursor.read_u32()? as u64)),
            DataType::Locale => Value::Locale(self.read_text_at_offset(cursor.read_u32()? as u64)),
            DataType::Guid => Value::Guid(Guid(cursor.read_array::<16>()?)),
            DataType::Enum => Value::Enum(self.enum_choice(type_index, cursor.read_u32()?)),
            DataType::StrongPointer | DataType::WeakPointer => {
                let pointer = Pointer {
                    kind: if data_type == DataType::StrongPointer {
                        PointerKind::Strong
                    } else {
                        PointerKind::Weak
                    },
                    structure_index: cursor.read_u32()?,
                    instance_index: cursor.read_u32()?,
                };
                if pointer.is_null() {
                    Value::Null
                } else {
                    Value::Pointer(pointer)
                }
            }
            DataType::Reference => {
                let reference = Reference {
                    instance_index: cursor.read_u32()?,
                    guid: Guid(cursor.read_array::<16>()?),
                };
                if reference.is_null() {
                    Value::Null
                } else {
                    Value::Reference(reference)
                }
            }
            DataType::Class | DataType::Unknown(_) => {
                return Err(Error::BadRecord(format!(
                    "{:?} is not a scalar type",
                    data_type
                )))
            }
        })
    }

    /// The decoded instance `instance_index` of struct `structure_index`
    ///
    /// Instances are decoded once; later calls return the same `Arc`.
    pub fn structure_instance(
        &self,
        structure_index: u32,
        instance_index: u32,
    ) -> Result<InstanceRef> {
        let key = (structure_index, instance_index);
        if let Some(hit) = self.instances.read().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let offset = self.instance_offset(structure_index, instance_index)?;
        let properties = self.decode_structure_instance(structure_index, offset)?;
        let instance = Arc::new(StructureInstance {
            structure_index,
            instance_index,
            type_name: self.struct_name(structure_index)?.to_string(),
            properties,
        });

        // another thread may have decoded the same pair meanwhile; first insert wins
        let mut cache = self.instances.write();
        Ok(Arc::clone(cache.entry(key).or_insert(instance)))
    }

    /// The instance a record's data lives in
    pub fn record_instance(&self, record: &Record) -> Result<InstanceRef> {
        self.structure_instance(record.structure_index, record.instance_index)
    }

    /// Follow a pointer; null pointers resolve to `None` without touching the data
    pub fn resolve_pointer(&self, pointer: &Pointer) -> Result<Option<InstanceRef>> {
        if pointer.is_null() {
            return Ok(None);
        }
        self.structure_instance(pointer.structure_index, pointer.instance_index)
            .map(Some)
    }

    /// Follow a reference to the record it names
    ///
    /// Null references and GUIDs with no record resolve to `None`.
    pub fn resolve_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<(&Record, InstanceRef)>> {
        if reference.is_null() {
            return Ok(None);
        }
        match self.get_record_by_guid(&reference.guid) {
            Ok(record) => Ok(Some((record, self.record_instance(record)?))),
            Err(e) if e.is_not_found() => {
                log::debug!("dangling reference to {}", reference.guid);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Materialise the elements of an array property
    ///
    /// Class arrays yield [`Value::Pointer`]s of kind [`PointerKind::Class`]; every
    /// other type is read from its value pool.
    pub fn array_values(&self, range: &ArrayRange) -> Result<Vec<Value>> {
        if range.count == 0 {
            return Ok(Vec::new());
        }
        let pool = if range.data_type == DataType::Class {
            None
        } else {
            Some(self.pools.for_type(range.data_type).ok_or_else(|| {
                Error::BadRecord(format!("no value pool for {:?}", range.data_type))
            })?)
        };
        let available = match pool {
            Some(pool) => pool.count,
            None => self.instance_count(range.type_index as u32),
        };
        let end = range.first_index as u64 + range.count as u64;
        if end > available as u64 {
            return Err(Error::BadRecord(format!(
                "array of {} {:?} from {} runs past the {} stored",
                range.count, range.data_type, range.first_index, available
            )));
        }

        let mut values = Vec::with_capacity(range.count as usize);
        for index in range.first_index..range.first_index + range.count {
            let value = match pool {
                None => Value::Pointer(Pointer {
                    kind: PointerKind::Class,
                    structure_index: range.type_index as u32,
                    instance_index: index,
                }),
                Some(pool) => {
                    let mut cursor = self.pool_cursor(pool, index)?;
                    self.read_scalar(&mut cursor, range.data_type, range.type_index)?
                }
            };
            values.push(value);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataforge::testing::{guid, DcbBuilder, Prop};

    fn node_bytes(value: i32, next: Option<(u32, u32)>, children: (u32, u32), label: u32) -> Vec<u8> {
        let (s, i) = next.unwrap_or((NO_INDEX, NO_INDEX));
        let mut out = Vec::new();
        out.extend_from_slice(&value.to_le_bytes());
        out.extend_from_slice(&s.to_le_bytes());
        out.extend_from_slice(&i.to_le_bytes());
        out.extend_from_slice(&children.0.to_le_bytes());
        out.extend_from_slice(&children.1.to_le_bytes());
        out.extend_from_slice(&label.to_le_bytes());
        out
    }

    /// Node { value: i32, next: StrongPointer<Node>, children: Node[], label: String }
    fn linked_nodes() -> DataForge {
        let mut b = DcbBuilder::new();
        let node = b.add_struct(
            "Node",
            None,
            &[
                Prop::attr("value", DataType::Int32),
                Prop::pointer("next", DataType::StrongPointer, 0),
                Prop::array_of("children", DataType::Class, 0),
                Prop::attr("label", DataType::String),
            ],
        );
        let a_label = b.text("first");
        let b_label = b.text("second");

        // node 0 -> node 1 -> node 0
        let first = node_bytes(7, Some((node, 1)), (0, 0), a_label);
        let second = node_bytes(8, Some((node, 0)), (1, 0), b_label);
        b.add_instance(node, first);
        b.add_instance(node, second);
        b.add_record("Node.Head", "head.xml", node, guid(5), 0);
        DataForge::parse(&b.build()).unwrap()
    }

    #[test]
    fn test_decode_instance_properties() {
        let df = linked_nodes();
        let head = df.structure_instance(0, 0).unwrap();
        assert_eq!(head.type_name, "Node");
        assert_eq!(head.get("value"), Some(&Value::Int32(7)));
        assert_eq!(head.get("label").and_then(Value::as_str), Some("first"));
        match head.get("children") {
            Some(Value::Array(range)) => assert!(range.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pointer_resolution_is_memoised() {
        let df = linked_nodes();
        let head = df.structure_instance(0, 0).unwrap();
        let next = head.get("next").and_then(Value::as_pointer).copied().unwrap();

        let a = df.resolve_pointer(&next).unwrap().unwrap();
        let b = df.resolve_pointer(&next).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.get("value"), Some(&Value::Int32(8)));

        // and back again
        let back = a.get("next").and_then(Value::as_pointer).copied().unwrap();
        let again = df.resolve_pointer(&back).unwrap().unwrap();
        assert!(Arc::ptr_eq(&again, &head));
    }

    #[test]
    fn test_null_pointer_never_reads() {
        let df = linked_nodes();
        let null = Pointer {
            kind: PointerKind::Weak,
            structure_index: NO_INDEX,
            instance_index: NO_INDEX,
        };
        assert!(df.resolve_pointer(&null).unwrap().is_none());
        assert!(df.instances.read().is_empty());
    }

    #[test]
    fn test_class_array_elements() {
        let df = linked_nodes();
        let second = df.structure_instance(0, 1).unwrap();
        let range = match second.get("children") {
            Some(Value::Array(range)) => *range,
            other => panic!("unexpected {:?}", other),
        };
        let values = df.array_values(&range).unwrap();
        assert_eq!(values.len(), 1);
        let child = values[0].as_pointer().unwrap();
        assert_eq!(child.kind, PointerKind::Class);
        assert_eq!(child.instance_index, 0);
    }

    #[test]
    fn test_pool_array_bounds() {
        let df = linked_nodes();
        let range = ArrayRange {
            data_type: DataType::Int32,
            type_index: 0,
            first_index: 0,
            count: 3,
        };
        assert!(matches!(df.array_values(&range), Err(Error::BadRecord(_))));
    }

    #[test]
    fn test_oversized_array_is_bad_record() {
        let df = linked_nodes();
        for data_type in [DataType::Int32, DataType::Class] {
            let range = ArrayRange {
                data_type,
                type_index: 0,
                first_index: 0,
                count: u32::MAX,
            };
            assert!(matches!(df.array_values(&range), Err(Error::BadRecord(_))));
        }
        let past_end = ArrayRange {
            data_type: DataType::Class,
            type_index: 0,
            first_index: 1,
            count: 2,
        };
        assert!(matches!(df.array_values(&past_end), Err(Error::BadRecord(_))));
    }

    #[test]
    fn test_out_of_range_instance() {
        let df = linked_nodes();
        assert!(df.structure_instance(0, 2).is_err());
    }
}
