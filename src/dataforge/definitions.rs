//! Definition table structures for DataForge format

use crate::cursor::BinaryCursor;
use crate::dataforge::types::{ConversionType, DataType, Guid, NO_INDEX};
use crate::error::Result;

/// Struct definition entry
#[derive(Debug, Clone)]
pub struct StructDefinition {
    /// Offset into blob string table for struct name
    pub name_offset: u32,
    /// Index of parent struct or 0xFFFFFFFF if none
    pub parent_type_index: u32,
    /// Number of properties declared directly on this struct
    pub property_count: u16,
    /// Index of first property in property table
    pub first_property_index: u16,
    /// Size of struct data in bytes as declared by the file
    pub record_size: u32,
}

impl StructDefinition {
    pub const RECORD_SIZE: usize = 16;

    pub fn has_parent(&self) -> bool {
        self.parent_type_index != NO_INDEX
    }

    pub(crate) fn read(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        Ok(StructDefinition {
            name_offset: cursor.read_u32()?,
            parent_type_index: cursor.read_u32()?,
            property_count: cursor.read_u16()?,
            first_property_index: cursor.read_u16()?,
            record_size: cursor.read_u32()?,
        })
    }
}

/// Property definition entry
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    /// Offset into blob string table for property name
    pub name_offset: u32,
    /// Struct/enum index for complex types
    pub index: u16,
    pub data_type: DataType,
    /// How the property is stored (attribute vs array)
    pub conversion_type: ConversionType,
    pub padding: u16,
}

impl PropertyDefinition {
    pub const RECORD_SIZE: usize = 12;

    pub fn is_array(&self) -> bool {
        self.conversion_type.is_array()
    }

    pub(crate) fn read(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        Ok(PropertyDefinition {
            name_offset: cursor.read_u32()?,
            index: cursor.read_u16()?,
            data_type: DataType::from(cursor.read_u16()?),
            conversion_type: ConversionType::from(cursor.read_u16()?),
            padding: cursor.read_u16()?,
        })
    }
}

/// Enum definition entry
#[derive(Debug, Clone)]
pub struct EnumDefinition {
    /// Offset into blob string table for enum name
    pub name_offset: u32,
    pub value_count: u16,
    /// Index of first value in enum option table
    pub first_value_index: u16,
}

impl EnumDefinition {
    pub const RECORD_SIZE: usize = 8;

    pub(crate) fn read(cursor: &mut BinaryCursor<'_>) -> Result<Self> {
        Ok(EnumDefinition {
            name_offset: cursor.read_u32()?,
            value_count: cursor.read_u16()?,
            first_value_index: cursor.read_u16()?,
        })
    }
}

/// Data mapping entry - maps struct definitions to data instances
#[derive(Debug, Clone)]
pub struct DataMapping {
    /// Number of instances
    pub struct_count: u32,
    /// Index into struct table
    pub struct_index: u32,
}

impl DataMapping {
    pub const RECORD_SIZE_LEGACY: usize = 4;
    pub const RECORD_SIZE_V5: usize = 8;

    pub(crate) fn read(cursor: &mut BinaryCursor<'_>, file_version: i32) -> Result<Self> {
        if file_version >= 5 {
            Ok(DataMapping {
                struct_count: cursor.read_u32()?,
                struct_index: cursor.read_u32()?,
            })
        } else {
            Ok(DataMapping {
                struct_count: cursor.read_u16()? as u32,
                struct_index: cursor.read_u16()? as u32,
            })
        }
    }
}

/// Record definition entry - top-level data records
#[derive(Debug, Clone)]
pub struct RecordDefinition {
    /// Offset for record name in blob table
    pub name_offset: u32,
    /// Offset for file path in text table (absent in legacy)
    pub file_name_offset: u32,
    pub struct_index: u32,
    pub guid: Guid,
    /// Instance index within the struct's data block
    pub instance_index: u16,
    pub other_index: u16,
}

impl RecordDefinition {
    pub const RECORD_SIZE: usize = 32;
    /// Without file_name_offset
    pub const RECORD_SIZE_LEGACY: usize = 28;

    pub(crate) fn read(cursor: &mut BinaryCursor<'_>, is_legacy: bool) -> Result<Self> {
        let name_offset = cursor.read_u32()?;
        let file_name_offset = if is_legacy { 0 } else { cursor.read_u32()? };
        Ok(RecordDefinition {
            name_offset,
            file_name_offset,
            struct_index: cursor.read_u32()?,
            guid: Guid(cursor.read_array::<16>()?),
            instance_index: cursor.read_u16()?,
            other_index: cursor.read_u16()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_property_definition() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&7u32.to_le_bytes());
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&0x0110u16.to_le_bytes());
        raw.extend_from_slice(&0x0101u16.to_le_bytes());
        raw.extend_from_slice(&0u16.to_le_bytes());

        let mut cursor = BinaryCursor::new(&raw);
        let prop = PropertyDefinition::read(&mut cursor).unwrap();
        assert_eq!(prop.name_offset, 7);
        assert_eq!(prop.index, 3);
        assert_eq!(prop.data_type, DataType::StrongPointer);
        assert!(prop.is_array());
        assert_eq!(cursor.tell(), PropertyDefinition::RECORD_SIZE as u64);
    }

    #[test]
    fn test_legacy_data_mapping_uses_u16() {
        let raw = [2u8, 0, 5, 0];
        let mut cursor = BinaryCursor::new(&raw);
        let mapping = DataMapping::read(&mut cursor, 4).unwrap();
        assert_eq!(mapping.struct_count, 2);
        assert_eq!(mapping.struct_index, 5);
    }
}
