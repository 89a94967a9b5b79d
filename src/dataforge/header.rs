//! DataForge file header parsing

use crate::cursor::BinaryCursor;
use crate::error::{Error, Result};

/// Value pool counts in on-disk header order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueCounts {
    pub boolean: u32,
    pub int8: u32,
    pub int16: u32,
    pub int32: u32,
    pub int64: u32,
    pub uint8: u32,
    pub uint16: u32,
    pub uint32: u32,
    pub uint64: u32,
    pub single: u32,
    pub double: u32,
    pub guid: u32,
    pub string: u32,
    pub locale: u32,
    pub enum_value: u32,
    pub strong: u32,
    pub weak: u32,
    pub reference: u32,
    pub enum_option: u32,
}

/// DataForge file header containing counts and metadata
#[derive(Debug, Clone)]
pub struct DataForgeHeader {
    /// File format version
    pub file_version: i32,
    /// Whether this is a legacy format file
    pub is_legacy: bool,

    pub struct_definition_count: u32,
    pub property_definition_count: u32,
    pub enum_definition_count: u32,
    pub data_mapping_count: u32,
    pub record_definition_count: u32,

    pub values: ValueCounts,

    /// Length of the text table (values and file names)
    pub text_length: u32,
    /// Length of the blob table (type and property names); zero for legacy files
    pub blob_length: u32,

    /// Offset of the first byte after the header
    pub header_size: u64,
}

impl DataForgeHeader {
    /// Smallest header the parser accepts (legacy layout)
    pub const MIN_SIZE: usize = 0x6C;

    /// Parse header from data
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::BadRecord(format!(
                "file too small for a DataForge header ({} bytes)",
                data.len()
            )));
        }

        let mut cursor = BinaryCursor::new(data);
        let _temp00 = cursor.read_u16()?;
        let _unknown = cursor.read_u16()?;
        let file_version = cursor.read_i32()?;

        // Legacy files are smaller and have version < 6
        let is_legacy = data.len() < 0x0e2e00 && file_version < 6;
        if !is_legacy {
            cursor.skip(8)?;
        }

        let struct_definition_count = cursor.read_u32()?;
        let property_definition_count = cursor.read_u32()?;
        let enum_definition_count = cursor.read_u32()?;
        let data_mapping_count = cursor.read_u32()?;
        let record_definition_count = cursor.read_u32()?;

        let values = ValueCounts {
            boolean: cursor.read_u32()?,
            int8: cursor.read_u32()?,
            int16: cursor.read_u32()?,
            int32: cursor.read_u32()?,
            int64: cursor.read_u32()?,
            uint8: cursor.read_u32()?,
            uint16: cursor.read_u32()?,
            uint32: cursor.read_u32()?,
            uint64: cursor.read_u32()?,
            single: cursor.read_u32()?,
            double: cursor.read_u32()?,
            guid: cursor.read_u32()?,
            string: cursor.read_u32()?,
            locale: cursor.read_u32()?,
            enum_value: cursor.read_u32()?,
            strong: cursor.read_u32()?,
            weak: cursor.read_u32()?,
            reference: cursor.read_u32()?,
            enum_option: cursor.read_u32()?,
        };

        let text_length = cursor.read_u32()?;
        let blob_length = if is_legacy { 0 } else { cursor.read_u32()? };

        log::debug!(
            "DataForge v{}{}: {} structs, {} properties, {} records",
            file_version,
            if is_legacy { " (legacy)" } else { "" },
            struct_definition_count,
            property_definition_count,
            record_definition_count
        );

        Ok(DataForgeHeader {
            file_version,
            is_legacy,
            struct_definition_count,
            property_definition_count,
            enum_definition_count,
            data_mapping_count,
            record_definition_count,
            values,
            text_length,
            blob_length,
            header_size: cursor.tell(),
        })
    }

    /// Whether names live in the blob table rather than the text table
    pub fn has_blob_table(&self) -> bool {
        self.file_version >= 6 && !self.is_legacy
    }
}
