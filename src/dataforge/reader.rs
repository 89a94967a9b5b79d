//! Main DataForge parser/reader

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

use crate::cursor::{cstring_at, BinaryCursor};
use crate::dataforge::definitions::*;
use crate::dataforge::header::{DataForgeHeader, ValueCounts};
use crate::dataforge::types::*;
use crate::error::{Error, Result};
use crate::utils::create_glob_set;

/// Location of one homogeneous value pool
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Pool {
    pub offset: u64,
    pub count: u32,
    pub width: u64,
}

impl Pool {
    fn end(&self) -> u64 {
        self.offset + self.count as u64 * self.width
    }
}

/// The value pools in file order
#[derive(Debug, Clone, Default)]
pub(crate) struct ValuePools {
    pub int8: Pool,
    pub int16: Pool,
    pub int32: Pool,
    pub int64: Pool,
    pub uint8: Pool,
    pub uint16: Pool,
    pub uint32: Pool,
    pub uint64: Pool,
    pub boolean: Pool,
    pub single: Pool,
    pub double: Pool,
    pub guid: Pool,
    pub string: Pool,
    pub locale: Pool,
    pub enum_value: Pool,
    pub strong: Pool,
    pub weak: Pool,
    pub reference: Pool,
    pub enum_option: Pool,
}

impl ValuePools {
    /// Lay the pools out back to back starting at `start`
    fn layout(start: u64, counts: &ValueCounts) -> Self {
        let mut next = start;
        let mut pool = |count: u32, width: u64| {
            let p = Pool { offset: next, count, width };
            next = p.end();
            p
        };
        ValuePools {
            int8: pool(counts.int8, 1),
            int16: pool(counts.int16, 2),
            int32: pool(counts.int32, 4),
            int64: pool(counts.int64, 8),
            uint8: pool(counts.uint8, 1),
            uint16: pool(counts.uint16, 2),
            uint32: pool(counts.uint32, 4),
            uint64: pool(counts.uint64, 8),
            boolean: pool(counts.boolean, 1),
            single: pool(counts.single, 4),
            double: pool(counts.double, 8),
            guid: pool(counts.guid, Guid::RECORD_SIZE),
            string: pool(counts.string, 4),
            locale: pool(counts.locale, 4),
            enum_value: pool(counts.enum_value, 4),
            strong: pool(counts.strong, Pointer::RECORD_SIZE),
            weak: pool(counts.weak, Pointer::RECORD_SIZE),
            reference: pool(counts.reference, Reference::RECORD_SIZE),
            enum_option: pool(counts.enum_option, 4),
        }
    }

    fn end(&self) -> u64 {
        self.enum_option.end()
    }

    pub(crate) fn for_type(&self, data_type: DataType) -> Option<&Pool> {
        Some(match data_type {
            DataType::Boolean => &self.boolean,
            DataType::Int8 => &self.int8,
            DataType::Int16 => &self.int16,
            DataType::Int32 => &self.int32,
            DataType::Int64 => &self.int64,
            DataType::UInt8 => &self.uint8,
            DataType::UInt16 => &self.uint16,
            DataType::UInt32 => &self.uint32,
            DataType::UInt64 => &self.uint64,
            DataType::Single => &self.single,
            DataType::Double => &self.double,
            DataType::Guid => &self.guid,
            DataType::String => &self.string,
            DataType::Locale => &self.locale,
            DataType::Enum => &self.enum_value,
            DataType::StrongPointer => &self.strong,
            DataType::WeakPointer => &self.weak,
            DataType::Reference => &self.reference,
            DataType::Class | DataType::Unknown(_) => return None,
        })
    }
}

/// Inherited-then-own property list and computed instance size of a struct
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedStruct {
    pub size: u64,
    pub properties: Vec<usize>,
}

/// Where the instances of one struct live in the data section
#[derive(Debug, Clone, Copy)]
pub(crate) struct InstanceBlock {
    pub offset: u64,
    pub count: u32,
}

/// A top-level named record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Record name with the leading `StructName.` removed
    pub name: String,
    pub file_name: String,
    pub type_name: String,
    pub structure_index: u32,
    pub guid: Guid,
    pub instance_index: u32,
    pub other_index: u16,
}

/// Main DataForge reader structure
///
/// Definitions, names and struct sizes are resolved once at parse time. Instances
/// are decoded on demand and memoised per (structure, instance) pair, so the reader
/// can be shared across threads behind an `Arc`.
pub struct DataForge {
    data: Vec<u8>,
    pub header: DataForgeHeader,

    pub(crate) pools: ValuePools,
    text_offset: u64,
    blob_offset: u64,
    data_offset: u64,

    struct_definitions: Vec<StructDefinition>,
    property_definitions: Vec<PropertyDefinition>,
    enum_definitions: Vec<EnumDefinition>,
    data_mappings: Vec<DataMapping>,

    struct_names: Vec<String>,
    property_names: Vec<String>,
    enum_names: Vec<String>,
    enum_options: Vec<Vec<String>>,
    pub(crate) resolved: Vec<ResolvedStruct>,
    pub(crate) blocks: Vec<Option<InstanceBlock>>,

    records: Vec<Record>,
    records_by_guid: HashMap<Guid, usize>,
    path_to_record: HashMap<String, usize>,

    pub(crate) instances: RwLock<HashMap<(u32, u32), InstanceRef>>,
}

impl fmt::Debug for DataForge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataForge")
            .field("version", &self.header.file_version)
            .field("structs", &self.struct_definitions.len())
            .field("records", &self.records.len())
            .finish()
    }
}

impl DataForge {
    /// Check if data is a DataForge/DCB file
    pub fn is_dataforge(data: &[u8]) -> bool {
        if data.len() < DataForgeHeader::MIN_SIZE {
            return false;
        }
        // Star Citizen ships versions 5 to 8
        let version = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        (1..=10).contains(&version)
    }

    /// Parse DataForge data
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::from_vec(data.to_vec())
    }

    /// Parse DataForge data, taking ownership of the buffer
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        let header = DataForgeHeader::parse(&data)?;

        let mut cursor = BinaryCursor::at(&data, header.header_size)?;
        let struct_definitions = (0..header.struct_definition_count)
            .map(|_| StructDefinition::read(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let property_definitions = (0..header.property_definition_count)
            .map(|_| PropertyDefinition::read(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let enum_definitions = (0..header.enum_definition_count)
            .map(|_| EnumDefinition::read(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        let data_mappings = (0..header.data_mapping_count)
            .map(|_| DataMapping::read(&mut cursor, header.file_version))
            .collect::<Result<Vec<_>>>()?;
        let record_definitions = (0..header.record_definition_count)
            .map(|_| RecordDefinition::read(&mut cursor, header.is_legacy))
            .collect::<Result<Vec<_>>>()?;

        let pools = ValuePools::layout(cursor.tell(), &header.values);
        let text_offset = pools.end();
        let blob_offset = text_offset + header.text_length as u64;
        let data_offset = blob_offset + header.blob_length as u64;
        if data_offset > data.len() as u64 {
            return Err(Error::OutOfRange {
                offset: data_offset,
                len: data.len() as u64,
            });
        }

        let mut df = DataForge {
            data,
            header,
            pools,
            text_offset,
            blob_offset,
            data_offset,
            struct_definitions,
            property_definitions,
            enum_definitions,
            data_mappings,
            struct_names: Vec::new(),
            property_names: Vec::new(),
            enum_names: Vec::new(),
            enum_options: Vec::new(),
            resolved: Vec::new(),
            blocks: Vec::new(),
            records: Vec::new(),
            records_by_guid: HashMap::new(),
            path_to_record: HashMap::new(),
            instances: RwLock::new(HashMap::new()),
        };

        df.read_names()?;
        df.resolved = df.resolve_structs()?;
        df.blocks = df.map_instance_blocks()?;
        df.index_records(&record_definitions)?;

        Ok(df)
    }

    fn read_names(&mut self) -> Result<()> {
        self.struct_names = self
            .struct_definitions
            .iter()
            .map(|s| self.read_blob_at_offset(s.name_offset as u64))
            .collect();
        self.property_names = self
            .property_definitions
            .iter()
            .map(|p| self.read_blob_at_offset(p.name_offset as u64))
            .collect();
        self.enum_names = self
            .enum_definitions
            .iter()
            .map(|e| self.read_blob_at_offset(e.name_offset as u64))
            .collect();

        let mut enum_options = Vec::with_capacity(self.enum_definitions.len());
        for def in &self.enum_definitions {
            let mut options = Vec::with_capacity(def.value_count as usize);
            for i in 0..def.value_count as u32 {
                let index = def.first_value_index as u32 + i;
                let offset = self.pool_cursor(&self.pools.enum_option, index)?.read_u32()?;
                options.push(self.read_blob_at_offset(offset as u64));
            }
            enum_options.push(options);
        }
        self.enum_options = enum_options;
        Ok(())
    }

    /// Flatten parent chains and compute every struct's instance size
    fn resolve_structs(&self) -> Result<Vec<ResolvedStruct>> {
        let count = self.struct_definitions.len();
        let mut resolved = Vec::with_capacity(count);
        for index in 0..count {
            resolved.push(ResolvedStruct {
                size: 0,
                properties: self.collect_properties(index)?,
            });
        }

        let mut sizes: Vec<Option<u64>> = vec![None; count];
        let mut visiting = vec![false; count];
        for index in 0..count {
            let size = self.struct_size(index, &resolved, &mut sizes, &mut visiting)?;
            resolved[index].size = size;

            let declared = self.struct_definitions[index].record_size as u64;
            if declared != size {
                log::debug!(
                    "struct {} declares {} bytes, computed {}",
                    self.struct_names[index],
                    declared,
                    size
                );
            }
        }
        Ok(resolved)
    }

    fn collect_properties(&self, index: usize) -> Result<Vec<usize>> {
        let mut chain = vec![index];
        let mut current = &self.struct_definitions[index];
        while current.has_parent() {
            let parent = current.parent_type_index as usize;
            if parent >= self.struct_definitions.len() || chain.len() > self.struct_definitions.len() {
                return Err(Error::BadRecord(format!(
                    "struct {} has a broken parent chain",
                    self.struct_names[index]
                )));
            }
            chain.push(parent);
            current = &self.struct_definitions[parent];
        }

        let mut properties = Vec::new();
        for &s in chain.iter().rev() {
            let def = &self.struct_definitions[s];
            let first = def.first_property_index as usize;
            let end = first + def.property_count as usize;
            if end > self.property_definitions.len() {
                return Err(Error::BadRecord(format!(
                    "struct {} properties {}..{} exceed the property table",
                    self.struct_names[s], first, end
                )));
            }
            properties.extend(first..end);
        }
        Ok(properties)
    }

    fn struct_size(
        &self,
        index: usize,
        resolved: &[ResolvedStruct],
        sizes: &mut [Option<u64>],
        visiting: &mut [bool],
    ) -> Result<u64> {
        if let Some(size) = sizes[index] {
            return Ok(size);
        }
        if visiting[index] {
            return Err(Error::BadRecord(format!(
                "struct {} contains itself inline",
                self.struct_names[index]
            )));
        }
        visiting[index] = true;

        let mut size = 0;
        for &p in &resolved[index].properties {
            let prop = &self.property_definitions[p];
            size += if prop.is_array() {
                ARRAY_POINTER_SIZE
            } else if prop.data_type == DataType::Class {
                let nested = prop.index as usize;
                if nested >= self.struct_definitions.len() {
                    return Err(Error::BadRecord(format!(
                        "property {} names missing struct {}",
                        self.property_names[p], nested
                    )));
                }
                self.struct_size(nested, resolved, sizes, visiting)?
            } else {
                prop.data_type.scalar_width().ok_or_else(|| {
                    Error::BadRecord(format!(
                        "property {} has unknown data type {:?}",
                        self.property_names[p], prop.data_type
                    ))
                })?
            };
        }

        visiting[index] = false;
        sizes[index] = Some(size);
        Ok(size)
    }

    /// Assign each struct its block of instances in data-mapping order
    fn map_instance_blocks(&self) -> Result<Vec<Option<InstanceBlock>>> {
        let mut blocks = vec![None; self.struct_definitions.len()];
        let mut offset = self.data_offset;
        for mapping in &self.data_mappings {
            let index = mapping.struct_index as usize;
            let resolved = self.resolved.get(index).ok_or_else(|| {
                Error::BadRecord(format!("data mapping names missing struct {}", index))
            })?;
            if blocks[index].is_some() {
                log::warn!(
                    "struct {} mapped twice, keeping the first block",
                    self.struct_names[index]
                );
            } else {
                blocks[index] = Some(InstanceBlock {
                    offset,
                    count: mapping.struct_count,
                });
            }
            offset += mapping.struct_count as u64 * resolved.size;
        }
        if offset > self.data.len() as u64 {
            log::warn!(
                "data section needs {} bytes but the file has {}",
                offset,
                self.data.len()
            );
        }
        Ok(blocks)
    }

    fn index_records(&mut self, definitions: &[RecordDefinition]) -> Result<()> {
        let mut records = Vec::with_capacity(definitions.len());
        for def in definitions {
            let type_name = self
                .struct_names
                .get(def.struct_index as usize)
                .cloned()
                .ok_or_else(|| {
                    Error::BadRecord(format!(
                        "record {} names missing struct {}",
                        def.guid, def.struct_index
                    ))
                })?;
            let full_name = self.read_blob_at_offset(def.name_offset as u64);
            let name = full_name
                .strip_prefix(&format!("{}.", type_name))
                .map(str::to_string)
                .unwrap_or(full_name);
            let file_name = if self.header.is_legacy {
                String::new()
            } else {
                self.read_text_at_offset(def.file_name_offset as u64)
            };
            records.push(Record {
                name,
                file_name,
                type_name,
                structure_index: def.struct_index,
                guid: def.guid,
                instance_index: def.instance_index as u32,
                other_index: def.other_index,
            });
        }

        for (idx, record) in records.iter().enumerate() {
            if self.records_by_guid.insert(record.guid, idx).is_some() {
                log::debug!("duplicate record GUID {}", record.guid);
            }
            self.path_to_record
                .entry(record.file_name.clone())
                .or_insert(idx);
        }
        self.records = records;
        Ok(())
    }

    // String reading methods
    pub fn read_text_at_offset(&self, offset: u64) -> String {
        cstring_at(&self.data, (self.text_offset + offset) as usize)
    }

    /// Names live in the blob table from version 6 on
    pub fn read_blob_at_offset(&self, offset: u64) -> String {
        if self.header.has_blob_table() {
            cstring_at(&self.data, (self.blob_offset + offset) as usize)
        } else {
            self.read_text_at_offset(offset)
        }
    }

    /// Position a cursor on element `index` of `pool`
    pub(crate) fn pool_cursor(&self, pool: &Pool, index: u32) -> Result<BinaryCursor<'_>> {
        if index >= pool.count {
            return Err(Error::BadRecord(format!(
                "value index {} outside pool of {}",
                index, pool.count
            )));
        }
        BinaryCursor::at(&self.data, pool.offset + index as u64 * pool.width)
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Look a record up by GUID
    pub fn get_record_by_guid(&self, guid: &Guid) -> Result<&Record> {
        self.records_by_guid
            .get(guid)
            .map(|&idx| &self.records[idx])
            .ok_or_else(|| Error::NotFound(format!("record {}", guid)))
    }

    /// Look a record up by its textual GUID
    pub fn get_record(&self, guid: &str) -> Result<&Record> {
        self.get_record_by_guid(&guid.parse()?)
    }

    /// First record stored under `file_name`
    pub fn record_by_path(&self, file_name: &str) -> Option<&Record> {
        self.path_to_record.get(file_name).map(|&idx| &self.records[idx])
    }

    pub fn record_paths(&self) -> impl Iterator<Item = &String> {
        self.path_to_record.keys()
    }

    /// Records whose file name matches any of `patterns` (case-insensitive globs)
    pub fn search_filename<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<&Record>> {
        let set = create_glob_set(patterns, true)?;
        Ok(self
            .records
            .iter()
            .filter(|r| set.is_match(&r.file_name))
            .collect())
    }

    pub fn struct_definitions(&self) -> &[StructDefinition] {
        &self.struct_definitions
    }

    pub fn property_definitions(&self) -> &[PropertyDefinition] {
        &self.property_definitions
    }

    pub fn enum_definitions(&self) -> &[EnumDefinition] {
        &self.enum_definitions
    }

    pub fn data_mappings(&self) -> &[DataMapping] {
        &self.data_mappings
    }

    pub fn struct_name(&self, index: u32) -> Result<&str> {
        self.struct_names
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::BadRecord(format!("struct index {} out of range", index)))
    }

    pub fn property_name(&self, index: usize) -> Result<&str> {
        self.property_names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::BadRecord(format!("property index {} out of range", index)))
    }

    pub fn enum_name(&self, index: usize) -> Result<&str> {
        self.enum_names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::BadRecord(format!("enum index {} out of range", index)))
    }

    /// The option names declared by enum `index`
    pub fn enum_options(&self, index: usize) -> Result<&[String]> {
        self.enum_options
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::BadRecord(format!("enum index {} out of range", index)))
    }

    pub(crate) fn resolved_struct(&self, index: u32) -> Result<&ResolvedStruct> {
        self.resolved
            .get(index as usize)
            .ok_or_else(|| Error::BadRecord(format!("struct index {} out of range", index)))
    }

    /// Computed byte size of one instance of struct `index`
    pub fn struct_size_of(&self, index: u32) -> Result<u64> {
        Ok(self.resolved_struct(index)?.size)
    }

    /// Number of instances stored for struct `index`
    pub fn instance_count(&self, index: u32) -> u32 {
        self.blocks
            .get(index as usize)
            .copied()
            .flatten()
            .map_or(0, |b| b.count)
    }

    /// Absolute offset of instance `instance` of struct `structure`
    pub fn instance_offset(&self, structure: u32, instance: u32) -> Result<u64> {
        let size = self.resolved_struct(structure)?.size;
        let block = self.blocks[structure as usize].ok_or_else(|| {
            Error::BadRecord(format!(
                "struct {} has no instances",
                self.struct_names[structure as usize]
            ))
        })?;
        if instance >= block.count {
            return Err(Error::BadRecord(format!(
                "instance {} of {} out of range ({} stored)",
                instance, self.struct_names[structure as usize], block.count
            )));
        }
        Ok(block.offset + instance as u64 * size)
    }

    /// Every property of struct `index` with its offset from the start of an instance
    pub fn property_offsets(&self, index: u32) -> Result<Vec<(String, u64)>> {
        let resolved = self.resolved_struct(index)?;
        let mut offset = 0;
        let mut offsets = Vec::with_capacity(resolved.properties.len());
        for &p in &resolved.properties {
            let prop = &self.property_definitions[p];
            offsets.push((self.property_names[p].clone(), offset));
            offset += if prop.is_array() {
                ARRAY_POINTER_SIZE
            } else if prop.data_type == DataType::Class {
                self.resolved[prop.index as usize].size
            } else {
                prop.data_type.scalar_width().unwrap_or(0)
            };
        }
        Ok(offsets)
    }

    pub(crate) fn enum_choice(&self, enum_index: u16, raw: u32) -> EnumChoice {
        let text = self.read_text_at_offset(raw as u64);
        let known = self
            .enum_options
            .get(enum_index as usize)
            .is_some_and(|options| options.iter().any(|o| *o == text));
        if known {
            EnumChoice::Known(text)
        } else {
            if !text.is_empty() {
                log::warn!(
                    "value {:?} is not an option of enum {}",
                    text,
                    self.enum_names
                        .get(enum_index as usize)
                        .map_or("?", String::as_str)
                );
            }
            EnumChoice::Unrecognized { raw, text }
        }
    }
}
