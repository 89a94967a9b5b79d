//! In-memory DataForge image builder for tests

use std::collections::HashMap;

use crate::dataforge::types::{DataType, Guid, NO_INDEX};

/// A GUID distinguishable by its first byte
pub(crate) fn guid(n: u8) -> Guid {
    let mut raw = [0u8; 16];
    raw[0] = n;
    raw[15] = 0xA0;
    Guid(raw)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Prop {
    name: &'static str,
    data_type: DataType,
    conversion: u16,
    index: u16,
}

impl Prop {
    pub(crate) fn attr(name: &'static str, data_type: DataType) -> Self {
        Prop { name, data_type, conversion: 0, index: 0 }
    }

    pub(crate) fn array(name: &'static str, data_type: DataType) -> Self {
        Self::array_of(name, data_type, 0)
    }

    pub(crate) fn array_of(name: &'static str, data_type: DataType, index: u16) -> Self {
        let conversion = if data_type == DataType::Class { 3 } else { 2 };
        Prop { name, data_type, conversion, index }
    }

    pub(crate) fn pointer(name: &'static str, data_type: DataType, structure: u16) -> Self {
        Prop { name, data_type, conversion: 0, index: structure }
    }

    pub(crate) fn class(name: &'static str, structure: u16) -> Self {
        Prop { name, data_type: DataType::Class, conversion: 0, index: structure }
    }

    pub(crate) fn enumeration(name: &'static str, enum_index: u16) -> Self {
        Prop { name, data_type: DataType::Enum, conversion: 0, index: enum_index }
    }
}

/// Header slot of each value pool
fn slot(data_type: DataType) -> usize {
    match data_type {
        DataType::Boolean => 0,
        DataType::Int8 => 1,
        DataType::Int16 => 2,
        DataType::Int32 => 3,
        DataType::Int64 => 4,
        DataType::UInt8 => 5,
        DataType::UInt16 => 6,
        DataType::UInt32 => 7,
        DataType::UInt64 => 8,
        DataType::Single => 9,
        DataType::Double => 10,
        DataType::Guid => 11,
        DataType::String => 12,
        DataType::Locale => 13,
        DataType::Enum => 14,
        DataType::StrongPointer => 15,
        DataType::WeakPointer => 16,
        DataType::Reference => 17,
        other => panic!("{:?} has no value pool", other),
    }
}

const ENUM_OPTION_SLOT: usize = 18;
/// Pools are stored in a different order than their counts are declared
const FILE_ORDER: [usize; 19] = [1, 2, 3, 4, 5, 6, 7, 8, 0, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18];

/// Builds a version 6 DataForge image
pub(crate) struct DcbBuilder {
    structs: Vec<(u32, u32, u16, u16)>,
    props: Vec<(u32, u16, u16, u16)>,
    enums: Vec<(u32, u16, u16)>,
    instances: Vec<Vec<Vec<u8>>>,
    records: Vec<(u32, u32, u32, Guid, u16)>,
    pools: Vec<Vec<u8>>,
    pool_counts: [u32; 19],
    text: Vec<u8>,
    blob: Vec<u8>,
    text_index: HashMap<String, u32>,
    blob_index: HashMap<String, u32>,
}

impl DcbBuilder {
    pub(crate) fn new() -> Self {
        DcbBuilder {
            structs: Vec::new(),
            props: Vec::new(),
            enums: Vec::new(),
            instances: Vec::new(),
            records: Vec::new(),
            pools: vec![Vec::new(); 19],
            pool_counts: [0; 19],
            text: vec![0],
            blob: vec![0],
            text_index: HashMap::from([(String::new(), 0)]),
            blob_index: HashMap::from([(String::new(), 0)]),
        }
    }

    fn intern(table: &mut Vec<u8>, index: &mut HashMap<String, u32>, s: &str) -> u32 {
        if let Some(&offset) = index.get(s) {
            return offset;
        }
        let offset = table.len() as u32;
        table.extend_from_slice(s.as_bytes());
        table.push(0);
        index.insert(s.to_string(), offset);
        offset
    }

    /// Offset of `s` in the text table
    pub(crate) fn text(&mut self, s: &str) -> u32 {
        Self::intern(&mut self.text, &mut self.text_index, s)
    }

    /// Offset of `s` in the blob table
    pub(crate) fn blob(&mut self, s: &str) -> u32 {
        Self::intern(&mut self.blob, &mut self.blob_index, s)
    }

    pub(crate) fn add_struct(&mut self, name: &str, parent: Option<u32>, props: &[Prop]) -> u32 {
        let name = self.blob(name);
        let first = self.props.len() as u16;
        for prop in props {
            let prop_name = self.blob(prop.name);
            self.props
                .push((prop_name, prop.index, u16::from(prop.data_type), prop.conversion));
        }
        self.structs
            .push((name, parent.unwrap_or(NO_INDEX), props.len() as u16, first));
        self.structs.len() as u32 - 1
    }

    pub(crate) fn add_enum(&mut self, name: &str, options: &[&str]) -> u16 {
        let name = self.blob(name);
        let first = self.pool_counts[ENUM_OPTION_SLOT] as u16;
        for option in options {
            let offset = self.blob(option);
            self.pools[ENUM_OPTION_SLOT].extend_from_slice(&offset.to_le_bytes());
            self.pool_counts[ENUM_OPTION_SLOT] += 1;
        }
        self.enums.push((name, options.len() as u16, first));
        self.enums.len() as u16 - 1
    }

    /// Append raw instance bytes for `structure`, returning the instance index
    pub(crate) fn add_instance(&mut self, structure: u32, bytes: Vec<u8>) -> u32 {
        let s = structure as usize;
        if self.instances.len() <= s {
            self.instances.resize(s + 1, Vec::new());
        }
        self.instances[s].push(bytes);
        self.instances[s].len() as u32 - 1
    }

    /// Append one element to the pool for `data_type`, returning its index
    pub(crate) fn push_value(&mut self, data_type: DataType, bytes: &[u8]) -> u32 {
        let slot = slot(data_type);
        self.pools[slot].extend_from_slice(bytes);
        self.pool_counts[slot] += 1;
        self.pool_counts[slot] - 1
    }

    pub(crate) fn add_record(
        &mut self,
        name: &str,
        file_name: &str,
        structure: u32,
        guid: Guid,
        instance: u32,
    ) {
        let name = self.blob(name);
        let file_name = self.text(file_name);
        self.records
            .push((name, file_name, structure, guid, instance as u16));
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mappings: Vec<(u32, u32)> = self
            .instances
            .iter()
            .enumerate()
            .filter(|(_, list)| !list.is_empty())
            .map(|(s, list)| (list.len() as u32, s as u32))
            .collect();

        let mut out = Vec::new();
        let put16 = |out: &mut Vec<u8>, v: u16| out.extend_from_slice(&v.to_le_bytes());
        let put32 = |out: &mut Vec<u8>, v: u32| out.extend_from_slice(&v.to_le_bytes());

        put16(&mut out, 0);
        put16(&mut out, 0);
        put32(&mut out, 6);
        out.extend_from_slice(&[0; 8]);
        put32(&mut out, self.structs.len() as u32);
        put32(&mut out, self.props.len() as u32);
        put32(&mut out, self.enums.len() as u32);
        put32(&mut out, mappings.len() as u32);
        put32(&mut out, self.records.len() as u32);
        for count in self.pool_counts {
            put32(&mut out, count);
        }
        put32(&mut out, self.text.len() as u32);
        put32(&mut out, self.blob.len() as u32);

        for (s, &(name, parent, count, first)) in self.structs.iter().enumerate() {
            let record_size = self
                .instances
                .get(s)
                .and_then(|list| list.first())
                .map_or(0, |bytes| bytes.len() as u32);
            put32(&mut out, name);
            put32(&mut out, parent);
            put16(&mut out, count);
            put16(&mut out, first);
            put32(&mut out, record_size);
        }
        for &(name, index, data_type, conversion) in &self.props {
            put32(&mut out, name);
            put16(&mut out, index);
            put16(&mut out, data_type);
            put16(&mut out, conversion);
            put16(&mut out, 0);
        }
        for &(name, count, first) in &self.enums {
            put32(&mut out, name);
            put16(&mut out, count);
            put16(&mut out, first);
        }
        for &(count, index) in &mappings {
            put32(&mut out, count);
            put32(&mut out, index);
        }
        for &(name, file_name, structure, guid, instance) in &self.records {
            put32(&mut out, name);
            put32(&mut out, file_name);
            put32(&mut out, structure);
            out.extend_from_slice(&guid.0);
            put16(&mut out, instance);
            put16(&mut out, 0);
        }
        for slot in FILE_ORDER {
            out.extend_from_slice(&self.pools[slot]);
        }
        out.extend_from_slice(&self.text);
        out.extend_from_slice(&self.blob);
        for &(_, index) in &mappings {
            for bytes in &self.instances[index as usize] {
                out.extend_from_slice(bytes);
            }
        }
        out
    }
}
