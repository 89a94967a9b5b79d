//! Data types and enumerations for DataForge format

use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

/// Sentinel index meaning "no parent" / "null pointer"
pub const NO_INDEX: u32 = 0xFFFF_FFFF;

/// Data type enumeration for property values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    String,
    Single,
    Double,
    Locale,
    Guid,
    Enum,
    Class,
    StrongPointer,
    WeakPointer,
    Reference,
    Unknown(u16),
}

impl From<u16> for DataType {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => DataType::Boolean,
            0x0002 => DataType::Int8,
            0x0003 => DataType::Int16,
            0x0004 => DataType::Int32,
            0x0005 => DataType::Int64,
            0x0006 => DataType::UInt8,
            0x0007 => DataType::UInt16,
            0x0008 => DataType::UInt32,
            0x0009 => DataType::UInt64,
            0x000A => DataType::String,
            0x000B => DataType::Single,
            0x000C => DataType::Double,
            0x000D => DataType::Locale,
            0x000E => DataType::Guid,
            0x000F => DataType::Enum,
            0x0010 => DataType::Class,
            0x0110 => DataType::StrongPointer,
            0x0210 => DataType::WeakPointer,
            0x0310 => DataType::Reference,
            v => DataType::Unknown(v),
        }
    }
}

impl From<DataType> for u16 {
    fn from(value: DataType) -> u16 {
        match value {
            DataType::Boolean => 0x0001,
            DataType::Int8 => 0x0002,
            DataType::Int16 => 0x0003,
            DataType::Int32 => 0x0004,
            DataType::Int64 => 0x0005,
            DataType::UInt8 => 0x0006,
            DataType::UInt16 => 0x0007,
            DataType::UInt32 => 0x0008,
            DataType::UInt64 => 0x0009,
            DataType::String => 0x000A,
            DataType::Single => 0x000B,
            DataType::Double => 0x000C,
            DataType::Locale => 0x000D,
            DataType::Guid => 0x000E,
            DataType::Enum => 0x000F,
            DataType::Class => 0x0010,
            DataType::StrongPointer => 0x0110,
            DataType::WeakPointer => 0x0210,
            DataType::Reference => 0x0310,
            DataType::Unknown(v) => v,
        }
    }
}

impl DataType {
    /// Inline width of a scalar of this type; `None` for classes, whose width
    /// depends on the structure
    pub fn scalar_width(&self) -> Option<u64> {
        Some(match self {
            DataType::Boolean | DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32
            | DataType::UInt32
            | DataType::Single
            | DataType::String
            | DataType::Locale
            | DataType::Enum => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Double => 8,
            DataType::StrongPointer | DataType::WeakPointer => Pointer::RECORD_SIZE,
            DataType::Guid => Guid::RECORD_SIZE,
            DataType::Reference => Reference::RECORD_SIZE,
            DataType::Class | DataType::Unknown(_) => return None,
        })
    }
}

/// Conversion type for how properties are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionType {
    /// Direct attribute value
    Attribute,
    /// Complex array
    ComplexArray,
    /// Simple array
    SimpleArray,
    /// Class array
    ClassArray,
    Unknown(u16),
}

impl From<u16> for ConversionType {
    fn from(value: u16) -> Self {
        match value & 0xFF {
            0x00 => ConversionType::Attribute,
            0x01 => ConversionType::ComplexArray,
            0x02 => ConversionType::SimpleArray,
            0x03 => ConversionType::ClassArray,
            v => ConversionType::Unknown(v),
        }
    }
}

impl ConversionType {
    pub fn is_array(&self) -> bool {
        !matches!(self, ConversionType::Attribute)
    }
}

/// Width of the (count, first index) pair stored inline for array properties
pub const ARRAY_POINTER_SIZE: u64 = 8;

/// A GUID as stored on disk
///
/// The 16 bytes read as `u16, u16, u32, 8 x u8` (c, b, a, k..d) and print as
/// `a-b-c-de-fghijk`, which is not the byte order in the file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub const RECORD_SIZE: u64 = 16;
    pub const EMPTY: Guid = Guid([0; 16]);

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.0;
        let c = u16::from_le_bytes([r[0], r[1]]);
        let b = u16::from_le_bytes([r[2], r[3]]);
        let a = u32::from_le_bytes([r[4], r[5], r[6], r[7]]);
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            a, b, c, r[15], r[14], r[13], r[12], r[11], r[10], r[9], r[8]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

impl FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.trim_matches(|c| c == '{' || c == '}').replace('-', "");
        if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::BadRecord(format!("malformed GUID {:?}", s)));
        }
        let mut text = [0u8; 16];
        for (i, byte) in text.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::BadRecord(format!("malformed GUID {:?}", s)))?;
        }

        // text order is a(4) b(2) c(2) d e f g h i j k
        let mut raw = [0u8; 16];
        raw[0..2].copy_from_slice(&[text[7], text[6]]);
        raw[2..4].copy_from_slice(&[text[5], text[4]]);
        raw[4..8].copy_from_slice(&[text[3], text[2], text[1], text[0]]);
        for i in 0..8 {
            raw[8 + i] = text[15 - i];
        }
        Ok(Guid(raw))
    }
}

/// Which kind of pointer produced a [`Pointer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Strong,
    Weak,
    /// Element of a class array, always owned by its parent
    Class,
}

/// A (structure, instance) pair pointing into the data section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub kind: PointerKind,
    pub structure_index: u32,
    pub instance_index: u32,
}

impl Pointer {
    pub const RECORD_SIZE: u64 = 8;

    pub fn is_null(&self) -> bool {
        self.structure_index == NO_INDEX || self.instance_index == NO_INDEX
    }
}

/// A reference to another record by GUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference {
    pub instance_index: u32,
    pub guid: Guid,
}

impl Reference {
    pub const RECORD_SIZE: u64 = 20;

    pub fn is_null(&self) -> bool {
        self.guid.is_empty()
    }
}

/// An enum property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumChoice {
    /// One of the options declared by the enum definition
    Known(String),
    /// A string offset whose text is not among the declared options
    Unrecognized { raw: u32, text: String },
}

impl EnumChoice {
    pub fn as_str(&self) -> &str {
        match self {
            EnumChoice::Known(name) => name,
            EnumChoice::Unrecognized { text, .. } => text,
        }
    }
}

/// An array property: `count` elements of a shared pool starting at `first_index`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    pub data_type: DataType,
    /// Structure index for class/pointer arrays, enum index for enum arrays
    pub type_index: u16,
    pub first_index: u32,
    pub count: u32,
}

impl ArrayRange {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// An inline structure value
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub structure_index: u32,
    pub properties: IndexMap<String, Value>,
}

/// A decoded property value
///
/// Pointers, references and arrays are kept unresolved; see
/// [`DataForge::resolve_pointer`](crate::dataforge::DataForge::resolve_pointer) and
/// [`DataForge::array_values`](crate::dataforge::DataForge::array_values).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Single(f32),
    Double(f64),
    String(String),
    Locale(String),
    Guid(Guid),
    Enum(EnumChoice),
    Class(StructValue),
    Pointer(Pointer),
    Reference(Reference),
    Array(ArrayRange),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Locale(s) => Some(s),
            Value::Enum(e) => Some(e.as_str()),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&Pointer> {
        match self {
            Value::Pointer(p) => Some(p),
            _ => None,
        }
    }
}

/// A resolved (structure, instance) pair with its decoded properties
#[derive(Debug, PartialEq)]
pub struct StructureInstance {
    pub structure_index: u32,
    pub instance_index: u32,
    pub type_name: String,
    pub properties: IndexMap<String, Value>,
}

impl StructureInstance {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Shared handle to a memoised instance
pub type InstanceRef = Arc<StructureInstance>;
