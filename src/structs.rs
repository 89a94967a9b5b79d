//! Declarative fixed-layout struct decoding
//!
//! A [`StructLayout`] is a static list of [`FieldDef`]s. Decoding reads every field in
//! declaration order at its cumulative offset, so the layout doubles as documentation of
//! the on-disk record.
//!
//! Integer fields may carry one or more [`EnumDomain`]s. The raw value is matched against
//! each domain in turn; the first hit wins. A value no domain knows about is kept as
//! [`EnumValue::Unrecognized`] and logged, the rest of the record still decodes.
//!
//! ```
//! use cryunpack::structs::{FieldDef, FieldKind, StructLayout};
//!
//! static PAIR: StructLayout = StructLayout::new(
//!     "Pair",
//!     &[
//!         FieldDef::new("left", FieldKind::U16),
//!         FieldDef::new("right", FieldKind::U32),
//!     ],
//! );
//!
//! let data = [0xFF, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
//! let decoded = PAIR.decode(&data, 1).unwrap();
//! assert_eq!(decoded.uint("left").unwrap(), 1);
//! assert_eq!(decoded.uint("right").unwrap(), 2);
//! ```

use indexmap::IndexMap;
use serde::Serialize;

use crate::cursor::BinaryCursor;
use crate::error::{Error, Result};

/// Primitive field types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Opaque bytes of a fixed width
    Bytes(usize),
    /// NUL-padded string of a fixed width
    Str(usize),
}

impl FieldKind {
    /// Width of one element in bytes
    pub const fn width(&self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 | FieldKind::F32 => 4,
            FieldKind::U64 | FieldKind::I64 | FieldKind::F64 => 8,
            FieldKind::Bytes(n) | FieldKind::Str(n) => *n,
        }
    }
}

/// A catalogue of named values for one enumerated field
#[derive(Debug)]
pub struct EnumDomain {
    pub name: &'static str,
    pub variants: &'static [(&'static str, u64)],
}

impl EnumDomain {
    pub fn lookup(&self, raw: u64) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(_, value)| *value == raw)
            .map(|(name, _)| *name)
    }
}

/// One field of a [`StructLayout`]
#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Number of elements; anything other than 1 decodes as an array
    pub count: usize,
    /// Candidate enum domains, tried in order
    pub enums: &'static [&'static EnumDomain],
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            count: 1,
            enums: &[],
        }
    }

    pub const fn array(self, count: usize) -> Self {
        Self { count, ..self }
    }

    pub const fn with_enums(self, enums: &'static [&'static EnumDomain]) -> Self {
        Self { enums, ..self }
    }

    pub const fn size(&self) -> usize {
        self.kind.width() * self.count
    }
}

/// A named, ordered list of fields
#[derive(Debug)]
pub struct StructLayout {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

/// Result of matching a raw integer against a field's enum domains
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnumValue {
    Known {
        domain: &'static str,
        name: &'static str,
        value: u64,
    },
    Unrecognized(u64),
}

impl EnumValue {
    pub fn raw(&self) -> u64 {
        match self {
            EnumValue::Known { value, .. } => *value,
            EnumValue::Unrecognized(value) => *value,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, EnumValue::Known { .. })
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            EnumValue::Known { name, .. } => Some(name),
            EnumValue::Unrecognized(_) => None,
        }
    }

    /// Match `raw` against `domains` in order, logging when nothing matches
    pub fn classify(raw: u64, domains: &[&'static EnumDomain], context: &str) -> Self {
        for domain in domains {
            if let Some(name) = domain.lookup(raw) {
                return EnumValue::Known {
                    domain: domain.name,
                    name,
                    value: raw,
                };
            }
        }
        let names: Vec<&str> = domains.iter().map(|d| d.name).collect();
        log::warn!(
            "{}: value {:#x} is not a member of {}",
            context,
            raw,
            names.join(" | ")
        );
        EnumValue::Unrecognized(raw)
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Enum(EnumValue),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Integer view of the value, if it has one
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v),
            FieldValue::Signed(v) => Some(*v as u64),
            FieldValue::Enum(e) => Some(e.raw()),
            _ => None,
        }
    }
}

/// A decoded record: field values by name, in layout order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedStruct {
    #[serde(skip)]
    pub layout: &'static str,
    #[serde(skip)]
    pub offset: u64,
    #[serde(flatten)]
    pub fields: IndexMap<&'static str, FieldValue>,
}

impl DecodedStruct {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Integer value of a field
    pub fn uint(&self, name: &str) -> Result<u64> {
        self.get(name)
            .and_then(FieldValue::as_u64)
            .ok_or_else(|| Error::NotFound(format!("integer field {}.{}", self.layout, name)))
    }

    /// Enum value of a field declared with enum domains
    pub fn enum_value(&self, name: &str) -> Option<&EnumValue> {
        match self.get(name)? {
            FieldValue::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl StructLayout {
    pub const fn new(name: &'static str, fields: &'static [FieldDef]) -> Self {
        Self { name, fields }
    }

    /// Total encoded size in bytes
    pub fn size(&self) -> usize {
        self.fields.iter().map(FieldDef::size).sum()
    }

    /// Byte offset of each field relative to the start of the record
    pub fn offsets(&self) -> Vec<(&'static str, usize)> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|f| {
                let at = offset;
                offset += f.size();
                (f.name, at)
            })
            .collect()
    }

    /// Decode the record starting at `offset` in `data`
    pub fn decode(&self, data: &[u8], offset: u64) -> Result<DecodedStruct> {
        let mut cursor = BinaryCursor::at(data, offset)?;
        self.read(&mut cursor)
    }

    /// Decode the record at the cursor position, advancing past it
    pub fn read(&self, cursor: &mut BinaryCursor<'_>) -> Result<DecodedStruct> {
        let offset = cursor.tell();
        if cursor.remaining() < self.size() {
            return Err(Error::OutOfRange {
                offset,
                len: self.size() as u64,
            });
        }

        let mut fields = IndexMap::with_capacity(self.fields.len());
        for field in self.fields {
            let value = if field.count == 1 {
                self.read_element(cursor, field)?
            } else {
                let mut items = Vec::with_capacity(field.count);
                for _ in 0..field.count {
                    items.push(self.read_element(cursor, field)?);
                }
                FieldValue::Array(items)
            };
            fields.insert(field.name, value);
        }

        Ok(DecodedStruct {
            layout: self.name,
            offset,
            fields,
        })
    }

    fn read_element(&self, cursor: &mut BinaryCursor<'_>, field: &FieldDef) -> Result<FieldValue> {
        let value = match field.kind {
            FieldKind::U8 => FieldValue::Unsigned(cursor.read_u8()? as u64),
            FieldKind::U16 => FieldValue::Unsigned(cursor.read_u16()? as u64),
            FieldKind::U32 => FieldValue::Unsigned(cursor.read_u32()? as u64),
            FieldKind::U64 => FieldValue::Unsigned(cursor.read_u64()?),
            FieldKind::I8 => FieldValue::Signed(cursor.read_i8()? as i64),
            FieldKind::I16 => FieldValue::Signed(cursor.read_i16()? as i64),
            FieldKind::I32 => FieldValue::Signed(cursor.read_i32()? as i64),
            FieldKind::I64 => FieldValue::Signed(cursor.read_i64()?),
            FieldKind::F32 => FieldValue::Float(cursor.read_f32()? as f64),
            FieldKind::F64 => FieldValue::Float(cursor.read_f64()?),
            FieldKind::Bytes(n) => FieldValue::Bytes(cursor.read_exact(n)?.to_vec()),
            FieldKind::Str(n) => FieldValue::Str(cursor.read_fixed_str(n)?),
        };

        if field.enums.is_empty() {
            return Ok(value);
        }
        match value.as_u64() {
            Some(raw) => {
                let context = format!("{}.{}", self.name, field.name);
                Ok(FieldValue::Enum(EnumValue::classify(raw, field.enums, &context)))
            }
            None => Ok(value),
        }
    }
}

/// Declare a `#[repr]` enum together with its [`EnumDomain`] catalogue
///
/// The generated type gets `name()`, `from_raw()`, a `DOMAIN` constant for use in
/// [`FieldDef::with_enums`] and `TryFrom<repr>` returning the raw value on failure.
#[macro_export]
macro_rules! catalogued_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $($variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
        #[repr($repr)]
        $vis enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub const DOMAIN: $crate::structs::EnumDomain = $crate::structs::EnumDomain {
                name: stringify!($name),
                variants: &[$((stringify!($variant), $name::$variant as u64)),+],
            };

            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            pub fn from_raw(raw: u64) -> ::core::option::Option<Self> {
                $(
                    if raw == $name::$variant as u64 {
                        return ::core::option::Option::Some($name::$variant);
                    }
                )+
                ::core::option::Option::None
            }
        }

        impl ::core::convert::TryFrom<$repr> for $name {
            type Error = $repr;

            fn try_from(value: $repr) -> ::core::result::Result<Self, $repr> {
                $name::from_raw(value as u64).ok_or(value)
            }
        }
    };
}
