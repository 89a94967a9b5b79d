//! Chunk headers, decoded chunk bodies and the decoder registry

use serde::Serialize;

use crate::chunkfile::defs::*;
use crate::chunkfile::included_objects::IncludedObjects;
use crate::cryxml::{CryXmlElement, CryXmlReader};
use crate::cursor::BinaryCursor;
use crate::error::{Error, Result};
use crate::structs::{DecodedStruct, EnumValue};

/// One entry of a chunk table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkHeader {
    pub chunk_type: EnumValue,
    pub version: u32,
    /// Cross-reference id, only meaningful within one file; `#ivo` chunks have none
    pub id: Option<u32>,
    pub offset: u64,
    pub size: u64,
}

impl ChunkHeader {
    pub(crate) fn from_chcr(record: &DecodedStruct) -> Result<Self> {
        Ok(ChunkHeader {
            chunk_type: type_field(record)?,
            version: record.uint("version")? as u32,
            id: Some(record.uint("id")? as u32),
            offset: record.uint("offset")?,
            size: record.uint("size")?,
        })
    }

    /// `#ivo` tables carry no size; it is filled in from the chunk layout
    pub(crate) fn from_ivo(record: &DecodedStruct) -> Result<Self> {
        Ok(ChunkHeader {
            chunk_type: type_field(record)?,
            version: record.uint("version")? as u32,
            id: None,
            offset: record.uint("offset")?,
            size: 0,
        })
    }

    pub fn raw_type(&self) -> u32 {
        self.chunk_type.raw() as u32
    }

    /// Name of the chunk type, if it is a catalogued one
    pub fn type_name(&self) -> Option<&'static str> {
        self.chunk_type.name()
    }
}

fn type_field(record: &DecodedStruct) -> Result<EnumValue> {
    record
        .enum_value("type")
        .cloned()
        .ok_or_else(|| Error::BadChunkFile("chunk header without a type".into()))
}

/// Material name chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MtlName {
    pub name: String,
    pub mat_type: MtlNameType,
    pub physics_types: Vec<EnumValue>,
}

/// Count fields of an area shape chunk; the shapes themselves stay opaque
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AreaShape {
    pub area_shapes_len: u32,
    pub num_vis_areas: u32,
    pub num_portals: u32,
}

/// Decoded payload of a chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ChunkBody {
    /// No decoder for this type/version; the bytes are in [`Chunk::data`]
    Raw,
    CryXml(CryXmlElement),
    Json(serde_json::Value),
    MtlName(MtlName),
    BoneNameList(Vec<String>),
    SourceInfo(String),
    AreaShape(AreaShape),
    IncludedObjects(IncludedObjects),
    /// `#ivo` material name
    MaterialName(String),
}

/// A chunk with its raw bytes and decoded body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub header: ChunkHeader,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub body: ChunkBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionMatch {
    Exact(u32),
    Any,
}

type Decoder = fn(&[u8]) -> Result<ChunkBody>;

pub(crate) struct Handler {
    chunk_type: u32,
    version: VersionMatch,
    decode: Decoder,
}

pub(crate) static CHCR_HANDLERS: &[Handler] = &[
    Handler {
        chunk_type: ChunkType::BoneNameList as u32,
        version: VersionMatch::Any,
        decode: decode_bone_name_list,
    },
    Handler {
        chunk_type: ChunkType::SourceInfo as u32,
        version: VersionMatch::Any,
        decode: decode_source_info,
    },
    Handler {
        chunk_type: ChunkType::MtlName as u32,
        version: VersionMatch::Any,
        decode: decode_mtl_name,
    },
    Handler {
        chunk_type: ChunkType::CryXmlB as u32,
        version: VersionMatch::Any,
        decode: decode_cryxml,
    },
    Handler {
        chunk_type: ChunkType::Json as u32,
        version: VersionMatch::Any,
        decode: decode_json,
    },
    Handler {
        chunk_type: ChunkType::AreaShape as u32,
        version: VersionMatch::Any,
        decode: decode_area_shape,
    },
    Handler {
        chunk_type: ChunkType::IncludedObjects as u32,
        version: VersionMatch::Exact(1),
        decode: decode_included_objects,
    },
];

pub(crate) static IVO_HANDLERS: &[Handler] = &[Handler {
    chunk_type: CharacterChunkType::MaterialName as u32,
    version: VersionMatch::Any,
    decode: decode_ivo_material_name,
}];

/// Decode a chunk's bytes
///
/// Types outside the catalogues fail with [`Error::UnhandledChunkType`]. A known type
/// without a decoder for its version falls back to [`ChunkBody::Raw`].
pub(crate) fn decode_chunk(handlers: &[Handler], header: &ChunkHeader, data: &[u8]) -> Result<ChunkBody> {
    if !header.chunk_type.is_known() {
        return Err(Error::UnhandledChunkType {
            chunk_type: header.raw_type(),
            version: header.version,
        });
    }

    let raw_type = header.raw_type();
    let handler = handlers
        .iter()
        .find(|h| h.chunk_type == raw_type && h.version == VersionMatch::Exact(header.version))
        .or_else(|| {
            handlers
                .iter()
                .find(|h| h.chunk_type == raw_type && h.version == VersionMatch::Any)
        });

    match handler {
        Some(handler) => (handler.decode)(data),
        None => {
            log::debug!(
                "no decoder for chunk {} version {:#x}, keeping raw bytes",
                header.type_name().unwrap_or("?"),
                header.version
            );
            Ok(ChunkBody::Raw)
        }
    }
}

fn decode_bone_name_list(data: &[u8]) -> Result<ChunkBody> {
    if data.len() < 6 {
        return Ok(ChunkBody::BoneNameList(Vec::new()));
    }
    let names = String::from_utf8_lossy(&data[4..data.len() - 2])
        .split('\0')
        .map(str::to_string)
        .collect();
    Ok(ChunkBody::BoneNameList(names))
}

fn decode_source_info(data: &[u8]) -> Result<ChunkBody> {
    let text = String::from_utf8_lossy(data)
        .split('\0')
        .collect::<Vec<_>>()
        .join("\n");
    Ok(ChunkBody::SourceInfo(text))
}

fn decode_mtl_name(data: &[u8]) -> Result<ChunkBody> {
    let mut cursor = BinaryCursor::new(data);
    let record = MTL_NAME.read(&mut cursor)?;
    let num_children = record.uint("num_children")?;
    if cursor.remaining() < num_children as usize * 4 {
        return Err(Error::BadChunkFile(format!(
            "MtlName declares {} children in {} bytes",
            num_children,
            data.len()
        )));
    }

    let mut physics_types = Vec::with_capacity(num_children as usize);
    for _ in 0..num_children {
        let raw = cursor.read_u32()? as u64;
        physics_types.push(EnumValue::classify(
            raw,
            &[&MtlNamePhysicsType::DOMAIN],
            "MtlName.physics_type",
        ));
    }

    Ok(ChunkBody::MtlName(MtlName {
        name: record.string("name").unwrap_or_default().to_string(),
        mat_type: if num_children == 0 {
            MtlNameType::Single
        } else {
            MtlNameType::Library
        },
        physics_types,
    }))
}

fn decode_cryxml(data: &[u8]) -> Result<ChunkBody> {
    Ok(ChunkBody::CryXml(CryXmlReader::parse_element(data)?))
}

fn decode_json(data: &[u8]) -> Result<ChunkBody> {
    Ok(ChunkBody::Json(serde_json::from_slice(data)?))
}

fn decode_area_shape(data: &[u8]) -> Result<ChunkBody> {
    let record = AREA_SHAPE_HEADER.decode(data, 0)?;
    Ok(ChunkBody::AreaShape(AreaShape {
        area_shapes_len: record.uint("area_shapes_len")? as u32,
        num_vis_areas: record.uint("num_vis_areas")? as u32,
        num_portals: record.uint("num_portals")? as u32,
    }))
}

fn decode_included_objects(data: &[u8]) -> Result<ChunkBody> {
    Ok(ChunkBody::IncludedObjects(IncludedObjects::parse(data)?))
}

fn decode_ivo_material_name(data: &[u8]) -> Result<ChunkBody> {
    let record = IVO_MATERIAL_NAME.decode(data, 0)?;
    Ok(ChunkBody::MaterialName(
        record.string("name").unwrap_or_default().to_string(),
    ))
}
