//! CryEngine chunk files (`CrCh` and `#ivo`)
//!
//! Geometry, skin, animation and object-container files share one outer shape: a
//! 16-byte file header, a table of chunk headers, and the chunk payloads the table
//! points at. The two families differ in their chunk-header layout:
//!
//! - `CrCh` headers carry type, version, id, size and offset (16-bit type/version).
//! - `#ivo` headers carry a 32-bit type, a version and a 64-bit offset. Sizes are
//!   taken from the distance to the next chunk.
//!
//! The table is read in full before any payload is decoded, so one bad chunk never
//! hides the ones after it; failures are collected in [`ChunkFile::failures`].
//!
//! ```rust,no_run
//! use cryunpack::chunkfile::{ChunkBody, ChunkFile};
//!
//! let data = std::fs::read("hull.cgf")?;
//! let file = ChunkFile::open(&data)?;
//! for chunk in &file.chunks {
//!     if let ChunkBody::MtlName(mtl) = &chunk.body {
//!         println!("material {}", mtl.name);
//!     }
//! }
//! # Ok::<(), cryunpack::Error>(())
//! ```

mod chunks;
pub mod defs;
mod included_objects;

use serde::Serialize;

use crate::cursor::BinaryCursor;
use crate::error::{Error, Result};
use crate::structs::{EnumValue, StructLayout};

pub use chunks::{AreaShape, Chunk, ChunkBody, ChunkHeader, MtlName};
pub use defs::{ChunkType, MtlNamePhysicsType, MtlNameType};
pub use included_objects::{IncludedObject, IncludedObjects, ObjectPlacement, SkippedRegion};

/// Which chunk-file family a buffer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkFileFormat {
    ChCr,
    Ivo,
}

impl ChunkFileFormat {
    pub fn detect(data: &[u8]) -> Option<Self> {
        match data.get(..4) {
            Some(sig) if sig == defs::CHCR_SIGNATURE => Some(ChunkFileFormat::ChCr),
            Some(sig) if sig == defs::IVO_SIGNATURE => Some(ChunkFileFormat::Ivo),
            _ => None,
        }
    }

    fn layouts(&self) -> (&'static StructLayout, &'static StructLayout) {
        match self {
            ChunkFileFormat::ChCr => (&defs::CHCR_FILE_HEADER, &defs::CHCR_CHUNK_HEADER),
            ChunkFileFormat::Ivo => (&defs::IVO_FILE_HEADER, &defs::IVO_CHUNK_HEADER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeader {
    pub format: ChunkFileFormat,
    pub version: EnumValue,
    pub num_chunks: u32,
    pub chunk_table_offset: u32,
}

/// A chunk whose payload could not be decoded
#[derive(Debug)]
pub struct ChunkFailure {
    pub header: ChunkHeader,
    pub error: Error,
}

/// A parsed chunk file
#[derive(Debug, Serialize)]
pub struct ChunkFile {
    pub header: FileHeader,
    /// Successfully decoded chunks in table order
    pub chunks: Vec<Chunk>,
    #[serde(skip)]
    pub failures: Vec<ChunkFailure>,
}

impl ChunkFile {
    pub fn is_chunk_file(data: &[u8]) -> bool {
        ChunkFileFormat::detect(data).is_some()
    }

    /// Parse the header and chunk table, then decode every chunk
    pub fn open(data: &[u8]) -> Result<Self> {
        let format = ChunkFileFormat::detect(data).ok_or_else(|| {
            Error::BadChunkFile(format!(
                "unknown signature {:02x?}",
                &data[..data.len().min(4)]
            ))
        })?;
        let (file_layout, chunk_layout) = format.layouts();

        let file_header = file_layout
            .decode(data, 0)
            .map_err(|_| Error::BadChunkFile("truncated file header".into()))?;
        let header = FileHeader {
            format,
            version: file_header
                .enum_value("version")
                .cloned()
                .unwrap_or(EnumValue::Unrecognized(0)),
            num_chunks: file_header.uint("num_chunks")? as u32,
            chunk_table_offset: file_header.uint("chunk_table_offset")? as u32,
        };

        let mut cursor = BinaryCursor::at(data, header.chunk_table_offset as u64)
            .map_err(|_| Error::BadChunkFile("chunk table offset past end of file".into()))?;
        let table_len = header.num_chunks as u64 * chunk_layout.size() as u64;
        if table_len > cursor.remaining() as u64 {
            return Err(Error::BadChunkFile(format!(
                "chunk table of {} entries needs {} bytes but only {} remain",
                header.num_chunks,
                table_len,
                cursor.remaining()
            )));
        }
        let mut headers = Vec::with_capacity(header.num_chunks as usize);
        for i in 0..header.num_chunks {
            let record = chunk_layout.read(&mut cursor).map_err(|_| {
                Error::BadChunkFile(format!(
                    "chunk table truncated at entry {} of {}",
                    i, header.num_chunks
                ))
            })?;
            headers.push(match format {
                ChunkFileFormat::ChCr => ChunkHeader::from_chcr(&record)?,
                ChunkFileFormat::Ivo => ChunkHeader::from_ivo(&record)?,
            });
        }
        if format == ChunkFileFormat::Ivo {
            assign_ivo_sizes(&mut headers, data.len() as u64);
        }

        let handlers = match format {
            ChunkFileFormat::ChCr => chunks::CHCR_HANDLERS,
            ChunkFileFormat::Ivo => chunks::IVO_HANDLERS,
        };

        let mut chunks = Vec::with_capacity(headers.len());
        let mut failures = Vec::new();
        for chunk_header in headers {
            match decode_one(handlers, &chunk_header, data) {
                Ok(chunk) => chunks.push(chunk),
                Err(error) => {
                    log::warn!(
                        "chunk {:#x} at {:#x}: {}",
                        chunk_header.raw_type(),
                        chunk_header.offset,
                        error
                    );
                    failures.push(ChunkFailure {
                        header: chunk_header,
                        error,
                    });
                }
            }
        }

        Ok(ChunkFile {
            header,
            chunks,
            failures,
        })
    }

    /// Look a `CrCh` chunk up by its id
    pub fn chunk_by_id(&self, id: u32) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.header.id == Some(id))
    }

    /// Chunks whose type has the given catalogue name, e.g. `"MtlName"`
    pub fn chunks_named<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Chunk> + 'a {
        self.chunks
            .iter()
            .filter(move |c| c.header.type_name() == Some(type_name))
    }

    /// The decoded chunk table as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn decode_one(handlers: &[chunks::Handler], header: &ChunkHeader, data: &[u8]) -> Result<Chunk> {
    let end = header.offset.saturating_add(header.size);
    if end > data.len() as u64 {
        return Err(Error::OutOfRange {
            offset: header.offset,
            len: header.size,
        });
    }
    let bytes = &data[header.offset as usize..end as usize];
    let body = chunks::decode_chunk(handlers, header, bytes)?;
    Ok(Chunk {
        header: header.clone(),
        data: bytes.to_vec(),
        body,
    })
}

/// Each `#ivo` chunk runs up to the next chunk offset or the end of the file
fn assign_ivo_sizes(headers: &mut [ChunkHeader], file_len: u64) {
    let mut offsets: Vec<u64> = headers.iter().map(|h| h.offset).collect();
    offsets.sort_unstable();
    offsets.dedup();
    for header in headers.iter_mut() {
        let next = offsets
            .iter()
            .copied()
            .find(|&o| o > header.offset)
            .unwrap_or(file_len);
        header.size = next.saturating_sub(header.offset);
    }
}
