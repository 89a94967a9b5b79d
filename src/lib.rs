//! # cryunpack
//!
//! A Rust library for reading the data files of CryEngine games such as Star Citizen.
//!
//! ## Overview
//!
//! - `.p4k` archives: ZIP directories with a custom local header magic, ZSTD
//!   compression and AES-128-CBC encryption. Nested `.pak`/`.socpak` archives are
//!   mounted into one flat, case-insensitive namespace.
//! - DataForge (`.dcb`) databases: typed records with pointers, references and
//!   value pools, dumped as JSON or XML.
//! - Chunk files (`CrCh` and `#ivo`): geometry, skin and object-container files
//!   made of typed chunks.
//! - CryXML: the binary XML format embedded in archives and chunks.
//!
//! The lower layers are public too: [`cursor::BinaryCursor`] for bounds-checked
//! little-endian reads and [`structs::StructLayout`] for declarative record
//! layouts with enum classification.
//!
//! ## Example - Reading an archive
//!
//! ```rust,no_run
//! use cryunpack::P4kFile;
//!
//! fn main() -> cryunpack::Result<()> {
//!     let p4k = P4kFile::open("Data.p4k")?;
//!
//!     // List all entries
//!     for entry in p4k.entries() {
//!         println!("{}", entry.name);
//!     }
//!
//!     // Read a specific file
//!     let data = p4k.read("Data/Libs/Foundry/Records/game.dcb")?;
//!     println!("{} bytes", data.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Example - Decoding what is inside
//!
//! ```rust,no_run
//! use cryunpack::{ChunkFile, CryXmlReader, DataForge, P4kFile};
//!
//! fn main() -> cryunpack::Result<()> {
//!     let p4k = P4kFile::open("Data.p4k")?;
//!
//!     let dcb = DataForge::parse(&p4k.read("Data/Game.dcb")?)?;
//!     println!("{} records", dcb.record_count());
//!
//!     let cgf = ChunkFile::open(&p4k.read("Data/Objects/crate.cgf")?)?;
//!     println!("{} chunks", cgf.chunks.len());
//!
//!     let xml = CryXmlReader::parse(&p4k.read("Data/Libs/config.xml")?)?;
//!     println!("{}", xml);
//!     Ok(())
//! }
//! ```

pub mod chunkfile;
pub mod crypto;
pub mod cryxml;
pub mod cursor;
pub mod dataforge;
pub mod error;
pub mod p4k;
pub mod structs;
pub mod utils;

pub use chunkfile::{Chunk, ChunkBody, ChunkFile};
pub use cryxml::{CryXmlElement, CryXmlReader};
pub use dataforge::{DataForge, DumpOptions, Guid};
pub use error::{Error, Result};
pub use p4k::{
    CompressionMethod, CryXmlFormat, EntrySource, ExtractOptions, ExtractSummary, P4kEntry,
    P4kFile, P4kOpenOptions,
};
pub use utils::format_size;
