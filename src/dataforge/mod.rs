//! DataForge/DCB binary format parser
//!
//! DataForge is the binary format used by Star Citizen to store game data configuration.
//! Files with `.dcb` extension contain structured data that can be exported as JSON or XML.
//!
//! ## Format Overview
//!
//! A DataForge file consists of:
//! - File header with version and counts
//! - Definition tables (structs, properties, enums, data mappings, records)
//! - Value pools (integers, floats, strings, GUIDs, pointers, etc.)
//! - String tables (text and blob data)
//! - The data section holding every struct instance
//!
//! ## Example
//!
//! ```rust,no_run
//! use cryunpack::dataforge::{DataForge, DumpOptions};
//!
//! let data = std::fs::read("Game.dcb")?;
//! let df = DataForge::parse(&data)?;
//!
//! for record in df.search_filename(&["*ships*"])? {
//!     println!("{}", df.dump_record_json(record, &DumpOptions::default())?);
//! }
//! # Ok::<(), cryunpack::Error>(())
//! ```

mod definitions;
mod dump;
mod header;
mod instance;
mod reader;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use definitions::{
    DataMapping, EnumDefinition, PropertyDefinition, RecordDefinition, StructDefinition,
};
pub use dump::DumpOptions;
pub use header::{DataForgeHeader, ValueCounts};
pub use reader::{DataForge, Record};
pub use types::*;
