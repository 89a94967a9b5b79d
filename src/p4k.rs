//! P4K file format handling
//!
//! P4K files are ZIP archives with custom encryption and compression support.
//! This module provides reading and extraction capabilities.
//!
//! ## P4K Format Details
//!
//! - Compression methods: Store (0), Deflate (8), ZStd (100)
//! - Encryption: AES-128-CBC with the CryEngine public key and a zero IV
//! - Local header signature for encrypted entries: `PK\x03\x14` (vs `PK\x03\x04` for normal)
//! - A non-zero byte at offset 168 of the extra field marks encrypted content
//! - Zip64 end of directory and extra fields are used for large archives
//! - CRC32 values do not match the plaintext and are never checked
//!
//! ## Sub-archives
//!
//! Entries ending in `.pak` or `.socpak` are themselves ZIP archives. When an archive is
//! opened their directories are read too and spliced into one flat namespace, with the
//! container's extension dot replaced by an underscore:
//!
//! ```text
//! data/y.pak           (the container entry itself)
//! data/y_pak/inner.txt (an entry of data/y.pak)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use cryunpack::P4kFile;
//!
//! let p4k = P4kFile::open("Data.p4k")?;
//! for entry in p4k.search(&["*.mtl"], true)? {
//!     let bytes = p4k.read_entry(entry)?;
//!     println!("{} ({} bytes)", entry.name, bytes.len());
//! }
//! # Ok::<(), cryunpack::Error>(())
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use memmap2::Mmap;

use crate::crypto::decrypt_aes_cbc;
use crate::cryxml::CryXmlReader;
use crate::cursor::BinaryCursor;
use crate::error::{Error, Result};
use crate::utils::{create_glob_set, normalize_path};

/// Standard local file header signature: PK\x03\x04
const LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Encrypted local file header signature: PK\x03\x14 (used by CryEngine/Star Citizen)
const ENCRYPTED_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x14];

/// Central directory header signature: PK\x01\x02
const CENTRAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];

const END_OF_DIRECTORY_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const ZIP64_LOCATOR_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x07];
const ZIP64_END_OF_DIRECTORY_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x06];

/// Fixed part of a local file header, signature included
const LOCAL_HEADER_SIZE: usize = 30;

/// Largest distance of the end of directory record from the end of the file
const MAX_EOCD_SEARCH: usize = 22 + u16::MAX as usize;

/// Extra field offset of the CryEngine encryption marker
const ENCRYPTION_MARKER_OFFSET: usize = 168;

/// Extensions of entries that are mounted as sub-archives
pub const SUB_ARCHIVE_EXTENSIONS: [&str; 2] = ["pak", "socpak"];

/// Compression methods used in P4K files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (stored as-is)
    Store,
    /// Standard DEFLATE compression
    Deflate,
    /// ZStandard compression (custom to Star Citizen)
    Zstd,
    /// Unknown/unsupported method
    Unknown(u16),
}

impl From<u16> for CompressionMethod {
    fn from(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            100 => CompressionMethod::Zstd,
            other => CompressionMethod::Unknown(other),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Store => write!(f, "store"),
            CompressionMethod::Deflate => write!(f, "deflate"),
            CompressionMethod::Zstd => write!(f, "zstd"),
            CompressionMethod::Unknown(m) => write!(f, "unknown({})", m),
        }
    }
}

/// Options for [`P4kFile::open_with_options`]
#[derive(Debug, Clone)]
pub struct P4kOpenOptions {
    /// Read the directories of `.pak`/`.socpak` entries into the namespace
    pub mount_sub_archives: bool,
    /// Memory map the archive instead of reading it into memory
    pub use_mmap: bool,
}

impl Default for P4kOpenOptions {
    fn default() -> Self {
        Self {
            mount_sub_archives: true,
            use_mmap: true,
        }
    }
}

/// Output format for CryXML entries during extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryXmlFormat {
    Xml,
    Json,
}

/// Options for [`P4kFile::extract_filter`]
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Replace files that already exist at the destination
    pub overwrite: bool,
    /// Convert binary CryXML entries while writing them
    pub convert_cryxml: Option<CryXmlFormat>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            convert_cryxml: None,
        }
    }
}

/// What happened to one entry during extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Written(PathBuf),
    Skipped(PathBuf),
}

/// Totals of a batch extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Where the bytes of an entry live
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Stored directly in the archive that was opened
    Root,
    /// Stored in a mounted sub-archive; `inner` is the entry as that archive knows it
    SubArchive {
        archive: Arc<P4kFile>,
        inner: Box<P4kEntry>,
    },
}

/// Represents a single entry in a P4K archive
#[derive(Debug, Clone)]
pub struct P4kEntry {
    /// Logical path within the flattened namespace, always `/` separated
    pub name: String,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Uncompressed size in bytes
    pub uncompressed_size: u64,
    /// Compression method used
    pub compression_method: CompressionMethod,
    /// Whether the entry is encrypted
    pub is_encrypted: bool,
    /// CRC32 checksum, informational only
    pub crc32: u32,
    /// Offset to local file header in the archive holding the entry
    pub header_offset: u64,
    /// Root archive or mounted sub-archive
    pub source: EntrySource,
}

impl P4kEntry {
    /// The sub-archive this entry was mounted from, if any
    pub fn sub_archive(&self) -> Option<&Arc<P4kFile>> {
        match &self.source {
            EntrySource::Root => None,
            EntrySource::SubArchive { archive, .. } => Some(archive),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Lower-case extension without the dot
    pub fn extension(&self) -> Option<String> {
        let file_name = self.name.rsplit('/').next()?;
        let (_, ext) = file_name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }

    fn is_sub_archive(&self) -> bool {
        self.extension()
            .map(|ext| SUB_ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

enum ArchiveData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for ArchiveData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ArchiveData::Mapped(map) => &map[..],
            ArchiveData::Owned(bytes) => &bytes[..],
        }
    }
}

/// A P4K archive reader
///
/// The archive is immutable once opened; all reads take `&self` and may run
/// concurrently from several threads.
pub struct P4kFile {
    data: ArchiveData,
    entries: Vec<P4kEntry>,
    /// Lower-cased name to position in `entries`
    index: HashMap<String, usize>,
    comment: Vec<u8>,
}

impl fmt::Debug for P4kFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("P4kFile")
            .field("size", &self.data.len())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Raw location info collected from the end of central directory records
struct DirectoryLocation {
    offset: u64,
    size: u64,
    total_entries: u64,
    comment: Vec<u8>,
}

impl P4kFile {
    /// Open a P4K file for reading
    ///
    /// # Arguments
    /// * `path` - Path to the P4K file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &P4kOpenOptions::default())
    }

    /// Open a P4K file with explicit options
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &P4kOpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let data = if options.use_mmap {
            let file = File::open(path)?;
            // SAFETY: the archive is treated as read-only for the lifetime of the map
            let map = unsafe { Mmap::map(&file)? };
            ArchiveData::Mapped(map)
        } else {
            ArchiveData::Owned(fs::read(path)?)
        };
        log::debug!("Opening archive {}", path.display());
        Self::parse(data, options)
    }

    /// Open an archive held in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_options(data, &P4kOpenOptions::default())
    }

    pub fn from_bytes_with_options(data: Vec<u8>, options: &P4kOpenOptions) -> Result<Self> {
        Self::parse(ArchiveData::Owned(data), options)
    }

    fn parse(data: ArchiveData, options: &P4kOpenOptions) -> Result<Self> {
        let location = Self::read_end_of_directory(&data)?;
        let entries = Self::read_central_directory(&data, &location)?;

        let mut archive = P4kFile {
            data,
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
            comment: location.comment,
        };
        for entry in entries {
            archive.insert(entry);
        }

        if options.mount_sub_archives {
            archive.mount_sub_archives(options);
        }

        log::debug!("Archive directory holds {} entries", archive.entries.len());
        Ok(archive)
    }

    fn insert(&mut self, entry: P4kEntry) {
        let key = entry.name.to_lowercase();
        if self.index.contains_key(&key) {
            log::warn!("Duplicate archive path {}, keeping the first entry", entry.name);
            return;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
    }

    /// Open every `.pak`/`.socpak` entry and add its entries under a rewritten prefix
    fn mount_sub_archives(&mut self, options: &P4kOpenOptions) {
        let containers: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_sub_archive())
            .map(|(i, _)| i)
            .collect();

        for idx in containers {
            let container = &self.entries[idx];
            let bytes = match self.read_entry(container) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Cannot read sub-archive {}: {}", container.name, e);
                    continue;
                }
            };
            let sub = match P4kFile::from_bytes_with_options(bytes, options) {
                Ok(sub) => Arc::new(sub),
                Err(e) => {
                    log::warn!("Cannot mount sub-archive {}: {}", container.name, e);
                    continue;
                }
            };

            let prefix = sub_archive_prefix(&container.name);
            log::debug!(
                "Mounted {} ({} entries) as {}/",
                container.name,
                sub.len(),
                prefix
            );
            let mounted: Vec<P4kEntry> = sub
                .entries
                .iter()
                .map(|inner| P4kEntry {
                    name: format!("{}/{}", prefix, inner.name),
                    source: EntrySource::SubArchive {
                        archive: Arc::clone(&sub),
                        inner: Box::new(inner.clone()),
                    },
                    ..inner.clone()
                })
                .collect();
            for entry in mounted {
                self.insert(entry);
            }
        }
    }

    fn read_end_of_directory(data: &[u8]) -> Result<DirectoryLocation> {
        // EOCD is at least 22 bytes, search backwards for signature
        let search_start = data.len().saturating_sub(MAX_EOCD_SEARCH);
        let eocd_pos = data[search_start..]
            .windows(4)
            .rposition(|w| w == END_OF_DIRECTORY_SIGNATURE)
            .map(|p| search_start + p)
            .ok_or_else(|| Error::BadArchive("Cannot find End of Central Directory".to_string()))?;

        let bad = |e: Error| Error::BadArchive(format!("Truncated end of central directory: {}", e));

        let mut cursor = BinaryCursor::at(data, eocd_pos as u64 + 4).map_err(bad)?;
        let _disk_number = cursor.read_u16().map_err(bad)?;
        let _disk_cd = cursor.read_u16().map_err(bad)?;
        let _entries_on_disk = cursor.read_u16().map_err(bad)?;
        let total_entries = cursor.read_u16().map_err(bad)? as u64;
        let cd_size = cursor.read_u32().map_err(bad)? as u64;
        let cd_offset = cursor.read_u32().map_err(bad)? as u64;
        let comment_len = cursor.read_u16().map_err(bad)? as usize;
        let comment = cursor.read(comment_len).to_vec();

        let mut location = DirectoryLocation {
            offset: cd_offset,
            size: cd_size,
            total_entries,
            comment,
        };

        // Check for ZIP64 EOCD locator
        if eocd_pos >= 20 && data[eocd_pos - 20..eocd_pos - 16] == ZIP64_LOCATOR_SIGNATURE {
            let mut cursor = BinaryCursor::at(data, eocd_pos as u64 - 16).map_err(bad)?;
            let _disk_number = cursor.read_u32().map_err(bad)?;
            let zip64_eocd_offset = cursor.read_u64().map_err(bad)?;

            let mut cursor = BinaryCursor::at(data, zip64_eocd_offset).map_err(bad)?;
            if cursor.read_array::<4>().map_err(bad)? != ZIP64_END_OF_DIRECTORY_SIGNATURE {
                return Err(Error::BadArchive("Invalid ZIP64 EOCD signature".to_string()));
            }
            let _eocd_size = cursor.read_u64().map_err(bad)?;
            let _version_made = cursor.read_u16().map_err(bad)?;
            let _version_needed = cursor.read_u16().map_err(bad)?;
            let _disk_number = cursor.read_u32().map_err(bad)?;
            let _disk_cd = cursor.read_u32().map_err(bad)?;
            let _entries_on_disk = cursor.read_u64().map_err(bad)?;
            location.total_entries = cursor.read_u64().map_err(bad)?;
            location.size = cursor.read_u64().map_err(bad)?;
            location.offset = cursor.read_u64().map_err(bad)?;
        }

        Ok(location)
    }

    /// Read the central directory to build the entry list
    fn read_central_directory(data: &[u8], location: &DirectoryLocation) -> Result<Vec<P4kEntry>> {
        let end = location.offset.saturating_add(location.size);
        if end > data.len() as u64 {
            return Err(Error::BadArchive(format!(
                "Central directory ({} bytes at {}) extends past the end of the archive",
                location.size, location.offset
            )));
        }

        let mut cursor = BinaryCursor::at(data, location.offset)?;
        let mut entries = Vec::with_capacity(location.total_entries.min(1 << 20) as usize);
        for i in 0..location.total_entries {
            let entry = Self::read_central_directory_entry(&mut cursor).map_err(|e| {
                Error::BadArchive(format!("Central directory record {}: {}", i, e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn read_central_directory_entry(cursor: &mut BinaryCursor<'_>) -> Result<P4kEntry> {
        let sig = cursor.read_array::<4>()?;
        if sig != CENTRAL_HEADER_SIGNATURE {
            return Err(Error::BadArchive(format!(
                "Invalid central directory signature {:02X?}",
                sig
            )));
        }

        let _version_made = cursor.read_u16()?;
        let _version_needed = cursor.read_u16()?;
        let _flags = cursor.read_u16()?;
        let compression = cursor.read_u16()?;
        let _mod_time = cursor.read_u16()?;
        let _mod_date = cursor.read_u16()?;
        let crc32 = cursor.read_u32()?;
        let mut compressed_size = cursor.read_u32()? as u64;
        let mut uncompressed_size = cursor.read_u32()? as u64;
        let name_len = cursor.read_u16()? as usize;
        let extra_len = cursor.read_u16()? as usize;
        let comment_len = cursor.read_u16()? as usize;
        let _disk_start = cursor.read_u16()?;
        let _internal_attrs = cursor.read_u16()?;
        let _external_attrs = cursor.read_u32()?;
        let mut header_offset = cursor.read_u32()? as u64;

        let name = normalize_path(&String::from_utf8_lossy(cursor.read_exact(name_len)?));
        let extra = cursor.read_exact(extra_len)?;
        cursor.skip(comment_len)?;

        // Zip64 extended information; each value is present only when its 32-bit field overflowed
        let mut extra_cursor = BinaryCursor::new(extra);
        while extra_cursor.remaining() >= 4 {
            let header_id = extra_cursor.read_u16()?;
            let data_size = extra_cursor.read_u16()? as usize;
            let field = extra_cursor.read(data_size);

            if header_id == 0x0001 {
                let mut zip64 = BinaryCursor::new(field);
                if uncompressed_size == 0xFFFFFFFF {
                    uncompressed_size = zip64.read_u64()?;
                }
                if compressed_size == 0xFFFFFFFF {
                    compressed_size = zip64.read_u64()?;
                }
                if header_offset == 0xFFFFFFFF {
                    header_offset = zip64.read_u64()?;
                }
            }
        }

        let is_encrypted =
            extra.len() > ENCRYPTION_MARKER_OFFSET && extra[ENCRYPTION_MARKER_OFFSET] > 0;

        Ok(P4kEntry {
            name,
            compressed_size,
            uncompressed_size,
            compression_method: CompressionMethod::from(compression),
            is_encrypted,
            crc32,
            header_offset,
            source: EntrySource::Root,
        })
    }

    /// Get all entries in directory order
    pub fn entries(&self) -> &[P4kEntry] {
        &self.entries
    }

    /// Get an iterator over all entry names
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Get the number of entries, sub-archive entries included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the archive is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The archive comment from the end of central directory record
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Size of the archive in bytes
    pub fn archive_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Look up an entry by path, ignoring case and slash direction
    pub fn get_entry(&self, name: &str) -> Result<&P4kEntry> {
        let key = normalize_path(name).to_lowercase();
        self.index
            .get(&key)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Entries whose path matches any of `patterns`
    ///
    /// # Arguments
    /// * `patterns` - Globs supporting `*`, `?` and `[...]`; `*` also matches `/`
    /// * `case_insensitive` - Match regardless of case
    pub fn search<S: AsRef<str>>(
        &self,
        patterns: &[S],
        case_insensitive: bool,
    ) -> Result<Vec<&P4kEntry>> {
        let set = create_glob_set(patterns, case_insensitive)?;
        Ok(self
            .entries
            .iter()
            .filter(|e| set.is_match(&e.name))
            .collect())
    }

    /// Open a decoding stream over an entry's contents
    ///
    /// Entries of mounted sub-archives are read through their own archive.
    pub fn open_entry<'a>(&'a self, entry: &'a P4kEntry) -> Result<Box<dyn Read + Send + 'a>> {
        match &entry.source {
            EntrySource::SubArchive { archive, inner } => archive.open_entry(inner),
            EntrySource::Root => self.open_root_entry(entry),
        }
    }

    fn open_root_entry<'a>(&'a self, entry: &'a P4kEntry) -> Result<Box<dyn Read + Send + 'a>> {
        let raw = self.raw_payload(entry)?;

        let payload: Cow<'a, [u8]> = if entry.is_encrypted {
            Cow::Owned(decrypt_aes_cbc(raw)?)
        } else {
            Cow::Borrowed(raw)
        };
        let limit = entry.uncompressed_size;

        let reader: Box<dyn Read + Send + 'a> = match entry.compression_method {
            CompressionMethod::Store => Box::new(Cursor::new(payload).take(limit)),
            CompressionMethod::Deflate => {
                Box::new(DeflateDecoder::new(Cursor::new(payload)).take(limit))
            }
            CompressionMethod::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(Cursor::new(payload))
                    .map_err(|e| Error::Decompression(format!("ZSTD init error: {}", e)))?;
                Box::new(LenientReader::new(decoder, &entry.name).take(limit))
            }
            CompressionMethod::Unknown(method) => {
                return Err(Error::UnsupportedCompression(method));
            }
        };
        Ok(reader)
    }

    /// Read local file header and return the entry's stored bytes
    ///
    /// P4K files may use either standard local header signature (PK\x03\x04)
    /// or encrypted header signature (PK\x03\x14) as per CryEngine format.
    fn raw_payload<'a>(&'a self, entry: &P4kEntry) -> Result<&'a [u8]> {
        let mut cursor = BinaryCursor::at(&self.data, entry.header_offset)?;

        let sig = cursor.read_array::<4>()?;
        if sig != LOCAL_HEADER_SIGNATURE && sig != ENCRYPTED_HEADER_SIGNATURE {
            return Err(Error::BadArchive(format!(
                "Invalid local file header signature for {}: {:02X?} (expected PK\\x03\\x04 or PK\\x03\\x14)",
                entry.name, sig
            )));
        }

        cursor.skip(LOCAL_HEADER_SIZE - 8)?;
        let name_len = cursor.read_u16()? as usize;
        let extra_len = cursor.read_u16()? as usize;
        cursor.skip(name_len + extra_len)?;

        cursor.read_exact(entry.compressed_size as usize)
    }

    /// Read and decode an entry's full contents
    pub fn read_entry(&self, entry: &P4kEntry) -> Result<Vec<u8>> {
        let mut reader = self.open_entry(entry)?;
        let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 30) as usize);
        reader
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(format!("{}: {}", entry.name, e)))?;
        Ok(out)
    }

    /// Read an entry by path
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.get_entry(name)?;
        self.read_entry(entry)
    }

    /// Write an entry below `dest_dir`, mirroring its archive path
    ///
    /// Returns the path written.
    pub fn extract<P: AsRef<Path>>(&self, entry: &P4kEntry, dest_dir: P) -> Result<PathBuf> {
        match self.extract_with(entry, dest_dir.as_ref(), &ExtractOptions::default())? {
            ExtractOutcome::Written(path) | ExtractOutcome::Skipped(path) => Ok(path),
        }
    }

    /// Write an entry below `dest_dir` honouring `options`
    pub fn extract_with(
        &self,
        entry: &P4kEntry,
        dest_dir: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractOutcome> {
        let mut target = dest_dir.join(sanitize_entry_path(&entry.name));

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            return Ok(ExtractOutcome::Skipped(target));
        }

        if !options.overwrite {
            // JSON conversion renames the output, so only then is the entry sniffed
            let existing = if options.convert_cryxml == Some(CryXmlFormat::Json)
                && self.entry_is_cryxml(entry)?
            {
                with_json_suffix(&target)
            } else {
                target.clone()
            };
            if existing.exists() {
                return Ok(ExtractOutcome::Skipped(existing));
            }
        }

        let mut bytes = self.read_entry(entry)?;
        if let Some(format) = options.convert_cryxml {
            if CryXmlReader::is_cryxml(&bytes) {
                let element = CryXmlReader::parse_element(&bytes)?;
                bytes = match format {
                    CryXmlFormat::Xml => element.to_xml_string()?.into_bytes(),
                    CryXmlFormat::Json => {
                        target = with_json_suffix(&target);
                        serde_json::to_vec_pretty(&element.to_dict())?
                    }
                };
            }
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &bytes)?;
        Ok(ExtractOutcome::Written(target))
    }

    /// Whether the entry's data starts with a CryXML signature, reading only its head
    fn entry_is_cryxml(&self, entry: &P4kEntry) -> Result<bool> {
        let mut head = Vec::with_capacity(8);
        self.open_entry(entry)?.take(8).read_to_end(&mut head)?;
        Ok(CryXmlReader::is_cryxml(&head))
    }

    /// Extract every entry matching `patterns` into `dest_dir`
    ///
    /// A failing entry is logged and counted; the rest of the batch continues.
    pub fn extract_filter<S: AsRef<str>, P: AsRef<Path>>(
        &self,
        patterns: &[S],
        dest_dir: P,
        options: &ExtractOptions,
    ) -> Result<ExtractSummary> {
        let dest_dir = dest_dir.as_ref();
        let mut summary = ExtractSummary::default();

        for entry in self.search(patterns, true)? {
            match self.extract_with(entry, dest_dir, options) {
                Ok(ExtractOutcome::Written(path)) => {
                    log::debug!("Extracted {} -> {}", entry.name, path.display());
                    summary.extracted += 1;
                }
                Ok(ExtractOutcome::Skipped(_)) => summary.skipped += 1,
                Err(e) => {
                    log::warn!("Failed to extract {}: {}", entry.name, e);
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Extracted {} entries ({} skipped, {} failed)",
            summary.extracted,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }
}

fn with_json_suffix(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// `data/y.pak` -> `data/y_pak`
fn sub_archive_prefix(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) if !name[dot..].contains('/') => {
            format!("{}_{}", &name[..dot], &name[dot + 1..])
        }
        _ => name.to_string(),
    }
}

/// Relative filesystem path for an archive path, dropping root and parent components
fn sanitize_entry_path(name: &str) -> PathBuf {
    Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Treats a decoder error as the end of the stream
///
/// The last zstd block of a P4K entry is sometimes followed by padding or cut short.
struct LenientReader<R> {
    inner: R,
    name: String,
    finished: bool,
}

impl<R: Read> LenientReader<R> {
    fn new(inner: R, name: &str) -> Self {
        Self {
            inner,
            name: name.to_string(),
            finished: false,
        }
    }
}

impl<R: Read> Read for LenientReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                log::debug!("{}: zstd stream ended early ({}), treating as end of data", self.name, e);
                self.finished = true;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_method_from() {
        assert_eq!(CompressionMethod::from(0), CompressionMethod::Store);
        assert_eq!(CompressionMethod::from(8), CompressionMethod::Deflate);
        assert_eq!(CompressionMethod::from(100), CompressionMethod::Zstd);
        assert_eq!(CompressionMethod::from(99), CompressionMethod::Unknown(99));
    }

    #[test]
    fn test_sub_archive_prefix() {
        assert_eq!(sub_archive_prefix("data/y.pak"), "data/y_pak");
        assert_eq!(
            sub_archive_prefix("Data/ObjectContainers/100i_interior.socpak"),
            "Data/ObjectContainers/100i_interior_socpak"
        );
        assert_eq!(sub_archive_prefix("a.b/noext"), "a.b/noext");
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(
            sanitize_entry_path("/data/../x.txt"),
            PathBuf::from("data").join("x.txt")
        );
    }

    #[test]
    fn test_lenient_reader_stops_on_error() {
        struct Failing(bool);
        impl Read for Failing {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "bad frame"));
                }
                self.0 = true;
                buf[..3].copy_from_slice(b"abc");
                Ok(3)
            }
        }

        let mut out = Vec::new();
        LenientReader::new(Failing(false), "x")
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_missing_directory_is_bad_archive() {
        assert!(matches!(
            P4kFile::from_bytes(b"not an archive".to_vec()),
            Err(Error::BadArchive(_))
        ));
    }

    #[test]
    fn test_entry_extension() {
        let entry = P4kEntry {
            name: "Data/Foo.SOCPAK".to_string(),
            compressed_size: 0,
            uncompressed_size: 0,
            compression_method: CompressionMethod::Store,
            is_encrypted: false,
            crc32: 0,
            header_offset: 0,
            source: EntrySource::Root,
        };
        assert_eq!(entry.extension().as_deref(), Some("socpak"));
        assert!(entry.is_sub_archive());
    }
}
