//! Synthetic archive and chunk-file fixtures shared by the integration tests

#![allow(dead_code)]

use std::io::{Cursor, Write};

use aes::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use cryunpack::crypto::{P4K_IV, P4K_KEY};
use flate2::write::DeflateEncoder;
use flate2::Compression;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

pub const METHOD_STORE: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;
pub const METHOD_ZSTD: u16 = 100;

/// One entry of a synthetic P4K archive
pub struct TestEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub method: u16,
    pub encrypted: bool,
    /// Write sizes and offset through a Zip64 extra field
    pub zip64: bool,
}

impl TestEntry {
    pub fn new(name: &str, data: &[u8], method: u16) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            method,
            encrypted: false,
            zip64: false,
        }
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    fn payload(&self) -> Vec<u8> {
        let mut payload = match self.method {
            METHOD_DEFLATE => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&self.data).unwrap();
                encoder.finish().unwrap()
            }
            METHOD_ZSTD => zstd::encode_all(&self.data[..], 3).unwrap(),
            _ => self.data.clone(),
        };
        if self.encrypted {
            let padded = payload.len().div_ceil(16) * 16;
            payload.resize(padded, 0);
            let len = payload.len();
            Aes128CbcEnc::new(&P4K_KEY.into(), &P4K_IV.into())
                .encrypt_padded_mut::<NoPadding>(&mut payload, len)
                .unwrap();
        }
        payload
    }

    /// Extra field: the CryEngine block carrying the encryption flag at byte 168,
    /// then the optional Zip64 block
    fn extra(&self, offset: u64, compressed: u64) -> Vec<u8> {
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x5000u16.to_le_bytes());
        extra.extend_from_slice(&165u16.to_le_bytes());
        let mut block = vec![0u8; 165];
        block[164] = u8::from(self.encrypted);
        extra.extend_from_slice(&block);
        if self.zip64 {
            extra.extend_from_slice(&0x0001u16.to_le_bytes());
            extra.extend_from_slice(&24u16.to_le_bytes());
            extra.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
            extra.extend_from_slice(&compressed.to_le_bytes());
            extra.extend_from_slice(&offset.to_le_bytes());
        }
        extra
    }
}

/// Assemble a P4K image: local headers with the `PK\x03\x14` magic, a central
/// directory and an end of directory record
pub fn build_p4k(entries: &[TestEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let offset = out.len() as u64;
        let payload = entry.payload();
        let extra = entry.extra(offset, payload.len() as u64);
        let name = entry.name.as_bytes();

        out.extend_from_slice(b"PK\x03\x14");
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&entry.method.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&extra);
        out.extend_from_slice(&payload);

        let (csize, usize_, hoffset) = if entry.zip64 {
            (u32::MAX, u32::MAX, u32::MAX)
        } else {
            (payload.len() as u32, entry.data.len() as u32, offset as u32)
        };
        central.extend_from_slice(b"PK\x01\x02");
        central.extend_from_slice(&45u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&entry.method.to_le_bytes());
        central.extend_from_slice(&[0; 4]);
        // CRC is never checked
        central.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        central.extend_from_slice(&csize.to_le_bytes());
        central.extend_from_slice(&usize_.to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&hoffset.to_le_bytes());
        central.extend_from_slice(name);
        central.extend_from_slice(&extra);
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    let comment = b"synthetic";
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment);
    out
}

/// A standard ZIP archive with deflated entries, as found in `.pak` files
pub fn nested_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// `data/x.txt` stored, `data/y.pak` holding a deflated `inner.txt`, and
/// `data/z.dds` zstd compressed then encrypted
pub fn sample_archive() -> Vec<u8> {
    let pak = nested_zip(&[("inner.txt", b"world")]);
    build_p4k(&[
        TestEntry::new("data/x.txt", b"hello", METHOD_STORE),
        TestEntry::new("data/y.pak", &pak, METHOD_STORE),
        TestEntry::new("data/z.dds", &[0u8; 16], METHOD_ZSTD).encrypted(),
    ])
}

/// Little-endian CryXmlB document `<Config mode="fast"/>`
pub fn cryxml_config() -> Vec<u8> {
    let strings = b"Config\0mode\0fast\0";
    let header_len = 8 + 9 * 4;
    let node_table = header_len;
    let attr_table = node_table + 28;
    let child_table = attr_table + 8;
    let string_table = child_table;
    let total = string_table + strings.len();

    let mut out = b"CryXmlB\0".to_vec();
    for v in [
        total,
        node_table,
        1,
        attr_table,
        1,
        child_table,
        0,
        string_table,
        strings.len(),
    ] {
        out.extend_from_slice(&(v as i32).to_le_bytes());
    }
    // node: name, content, attr count, child count, parent, first attr, first child, reserved
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&(-1i32).to_le_bytes());
    out.extend_from_slice(&1i16.to_le_bytes());
    out.extend_from_slice(&0i16.to_le_bytes());
    out.extend_from_slice(&(-1i32).to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    // attribute: mode="fast"
    out.extend_from_slice(&7i32.to_le_bytes());
    out.extend_from_slice(&12i32.to_le_bytes());
    out.extend_from_slice(strings);
    out
}

/// A `CrCh` file from `(type, version, id, payload)` tuples
pub fn chcr_file(chunks: &[(u16, u16, u32, Vec<u8>)]) -> Vec<u8> {
    let table_offset = 16u32;
    let mut payload_offset = table_offset + 16 * chunks.len() as u32;
    let mut out = b"CrCh".to_vec();
    out.extend_from_slice(&0x746u32.to_le_bytes());
    out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
    out.extend_from_slice(&table_offset.to_le_bytes());
    for (chunk_type, version, id, body) in chunks {
        out.extend_from_slice(&chunk_type.to_le_bytes());
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload_offset.to_le_bytes());
        payload_offset += body.len() as u32;
    }
    for (_, _, _, body) in chunks {
        out.extend_from_slice(body);
    }
    out
}
