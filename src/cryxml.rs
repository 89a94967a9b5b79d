//! CryXML binary format parser
//!
//! CryXML is a binary XML format used by CryEngine-based games like Star Citizen.
//! It shows up as stand-alone archive entries and embedded in chunk payloads.
//!
//! ## Format Overview
//!
//! CryXML data starts with a signature (`CryXmlB\0` or `CRY3SDK` plus two bytes)
//! followed by nine 32-bit fields:
//!
//! | field               | meaning                                  |
//! |---------------------|------------------------------------------|
//! | xml_size            | total size, used to detect byte order    |
//! | node table          | offset + count of 28-byte node records   |
//! | attribute table     | offset + count of (name, value) offsets  |
//! | child table         | offset + count of node indices           |
//! | string table        | offset + size of NUL-terminated strings  |
//!
//! Each node names its first attribute and first child-table slot; the tree is rebuilt
//! from those ranges. All string offsets are relative to the string table.
//!
//! The format supports both big-endian and little-endian byte ordering.

use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::SeekFrom;

use crate::cursor::{cstring_at, BinaryCursor, Endian};
use crate::error::{Error, Result};

const CRYXMLB_SIGNATURE: &[u8] = b"CryXmlB\0";
const CRY3SDK_SIGNATURE: &[u8] = b"CRY3SDK";
const NODE_SIZE: usize = 28;

/// A CryXML node record
#[derive(Debug, Clone)]
struct CryXmlNode {
    name_offset: i32,
    content_offset: i32,
    attribute_count: i16,
    child_count: i16,
    #[allow(dead_code)]
    parent_index: i32,
    first_attribute_index: i32,
    first_child_index: i32,
}

/// A CryXML attribute record
#[derive(Debug, Clone, Copy)]
struct CryXmlAttribute {
    name_offset: i32,
    value_offset: i32,
}

/// A decoded CryXML element
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CryXmlElement {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    pub content: String,
    pub children: Vec<CryXmlElement>,
}

impl CryXmlElement {
    /// First direct child with the given tag
    pub fn child(&self, tag: &str) -> Option<&CryXmlElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Convert to the `{"Tag": {"@attr": .., "#text": .., "Child": ..}}` dict form
    ///
    /// Repeated child tags collapse into a list.
    pub fn to_dict(&self) -> Value {
        let mut root = Map::new();
        root.insert(self.tag.clone(), self.body_to_value());
        Value::Object(root)
    }

    fn body_to_value(&self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return if self.content.is_empty() {
                Value::Null
            } else {
                Value::String(self.content.clone())
            };
        }

        let mut map = Map::new();
        for (name, value) in &self.attributes {
            map.insert(format!("@{}", name), Value::String(value.clone()));
        }
        if !self.content.is_empty() {
            map.insert("#text".to_string(), Value::String(self.content.clone()));
        }
        for child in &self.children {
            let value = child.body_to_value();
            match map.get_mut(&child.tag) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(child.tag.clone(), value);
                }
            }
        }
        Value::Object(map)
    }

    /// Serialize as indented XML text with a declaration
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| Error::Xml(e.to_string()))?;
        self.write_xml(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Xml(e.to_string()))
    }

    fn write_xml(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let name = CryXmlReader::escape_xml_name(&self.tag);
        let mut start = BytesStart::new(name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((CryXmlReader::escape_xml_name(key).as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.content.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| Error::Xml(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| Error::Xml(e.to_string()))?;
        if !self.content.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.content)))
                .map_err(|e| Error::Xml(e.to_string()))?;
        }
        for child in &self.children {
            child.write_xml(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(name.as_str())))
            .map_err(|e| Error::Xml(e.to_string()))
    }
}

/// CryXML reader for parsing binary CryXML data
pub struct CryXmlReader;

impl CryXmlReader {
    /// Check if data is a CryXML file
    pub fn is_cryxml(data: &[u8]) -> bool {
        data.starts_with(&CRYXMLB_SIGNATURE[..7]) || data.starts_with(CRY3SDK_SIGNATURE)
    }

    /// Check if data is already plain XML
    pub fn is_plain_xml(data: &[u8]) -> bool {
        data.starts_with(b"<?xml") || data.starts_with(b"<")
    }

    /// Parse CryXML binary data and convert to an XML string
    ///
    /// Plain XML input is returned unchanged.
    pub fn parse(data: &[u8]) -> Result<String> {
        if Self::is_plain_xml(data) {
            return Ok(String::from_utf8_lossy(data).into_owned());
        }
        Self::parse_element(data)?.to_xml_string()
    }

    /// Parse CryXML binary data into an element tree
    pub fn parse_element(data: &[u8]) -> Result<CryXmlElement> {
        if data.is_empty() {
            return Err(Error::InvalidCryXml("Empty data".to_string()));
        }

        let header_len = if data.starts_with(CRYXMLB_SIGNATURE) {
            CRYXMLB_SIGNATURE.len()
        } else if data.starts_with(CRY3SDK_SIGNATURE) {
            CRY3SDK_SIGNATURE.len() + 2
        } else {
            return Err(Error::InvalidCryXml(format!(
                "Unknown header: {:?}",
                String::from_utf8_lossy(&data[..data.len().min(8)])
            )));
        };

        let truncated = |e: Error| Error::InvalidCryXml(format!("Truncated header: {}", e));
        let mut cursor = BinaryCursor::at(data, header_len as u64).map_err(truncated)?;
        let endian = Self::detect_byte_order(&cursor);

        let _xml_size = cursor.read_i32_with(endian).map_err(truncated)?;
        let node_table_offset = cursor.read_i32_with(endian).map_err(truncated)?;
        let node_count = cursor.read_i32_with(endian).map_err(truncated)?;
        let attribute_table_offset = cursor.read_i32_with(endian).map_err(truncated)?;
        let attribute_count = cursor.read_i32_with(endian).map_err(truncated)?;
        let child_table_offset = cursor.read_i32_with(endian).map_err(truncated)?;
        let child_count = cursor.read_i32_with(endian).map_err(truncated)?;
        let string_table_offset = cursor.read_i32_with(endian).map_err(truncated)?;
        let _string_table_size = cursor.read_i32_with(endian).map_err(truncated)?;

        if node_count <= 0 {
            return Err(Error::InvalidCryXml("No nodes".to_string()));
        }

        let table = |e: Error| Error::InvalidCryXml(format!("Truncated table: {}", e));

        cursor
            .seek(SeekFrom::Start(node_table_offset as u64))
            .map_err(table)?;
        Self::check_table_fits(&cursor, "node", node_count, NODE_SIZE)?;
        let mut nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let start = cursor.tell();
            nodes.push(CryXmlNode {
                name_offset: cursor.read_i32_with(endian).map_err(table)?,
                content_offset: cursor.read_i32_with(endian).map_err(table)?,
                attribute_count: cursor.read_i16_with(endian).map_err(table)?,
                child_count: cursor.read_i16_with(endian).map_err(table)?,
                parent_index: cursor.read_i32_with(endian).map_err(table)?,
                first_attribute_index: cursor.read_i32_with(endian).map_err(table)?,
                first_child_index: cursor.read_i32_with(endian).map_err(table)?,
            });
            // reserved
            cursor
                .seek(SeekFrom::Start(start + NODE_SIZE as u64))
                .map_err(table)?;
        }

        cursor
            .seek(SeekFrom::Start(attribute_table_offset as u64))
            .map_err(table)?;
        Self::check_table_fits(&cursor, "attribute", attribute_count, 8)?;
        let mut attributes = Vec::with_capacity(attribute_count.max(0) as usize);
        for _ in 0..attribute_count {
            attributes.push(CryXmlAttribute {
                name_offset: cursor.read_i32_with(endian).map_err(table)?,
                value_offset: cursor.read_i32_with(endian).map_err(table)?,
            });
        }

        cursor
            .seek(SeekFrom::Start(child_table_offset as u64))
            .map_err(table)?;
        Self::check_table_fits(&cursor, "child", child_count, 4)?;
        let mut child_indices = Vec::with_capacity(child_count.max(0) as usize);
        for _ in 0..child_count {
            child_indices.push(cursor.read_i32_with(endian).map_err(table)?);
        }

        let tables = Tables {
            data,
            string_table_offset: string_table_offset.max(0) as usize,
            nodes: &nodes,
            attributes: &attributes,
            child_indices: &child_indices,
        };
        let mut visited = HashSet::new();
        tables.build(0, &mut visited)
    }

    /// Reject a table whose declared count cannot fit in the bytes after its offset
    fn check_table_fits(
        cursor: &BinaryCursor<'_>,
        what: &str,
        count: i32,
        record_size: usize,
    ) -> Result<()> {
        let needed = count.max(0) as u64 * record_size as u64;
        if needed > cursor.remaining() as u64 {
            return Err(Error::InvalidCryXml(format!(
                "{} table of {} entries needs {} bytes but only {} remain",
                what,
                count,
                needed,
                cursor.remaining()
            )));
        }
        Ok(())
    }

    /// Decide byte order by checking which reading of the size field matches the data
    fn detect_byte_order(cursor: &BinaryCursor<'_>) -> Endian {
        let bytes = cursor.peek(4);
        if bytes.len() < 4 {
            return Endian::Little;
        }
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let data_len = cursor.len() as i64;
        if i32::from_le_bytes(raw) as i64 == data_len {
            Endian::Little
        } else if i32::from_be_bytes(raw) as i64 == data_len {
            Endian::Big
        } else {
            log::debug!("CryXML size field matches neither byte order, assuming little endian");
            Endian::Little
        }
    }

    /// Make a string usable as an XML element or attribute name
    pub fn escape_xml_name(s: &str) -> String {
        // XML element/attribute names can't start with numbers
        let mut result = String::with_capacity(s.len());
        for (i, c) in s.chars().enumerate() {
            if i == 0 && c.is_ascii_digit() {
                result.push('_');
            }
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':' {
                result.push(c);
            } else {
                result.push('_');
            }
        }
        if result.is_empty() {
            result.push_str("_unnamed");
        }
        result
    }
}

struct Tables<'a> {
    data: &'a [u8],
    string_table_offset: usize,
    nodes: &'a [CryXmlNode],
    attributes: &'a [CryXmlAttribute],
    child_indices: &'a [i32],
}

impl Tables<'_> {
    fn string(&self, offset: i32) -> String {
        if offset < 0 {
            return String::new();
        }
        cstring_at(self.data, self.string_table_offset + offset as usize)
    }

    fn build(&self, index: usize, visited: &mut HashSet<usize>) -> Result<CryXmlElement> {
        if !visited.insert(index) {
            return Err(Error::InvalidCryXml(format!("Node {} appears twice in the tree", index)));
        }
        let node = self
            .nodes
            .get(index)
            .ok_or_else(|| Error::InvalidCryXml(format!("Node index {} out of range", index)))?;

        let mut element = CryXmlElement {
            tag: self.string(node.name_offset),
            content: self.string(node.content_offset),
            ..Default::default()
        };

        let first_attr = node.first_attribute_index.max(0) as usize;
        for i in 0..node.attribute_count.max(0) as usize {
            let attr = self.attributes.get(first_attr + i).ok_or_else(|| {
                Error::InvalidCryXml(format!("Attribute index {} out of range", first_attr + i))
            })?;
            element
                .attributes
                .insert(self.string(attr.name_offset), self.string(attr.value_offset));
        }

        let first_child = node.first_child_index.max(0) as usize;
        for i in 0..node.child_count.max(0) as usize {
            let child = *self.child_indices.get(first_child + i).ok_or_else(|| {
                Error::InvalidCryXml(format!("Child index {} out of range", first_child + i))
            })?;
            element.children.push(self.build(child.max(0) as usize, visited)?);
        }

        Ok(element)
    }
}
