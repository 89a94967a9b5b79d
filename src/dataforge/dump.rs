//! Record export to JSON and XML
//!
//! A dump walks a record's instance and follows strong pointers, class arrays and
//! (optionally) references. Each (structure, instance) pair is emitted at most once
//! per dump; later occurrences and anything past `max_depth` become a `__ref` marker,
//! which keeps cyclic data finite. Weak pointers are always emitted as markers.

use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;

use crate::cryxml::CryXmlElement;
use crate::dataforge::reader::{DataForge, Record};
use crate::dataforge::types::*;
use crate::error::Result;

/// Knobs for record export
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Inline the records named by references instead of printing their GUID
    pub follow_references: bool,
    /// Pointer/reference nesting depth after which markers are emitted
    pub max_depth: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            follow_references: true,
            max_depth: 64,
        }
    }
}

struct Dumper<'a> {
    df: &'a DataForge,
    options: &'a DumpOptions,
    visited: HashSet<(u32, u32)>,
    depth: usize,
}

impl<'a> Dumper<'a> {
    fn record(&mut self, record: &Record) -> Result<JsonValue> {
        self.visited
            .insert((record.structure_index, record.instance_index));
        let instance = self.df.record_instance(record)?;

        let mut map = Map::new();
        map.insert("__type".into(), instance.type_name.clone().into());
        map.insert("__ref".into(), record.guid.to_string().into());
        if !record.file_name.is_empty() {
            map.insert("__path".into(), record.file_name.clone().into());
        }
        self.properties(&instance.properties, &mut map)?;
        Ok(JsonValue::Object(map))
    }

    fn properties(
        &mut self,
        properties: &indexmap::IndexMap<String, Value>,
        map: &mut Map<String, JsonValue>,
    ) -> Result<()> {
        for (name, value) in properties {
            let converted = self.value(value)?;
            map.insert(name.clone(), converted);
        }
        Ok(())
    }

    fn value(&mut self, value: &Value) -> Result<JsonValue> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Bool(v) => json!(v),
            Value::Int8(v) => json!(v),
            Value::Int16(v) => json!(v),
            Value::Int32(v) => json!(v),
            Value::Int64(v) => json!(v),
            Value::UInt8(v) => json!(v),
            Value::UInt16(v) => json!(v),
            Value::UInt32(v) => json!(v),
            Value::UInt64(v) => json!(v),
            // non-finite floats have no JSON form
            Value::Single(v) => json!(v),
            Value::Double(v) => json!(v),
            Value::String(s) | Value::Locale(s) => json!(s),
            Value::Guid(g) => json!(g.to_string()),
            Value::Enum(EnumChoice::Known(name)) => json!(name),
            Value::Enum(EnumChoice::Unrecognized { raw, text }) => {
                if text.is_empty() {
                    json!(raw)
                } else {
                    json!(text)
                }
            }
            Value::Class(inline) => {
                let mut map = Map::new();
                map.insert(
                    "__type".into(),
                    self.df.struct_name(inline.structure_index)?.into(),
                );
                self.properties(&inline.properties, &mut map)?;
                JsonValue::Object(map)
            }
            Value::Pointer(pointer) => self.pointer(pointer)?,
            Value::Reference(reference) => self.reference(reference)?,
            Value::Array(range) => {
                let items = self.df.array_values(range)?;
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(self.value(item)?);
                }
                JsonValue::Array(out)
            }
        })
    }

    fn pointer(&mut self, pointer: &Pointer) -> Result<JsonValue> {
        if pointer.is_null() {
            return Ok(JsonValue::Null);
        }
        let marker = json!({
            "__ref": format!(
                "{}[{}]",
                self.df.struct_name(pointer.structure_index)?,
                pointer.instance_index
            )
        });
        let key = (pointer.structure_index, pointer.instance_index);
        if pointer.kind == PointerKind::Weak || self.visited.contains(&key) {
            return Ok(marker);
        }
        if self.depth >= self.options.max_depth {
            log::debug!("depth limit reached at {}", marker["__ref"]);
            return Ok(marker);
        }

        self.visited.insert(key);
        let Some(instance) = self.df.resolve_pointer(pointer)? else {
            return Ok(JsonValue::Null);
        };
        let mut map = Map::new();
        map.insert("__type".into(), instance.type_name.clone().into());
        self.depth += 1;
        self.properties(&instance.properties, &mut map)?;
        self.depth -= 1;
        Ok(JsonValue::Object(map))
    }

    fn reference(&mut self, reference: &Reference) -> Result<JsonValue> {
        let guid = reference.guid.to_string();
        if !self.options.follow_references {
            return Ok(json!(guid));
        }
        let Some((record, instance)) = self.df.resolve_reference(reference)? else {
            return Ok(json!(guid));
        };
        let key = (record.structure_index, record.instance_index);
        if self.visited.contains(&key) || self.depth >= self.options.max_depth {
            return Ok(json!({ "__ref": guid }));
        }

        self.visited.insert(key);
        let mut map = Map::new();
        map.insert("__type".into(), instance.type_name.clone().into());
        map.insert("__ref".into(), guid.into());
        if !record.file_name.is_empty() {
            map.insert("__path".into(), record.file_name.clone().into());
        }
        self.depth += 1;
        self.properties(&instance.properties, &mut map)?;
        self.depth -= 1;
        Ok(JsonValue::Object(map))
    }
}

/// Render a scalar as attribute/text content
fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map a dumped record onto an element tree: scalars become attributes,
/// objects and arrays become child elements
fn json_to_element(tag: &str, value: &JsonValue) -> CryXmlElement {
    let mut element = CryXmlElement {
        tag: tag.to_string(),
        ..Default::default()
    };
    match value {
        JsonValue::Object(map) => {
            for (key, member) in map {
                match member {
                    JsonValue::Object(_) => element.children.push(json_to_element(key, member)),
                    JsonValue::Array(items) => {
                        let mut list = CryXmlElement {
                            tag: key.clone(),
                            ..Default::default()
                        };
                        for item in items {
                            let item_tag = item
                                .get("__type")
                                .and_then(JsonValue::as_str)
                                .unwrap_or("Item");
                            list.children.push(json_to_element(item_tag, item));
                        }
                        element.children.push(list);
                    }
                    scalar => {
                        element.attributes.insert(key.clone(), scalar_text(scalar));
                    }
                }
            }
        }
        JsonValue::Array(_) => {}
        scalar => element.content = scalar_text(scalar),
    }
    element
}

impl DataForge {
    /// Convert a record, and whatever it points at, to a JSON value
    pub fn record_to_value(&self, record: &Record, options: &DumpOptions) -> Result<JsonValue> {
        let mut dumper = Dumper {
            df: self,
            options,
            visited: HashSet::new(),
            depth: 0,
        };
        dumper.record(record)
    }

    /// Pretty-printed JSON for a record
    pub fn dump_record_json(&self, record: &Record, options: &DumpOptions) -> Result<String> {
        let value = self.record_to_value(record, options)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Indented XML for a record; the root element is named after the record
    pub fn dump_record_xml(&self, record: &Record, options: &DumpOptions) -> Result<String> {
        let value = self.record_to_value(record, options)?;
        let tag = if record.name.is_empty() {
            record.type_name.as_str()
        } else {
            record.name.as_str()
        };
        json_to_element(tag, &value).to_xml_string()
    }
}
