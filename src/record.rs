//! The decoded output model, and the extraction of its fields from an
//! assembled element tree.

use jiff::Timestamp;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::binxml::assemble::{XmlElement, XmlNode};
use crate::binxml::value::BinXmlValue;

/// One decoded event.
///
/// Fields that the record did not resolve carry their documented defaults:
/// event id `0`, level `4` (informational), empty strings for the name
/// fields, absent optionals. `record_id` is unique in a well formed file,
/// but corrupted input can repeat it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub record_id: u64,
    pub event_id: u32,
    pub version: u8,
    pub level: u8,
    pub task: u16,
    pub opcode: u8,
    pub keywords: u64,
    pub timestamp: Timestamp,
    pub provider: String,
    pub channel: String,
    pub computer: String,
    pub process_id: Option<u32>,
    pub thread_id: Option<u32>,
    pub user_sid: Option<String>,
    pub activity_id: Option<String>,
    pub related_activity_id: Option<String>,
    pub event_data: Map<String, Value>,
    pub user_data: Map<String, Value>,
    pub xml: String,
    pub message: Option<String>,
}

impl EventRecord {
    pub(crate) fn new(record_id: u64, timestamp: Timestamp) -> Self {
        EventRecord {
            record_id,
            event_id: 0,
            version: 0,
            level: 4,
            task: 0,
            opcode: 0,
            keywords: 0,
            timestamp,
            provider: String::new(),
            channel: String::new(),
            computer: String::new(),
            process_id: None,
            thread_id: None,
            user_sid: None,
            activity_id: None,
            related_activity_id: None,
            event_data: Map::new(),
            user_data: Map::new(),
            xml: String::new(),
            message: None,
        }
    }

    pub fn level_name(&self) -> &'static str {
        match self.level {
            1 => "Critical",
            2 => "Error",
            3 => "Warning",
            5 => "Verbose",
            _ => "Information",
        }
    }
}

/// Severity outside 1..=5 collapses to informational.
pub(crate) fn normalize_level(level: Option<u64>) -> u8 {
    match level {
        Some(value @ 1..=5) => value as u8,
        _ => 4,
    }
}

/// Fill `record` from an assembled tree. Returns quietly when the tree has
/// no usable `Event`/`System` shape; the heuristic stage covers for it.
pub(crate) fn populate_from_tree(record: &mut EventRecord, roots: &[XmlNode], metadata_only: bool) {
    let Some(event) = roots.iter().find_map(|node| match node {
        XmlNode::Element(element) => Some(element),
        _ => None,
    }) else {
        return;
    };

    let system = if event.name == "System" {
        Some(event)
    } else {
        event.child("System")
    };

    if let Some(system) = system {
        populate_system_fields(record, system);
    }

    if metadata_only {
        return;
    }

    if let Some(event_data) = event.child("EventData") {
        record.event_data = collect_event_data(event_data);
    }
    if let Some(user_data) = event.child("UserData") {
        record.user_data = collect_user_data(user_data);
    }
}

fn populate_system_fields(record: &mut EventRecord, system: &XmlElement) {
    if let Some(provider) = system.child("Provider") {
        if let Some(name) = provider.attribute("Name") {
            record.provider = name.as_cow_str().into_owned();
        }
    }

    if let Some(event_id) = system.child("EventID").and_then(element_as_u64) {
        record.event_id = event_id as u32;
    }
    if let Some(version) = system.child("Version").and_then(element_as_u64) {
        record.version = version as u8;
    }
    record.level = normalize_level(system.child("Level").and_then(element_as_u64));
    if let Some(task) = system.child("Task").and_then(element_as_u64) {
        record.task = task as u16;
    }
    if let Some(opcode) = system.child("Opcode").and_then(element_as_u64) {
        record.opcode = opcode as u8;
    }
    if let Some(keywords) = system.child("Keywords").and_then(element_as_u64) {
        record.keywords = keywords;
    }

    if let Some(channel) = system.child("Channel") {
        record.channel = channel.text().into_owned();
    }
    if let Some(computer) = system.child("Computer") {
        record.computer = computer.text().into_owned();
    }

    if let Some(execution) = system.child("Execution") {
        record.process_id = execution.attribute("ProcessID").and_then(value_as_u64).map(|v| v as u32);
        record.thread_id = execution.attribute("ThreadID").and_then(value_as_u64).map(|v| v as u32);
    }
    if let Some(security) = system.child("Security") {
        record.user_sid = security
            .attribute("UserID")
            .map(|value| value.as_cow_str().into_owned())
            .filter(|sid| !sid.is_empty());
    }
    if let Some(correlation) = system.child("Correlation") {
        record.activity_id = correlation
            .attribute("ActivityID")
            .map(|value| value.as_cow_str().into_owned())
            .filter(|id| !id.is_empty());
        record.related_activity_id = correlation
            .attribute("RelatedActivityID")
            .map(|value| value.as_cow_str().into_owned())
            .filter(|id| !id.is_empty());
    }
}

/// `<Data Name="X">` children key by name, anonymous ones by position, and
/// non-`Data` children (`Binary` and friends) by their element name.
fn collect_event_data(event_data: &XmlElement) -> Map<String, Value> {
    let mut map = Map::new();
    let mut position = 0usize;

    for child in event_data.elements() {
        let key = if child.name == "Data" {
            match child.attribute("Name") {
                Some(name) if !name.as_cow_str().is_empty() => name.as_cow_str().into_owned(),
                _ => {
                    let key = format!("Data{position}");
                    position += 1;
                    key
                }
            }
        } else {
            child.name.clone()
        };

        insert_unique(&mut map, key, element_json_value(child));
    }

    map
}

/// User data wraps its fields in one provider specific element; lift those
/// fields up so the map reads like event data does.
fn collect_user_data(user_data: &XmlElement) -> Map<String, Value> {
    let mut map = Map::new();

    for child in user_data.elements() {
        if child.elements().next().is_some() {
            for field in child.elements() {
                insert_unique(&mut map, field.name.clone(), element_json_value(field));
            }
        } else {
            insert_unique(&mut map, child.name.clone(), element_json_value(child));
        }
    }

    map
}

/// Repeated keys keep every occurrence, suffixed with a running index.
fn insert_unique(map: &mut Map<String, Value>, key: String, value: Value) {
    if !map.contains_key(&key) {
        map.insert(key, value);
        return;
    }

    for n in 1.. {
        let candidate = format!("{key}_{n}");
        if !map.contains_key(&candidate) {
            map.insert(candidate, value);
            return;
        }
    }
}

fn element_json_value(element: &XmlElement) -> Value {
    if element.elements().next().is_some() {
        let mut nested = Map::new();
        for child in element.elements() {
            insert_unique(&mut nested, child.name.clone(), element_json_value(child));
        }
        return Value::Object(nested);
    }

    if let [XmlNode::Value(value)] = element.children.as_slice() {
        return Value::from(value);
    }

    Value::String(element.text().into_owned())
}

fn element_as_u64(element: &XmlElement) -> Option<u64> {
    match element.value() {
        Some(value) => value_as_u64(value),
        None => parse_number(&element.text()),
    }
}

fn value_as_u64(value: &BinXmlValue) -> Option<u64> {
    match value {
        BinXmlValue::UInt8(v) => Some(u64::from(*v)),
        BinXmlValue::UInt16(v) => Some(u64::from(*v)),
        BinXmlValue::UInt32(v) => Some(u64::from(*v)),
        BinXmlValue::UInt64(v) => Some(*v),
        BinXmlValue::Int8(v) => u64::try_from(*v).ok(),
        BinXmlValue::Int16(v) => u64::try_from(*v).ok(),
        BinXmlValue::Int32(v) => u64::try_from(*v).ok(),
        BinXmlValue::Int64(v) => u64::try_from(*v).ok(),
        BinXmlValue::HexInt32(v) => Some(u64::from(*v)),
        BinXmlValue::HexInt64(v) => Some(*v),
        BinXmlValue::String(s) => parse_number(s),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
