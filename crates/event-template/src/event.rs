//! Monitoring event data model.
//!
//! [`Event`] mirrors the wire format events arrive in (snake_case JSON, with
//! names and labels nested under `metadata`). Templates do not see that
//! shape directly. [`Event::to_value`] builds the field tree templates
//! render against:
//!
//! ```text
//! Check.Name          check.metadata.name
//! Check.Executed      check.executed
//! Entity.Name         entity.metadata.name
//! Entity.System.OS    entity.system.os
//! ID                  id (raw bytes)
//! ```
//!
//! `ObjectMeta` fields (`Name`, `Namespace`, `Labels`, `Annotations`,
//! `CreatedBy`) are promoted onto `Check`, `Entity` and the event itself, and
//! stay reachable under `ObjectMeta`. Keys are only ever looked up by exact
//! name, so a misspelled field fails the render.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::template::Value;

/// Name, namespace and free-form key/value data attached to a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub created_by: String,
}

/// One past execution of a check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckHistory {
    pub status: u32,
    pub executed: i64,
}

/// The result of running a check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Check {
    pub metadata: ObjectMeta,
    pub command: String,
    pub handlers: Vec<String>,
    pub interval: u32,
    pub subscriptions: Vec<String>,
    pub issued: i64,
    /// Unix timestamp, in seconds, of when the check ran.
    pub executed: i64,
    pub duration: f64,
    pub status: u32,
    pub output: String,
    pub state: String,
    pub occurrences: i64,
    pub occurrences_watermark: i64,
    pub last_ok: i64,
    pub total_state_change: u32,
    pub proxy_entity_name: String,
    pub publish: bool,
    pub history: Vec<CheckHistory>,
}

/// Host facts reported by an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct System {
    pub hostname: String,
    pub os: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub arch: String,
}

/// The monitored thing a check ran against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entity {
    pub metadata: ObjectMeta,
    pub entity_class: String,
    pub system: System,
    pub subscriptions: Vec<String>,
    pub last_seen: i64,
    pub user: String,
}

/// A check result about an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<Check>,
    pub metadata: ObjectMeta,
    /// Event identifier, normally the 16 bytes of a UUID. Base64 on the wire.
    #[serde(with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub id: Option<Vec<u8>>,
    pub sequence: i64,
}

impl Event {
    /// Builds the value tree templates render against.
    ///
    /// An absent `check` or `entity` is left out entirely, so any reference
    /// to it fails. An absent `id` is an empty byte string.
    pub fn to_value(&self) -> Value {
        let mut fields = meta_fields(&self.metadata);
        fields.extend(entries([
            ("Timestamp", Value::from(self.timestamp)),
            ("Sequence", Value::from(self.sequence)),
            ("ID", Value::Bytes(self.id.clone().unwrap_or_default())),
        ]));
        if let Some(check) = &self.check {
            fields.insert("Check".to_string(), check.to_value());
        }
        if let Some(entity) = &self.entity {
            fields.insert("Entity".to_string(), entity.to_value());
        }
        Value::Map(fields)
    }
}

impl Check {
    fn to_value(&self) -> Value {
        let history: Value = self
            .history
            .iter()
            .map(|h| {
                Value::Map(entries([
                    ("Status", Value::from(h.status)),
                    ("Executed", Value::from(h.executed)),
                ]))
            })
            .collect();

        let mut fields = meta_fields(&self.metadata);
        fields.extend(entries([
            ("Command", Value::from(self.command.as_str())),
            ("Handlers", strings(&self.handlers)),
            ("Interval", Value::from(self.interval)),
            ("Subscriptions", strings(&self.subscriptions)),
            ("Issued", Value::from(self.issued)),
            ("Executed", Value::from(self.executed)),
            ("Duration", Value::from(self.duration)),
            ("Status", Value::from(self.status)),
            ("Output", Value::from(self.output.as_str())),
            ("State", Value::from(self.state.as_str())),
            ("Occurrences", Value::from(self.occurrences)),
            ("OccurrencesWatermark", Value::from(self.occurrences_watermark)),
            ("LastOK", Value::from(self.last_ok)),
            ("TotalStateChange", Value::from(self.total_state_change)),
            ("ProxyEntityName", Value::from(self.proxy_entity_name.as_str())),
            ("Publish", Value::from(self.publish)),
            ("History", history),
        ]));
        Value::Map(fields)
    }
}

impl Entity {
    fn to_value(&self) -> Value {
        let system = entries([
            ("Hostname", Value::from(self.system.hostname.as_str())),
            ("OS", Value::from(self.system.os.as_str())),
            ("Platform", Value::from(self.system.platform.as_str())),
            ("PlatformFamily", Value::from(self.system.platform_family.as_str())),
            ("PlatformVersion", Value::from(self.system.platform_version.as_str())),
            ("Arch", Value::from(self.system.arch.as_str())),
        ]);

        let mut fields = meta_fields(&self.metadata);
        fields.extend(entries([
            ("EntityClass", Value::from(self.entity_class.as_str())),
            ("System", Value::Map(system)),
            ("Subscriptions", strings(&self.subscriptions)),
            ("LastSeen", Value::from(self.last_seen)),
            ("User", Value::from(self.user.as_str())),
        ]));
        Value::Map(fields)
    }
}

fn entries<const N: usize>(fields: [(&str, Value); N]) -> BTreeMap<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn strings(items: &[String]) -> Value {
    items.iter().map(String::as_str).collect()
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Map(
        map.iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect(),
    )
}

/// Metadata fields, both promoted and nested under `ObjectMeta`.
fn meta_fields(meta: &ObjectMeta) -> BTreeMap<String, Value> {
    let nested = entries([
        ("Name", Value::from(meta.name.as_str())),
        ("Namespace", Value::from(meta.namespace.as_str())),
        ("Labels", string_map(&meta.labels)),
        ("Annotations", string_map(&meta.annotations)),
        ("CreatedBy", Value::from(meta.created_by.as_str())),
    ]);

    let mut fields = nested.clone();
    fields.insert("ObjectMeta".to_string(), Value::Map(nested));
    fields
}

/// Base64 encoding for the optional event ID.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) if !encoded.is_empty() => BASE64
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(|e| de::Error::custom(format!("invalid base64 event id: {e}"))),
            _ => Ok(None),
        }
    }
}
