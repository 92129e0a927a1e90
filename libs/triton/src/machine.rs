//! CloudAPI machine payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use tsg_reconcile::{CreationSpec, Instance};

/// A machine as returned by `ListMachines` / `CreateMachine`.
#[derive(Debug, Clone, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    pub created: DateTime<Utc>,
    /// Tag values may be strings, numbers or booleans.
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
}

impl From<Machine> for Instance {
    fn from(machine: Machine) -> Self {
        let tags = machine
            .tags
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        Instance {
            id: machine.id,
            name: machine.name,
            state: machine.state,
            created: machine.created,
            tags,
        }
    }
}

/// Build the `CreateMachine` body.
///
/// Tags and metadata are flattened to `tag.<key>` and `metadata.<key>`
/// members. `None` fields of the [`CreationSpec`] are left out entirely.
pub fn create_machine_body(spec: &CreationSpec) -> Value {
    let mut body = Map::new();

    if let Some(package) = &spec.package {
        body.insert("package".to_string(), Value::from(package.as_str()));
    }
    if let Some(image) = &spec.image {
        body.insert("image".to_string(), Value::from(image.as_str()));
    }
    if let Some(networks) = &spec.networks {
        body.insert("networks".to_string(), Value::from(networks.clone()));
    }
    if let Some(affinity) = &spec.affinity {
        body.insert("affinity".to_string(), Value::from(affinity.clone()));
    }
    body.insert(
        "firewall_enabled".to_string(),
        Value::Bool(spec.firewall_enabled),
    );

    for (key, value) in &spec.tags {
        body.insert(format!("tag.{key}"), Value::from(value.as_str()));
    }
    for (key, value) in spec.metadata.iter().flatten() {
        body.insert(format!("metadata.{key}"), Value::from(value.as_str()));
    }

    Value::Object(body)
}

/// Query pairs for `ListMachines`.
pub fn list_query(filter: &tsg_reconcile::ListFilter) -> Vec<(String, String)> {
    let mut query: Vec<(String, String)> = filter
        .tags
        .iter()
        .map(|(key, value)| (format!("tag.{key}"), value.clone()))
        .collect();
    if let Some(state) = &filter.state {
        query.push(("state".to_string(), state.clone()));
    }
    query
}

/// CloudAPI error body.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
