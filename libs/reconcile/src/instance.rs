//! Observed instances and the removal ordering.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag carrying the owning service group's name.
pub const GROUP_TAG: &str = "tsg.name";

/// Tag carrying the template that produced the instance.
pub const TEMPLATE_TAG: &str = "tsg.template";

/// Tag carrying the derived display name.
pub const NAME_TAG: &str = "name";

/// Metadata key the decoded userdata is stored under.
pub const USER_DATA_KEY: &str = "user-data";

/// A compute instance as reported by the directory.
///
/// `id` and `created` are assigned by the provider and never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    pub created: DateTime<Utc>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Instance {
    /// Group this instance belongs to, if tagged.
    pub fn group_tag(&self) -> Option<&str> {
        self.tags.get(GROUP_TAG).map(String::as_str)
    }

    /// Template this instance was created from, if tagged.
    pub fn template_tag(&self) -> Option<&str> {
        self.tags.get(TEMPLATE_TAG).map(String::as_str)
    }

    /// Derived display name, if tagged.
    pub fn name_tag(&self) -> Option<&str> {
        self.tags.get(NAME_TAG).map(String::as_str)
    }

    /// Creation time truncated to whole epoch seconds.
    pub fn created_epoch(&self) -> i64 {
        self.created.timestamp()
    }
}

/// Sort instances newest first.
///
/// Only the creation time in whole seconds participates. The sort is stable,
/// so instances created within the same second keep their listing order and
/// the last one listed is removed first.
pub fn sort_newest_first(instances: &mut [Instance]) {
    instances.sort_by(|a, b| b.created_epoch().cmp(&a.created_epoch()));
}
