//! Desired state and create-request assembly.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::instance::{GROUP_TAG, TEMPLATE_TAG, USER_DATA_KEY};

/// Target state for one service group, resolved once per reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    /// Number of instances the group should have.
    pub target_count: u32,

    /// Service group name. Empty means the listing is not scoped to a group.
    pub group_name: String,

    /// Template the new instances are created from.
    pub template_id: String,

    /// Account the group lives in (reported on scale events).
    pub account: String,

    /// Inputs for creating new instances.
    pub creation: CreationSettings,
}

/// Instance creation inputs as resolved from configuration.
///
/// Empty values mean "not configured" and are never forwarded to the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationSettings {
    pub firewall: bool,
    pub networks: Vec<String>,
    pub affinity: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    /// Already base64-decoded.
    pub userdata: String,
    pub package: String,
    pub image: String,
    /// Optional instance state the listing is restricted to (e.g. `running`).
    pub state_filter: Option<String>,
}

/// Filter applied when listing the group's instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub tags: BTreeMap<String, String>,
    pub state: Option<String>,
}

impl ListFilter {
    /// Build the listing filter for a desired state.
    ///
    /// The group tag is only sent when a group name is configured.
    pub fn for_desired(desired: &DesiredState) -> Self {
        let mut tags = BTreeMap::new();
        if !desired.group_name.is_empty() {
            tags.insert(GROUP_TAG.to_string(), desired.group_name.clone());
        }

        let state = desired
            .creation
            .state_filter
            .as_ref()
            .filter(|s| !s.is_empty())
            .cloned();

        Self { tags, state }
    }
}

/// A fully assembled request for creating one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreationSpec {
    pub firewall_enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Vec<String>>,

    pub tags: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CreationSpec {
    /// Assemble the create request for `desired`.
    ///
    /// Tags start from `tsg.template` and, for a named group, `tsg.name`.
    /// Configured tags are merged in afterwards without overwriting, so a
    /// configured `tsg.name` never replaces the group's own value. Metadata
    /// follows the same rule with `user-data` as the only default.
    pub fn assemble(desired: &DesiredState) -> Self {
        let settings = &desired.creation;

        let mut tags = BTreeMap::new();
        tags.insert(TEMPLATE_TAG.to_string(), desired.template_id.clone());
        if !desired.group_name.is_empty() {
            tags.insert(GROUP_TAG.to_string(), desired.group_name.clone());
        }
        merge_absent(&mut tags, &settings.tags);

        let mut metadata = BTreeMap::new();
        if !settings.userdata.is_empty() {
            metadata.insert(USER_DATA_KEY.to_string(), settings.userdata.clone());
        }
        merge_absent(&mut metadata, &settings.metadata);

        Self {
            firewall_enabled: settings.firewall,
            networks: non_empty(&settings.networks),
            affinity: non_empty(&settings.affinity),
            tags,
            metadata: (!metadata.is_empty()).then_some(metadata),
            package: non_blank(&settings.package),
            image: non_blank(&settings.image),
        }
    }
}

/// Insert every entry of `source` whose key is not already in `target`.
fn merge_absent(target: &mut BTreeMap<String, String>, source: &BTreeMap<String, String>) {
    for (key, value) in source {
        target
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn non_blank(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> DesiredState {
        DesiredState {
            target_count: 3,
            group_name: "g".to_string(),
            template_id: "abcdefgh1234".to_string(),
            account: "acct".to_string(),
            creation: CreationSettings::default(),
        }
    }

    #[test]
    fn test_group_tag_wins_over_configured_tag() {
        let mut state = desired();
        state
            .creation
            .tags
            .insert(GROUP_TAG.to_string(), "override".to_string());
        state
            .creation
            .tags
            .insert("role".to_string(), "web".to_string());

        let spec = CreationSpec::assemble(&state);

        assert_eq!(spec.tags.get(GROUP_TAG).map(String::as_str), Some("g"));
        assert_eq!(spec.tags.get("role").map(String::as_str), Some("web"));
        assert_eq!(
            spec.tags.get(TEMPLATE_TAG).map(String::as_str),
            Some("abcdefgh1234")
        );
    }

    #[test]
    fn test_configured_group_tag_kept_without_group_name() {
        let mut state = desired();
        state.group_name.clear();
        state
            .creation
            .tags
            .insert(GROUP_TAG.to_string(), "from-config".to_string());

        let spec = CreationSpec::assemble(&state);

        assert_eq!(
            spec.tags.get(GROUP_TAG).map(String::as_str),
            Some("from-config")
        );
    }

    #[test]
    fn test_minimal_spec_omits_optional_fields() {
        let spec = CreationSpec::assemble(&desired());

        assert!(!spec.firewall_enabled);
        assert_eq!(spec.networks, None);
        assert_eq!(spec.affinity, None);
        assert_eq!(spec.metadata, None);
        assert_eq!(spec.package, None);
        assert_eq!(spec.image, None);

        let json = serde_json::to_value(&spec).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("networks"));
        assert!(!object.contains_key("metadata"));
        assert!(!object.contains_key("package"));
    }

    #[test]
    fn test_userdata_wins_over_metadata_user_data() {
        let mut state = desired();
        state.creation.userdata = "#!/bin/sh\necho hi".to_string();
        state
            .creation
            .metadata
            .insert(USER_DATA_KEY.to_string(), "ignored".to_string());
        state
            .creation
            .metadata
            .insert("env".to_string(), "prod".to_string());

        let spec = CreationSpec::assemble(&state);
        let metadata = spec.metadata.unwrap();

        assert_eq!(metadata[USER_DATA_KEY], "#!/bin/sh\necho hi");
        assert_eq!(metadata["env"], "prod");
    }

    #[test]
    fn test_full_settings_forwarded() {
        let mut state = desired();
        state.creation.firewall = true;
        state.creation.networks = vec!["net-1".to_string(), "net-2".to_string()];
        state.creation.affinity = vec!["instance!=web-*".to_string()];
        state.creation.package = "pkg-1".to_string();
        state.creation.image = "img-1".to_string();

        let spec = CreationSpec::assemble(&state);

        assert!(spec.firewall_enabled);
        assert_eq!(spec.networks.unwrap().len(), 2);
        assert_eq!(spec.affinity.unwrap(), vec!["instance!=web-*"]);
        assert_eq!(spec.package.as_deref(), Some("pkg-1"));
        assert_eq!(spec.image.as_deref(), Some("img-1"));
    }

    #[test]
    fn test_assemble_is_repeatable() {
        let mut state = desired();
        state
            .creation
            .tags
            .insert("role".to_string(), "web".to_string());

        assert_eq!(CreationSpec::assemble(&state), CreationSpec::assemble(&state));
        assert_eq!(state.creation.tags.len(), 1);
    }

    #[test]
    fn test_list_filter_scoped_to_group() {
        let filter = ListFilter::for_desired(&desired());
        assert_eq!(filter.tags.get(GROUP_TAG).map(String::as_str), Some("g"));
        assert_eq!(filter.state, None);
    }

    #[test]
    fn test_list_filter_unscoped_for_empty_group() {
        let mut state = desired();
        state.group_name.clear();
        state.creation.state_filter = Some(String::new());

        let filter = ListFilter::for_desired(&state);

        assert!(filter.tags.is_empty());
        assert_eq!(filter.state, None);
    }

    #[test]
    fn test_list_filter_state() {
        let mut state = desired();
        state.creation.state_filter = Some("running".to_string());

        let filter = ListFilter::for_desired(&state);

        assert_eq!(filter.state.as_deref(), Some("running"));
    }
}
