//! In-memory directory and recording event sink for reconciliation tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use tsg_reconcile::{
    CreationSettings, CreationSpec, DesiredState, Directory, DirectoryError, EventSink, Instance,
    ListFilter, ScaleEvent, GROUP_TAG,
};

/// A directory call, as observed by [`MemoryDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(ListFilter),
    Create(CreationSpec),
    Delete(String),
    AddTags(String, BTreeMap<String, String>),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::List(_))
    }
}

#[derive(Default)]
struct State {
    instances: Vec<Instance>,
    calls: Vec<Call>,
    ids: VecDeque<String>,
    next_serial: u64,
    clock: i64,
    fail_list: bool,
    /// 1-based index of the create/delete/add_tags call that fails.
    fail_create: Option<usize>,
    fail_delete: Option<usize>,
    fail_tag: Option<usize>,
    creates: usize,
    deletes: usize,
    tags: usize,
}

/// Directory backed by a vector, recording every call.
#[derive(Default)]
pub struct MemoryDirectory {
    state: Mutex<State>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        let dir = Self::default();
        dir.state.lock().unwrap().clock = 10_000;
        dir
    }

    /// Seed an instance of `group` created at `epoch`.
    pub fn with_instance(self, id: &str, group: &str, epoch: i64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut tags = BTreeMap::new();
            if !group.is_empty() {
                tags.insert(GROUP_TAG.to_string(), group.to_string());
            }
            state.instances.push(Instance {
                id: id.to_string(),
                name: None,
                state: Some("running".to_string()),
                created: Utc.timestamp_opt(epoch, 0).unwrap(),
                tags,
            });
        }
        self
    }

    /// Seed `count` instances of `group` with increasing creation times.
    pub fn with_group(mut self, group: &str, count: usize) -> Self {
        for i in 0..count {
            self = self.with_instance(&format!("{group}-{i:08}"), group, 1_000 + i as i64);
        }
        self
    }

    /// Ids handed out to created instances, in order.
    pub fn with_ids(self, ids: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .ids
            .extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn fail_list(self) -> Self {
        self.state.lock().unwrap().fail_list = true;
        self
    }

    pub fn fail_create_on(self, nth: usize) -> Self {
        self.state.lock().unwrap().fail_create = Some(nth);
        self
    }

    pub fn fail_delete_on(self, nth: usize) -> Self {
        self.state.lock().unwrap().fail_delete = Some(nth);
        self
    }

    pub fn fail_tag_on(self, nth: usize) -> Self {
        self.state.lock().unwrap().fail_tag = Some(nth);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.state.lock().unwrap().instances.clone()
    }

    pub fn group_instances(&self, group: &str) -> Vec<Instance> {
        self.instances()
            .into_iter()
            .filter(|i| i.group_tag() == Some(group))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Instance> {
        self.instances().into_iter().find(|i| i.id == id)
    }
}

fn injected(op: &str) -> DirectoryError {
    DirectoryError::api(500, "InternalError", format!("injected {op} failure"))
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Instance>, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List(filter.clone()));
        if state.fail_list {
            return Err(DirectoryError::Transport("connection refused".to_string()));
        }

        Ok(state
            .instances
            .iter()
            .filter(|i| {
                filter
                    .tags
                    .iter()
                    .all(|(k, v)| i.tags.get(k) == Some(v))
            })
            .filter(|i| match &filter.state {
                Some(s) => i.state.as_deref() == Some(s.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn create(&self, spec: &CreationSpec) -> Result<Instance, DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(spec.clone()));
        state.creates += 1;
        if state.fail_create == Some(state.creates) {
            return Err(injected("create"));
        }

        let id = match state.ids.pop_front() {
            Some(id) => id,
            None => {
                state.next_serial += 1;
                format!("{:08x}-0000-4000-8000-000000000000", state.next_serial)
            }
        };
        state.clock += 1;
        let instance = Instance {
            id,
            name: None,
            state: Some("provisioning".to_string()),
            created: Utc.timestamp_opt(state.clock, 0).unwrap(),
            tags: spec.tags.clone(),
        };
        state.instances.push(instance.clone());
        Ok(instance)
    }

    async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(id.to_string()));
        state.deletes += 1;
        if state.fail_delete == Some(state.deletes) {
            return Err(injected("delete"));
        }

        let before = state.instances.len();
        state.instances.retain(|i| i.id != id);
        if state.instances.len() == before {
            return Err(DirectoryError::api(404, "ResourceNotFound", id.to_string()));
        }
        Ok(())
    }

    async fn add_tags(
        &self,
        id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AddTags(id.to_string(), tags.clone()));
        state.tags += 1;
        if state.fail_tag == Some(state.tags) {
            return Err(injected("tag"));
        }

        let Some(instance) = state.instances.iter_mut().find(|i| i.id == id) else {
            return Err(DirectoryError::api(404, "ResourceNotFound", id.to_string()));
        };
        instance
            .tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

/// Sink collecting every emitted event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ScaleEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ScaleEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ScaleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Desired state for `group` at `target` instances.
pub fn desired(group: &str, target: u32) -> DesiredState {
    DesiredState {
        target_count: target,
        group_name: group.to_string(),
        template_id: "abcdefgh1234".to_string(),
        account: "acct".to_string(),
        creation: CreationSettings {
            package: "pkg-small".to_string(),
            image: "img-base".to_string(),
            ..CreationSettings::default()
        },
    }
}
