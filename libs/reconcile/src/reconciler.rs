//! The reconciliation pass.
//!
//! A pass lists the group's instances, compares the count with the target and
//! issues the creates or deletes needed to close the gap. Calls go out one at a
//! time and the first failure ends the pass. Nothing is rolled back: work done
//! before the failure stays done and is reported in the error.
//!
//! Every instance created or deleted gets a scale event, and the pass ends
//! with exactly one more: the no-op record, a summary without an instance id,
//! or the error event of the failing call.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::desired::{CreationSpec, DesiredState, ListFilter};
use crate::directory::{Directory, DirectoryError};
use crate::events::{EventSink, NotificationKind, ScaleEvent};
use crate::instance::{sort_newest_first, Instance, NAME_TAG};

/// Result of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// New instances were created and tagged, in creation order.
    ScaledUp { created: Vec<Instance> },

    /// Instances were deleted, oldest first.
    ScaledDown { deleted: Vec<String> },

    /// The group already had the target count.
    NoOp { expected: usize, found: usize },
}

/// A pass that stopped at a failing directory call.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to list instances: {source}")]
    List {
        #[source]
        source: DirectoryError,
    },

    #[error("failed to delete instance {instance_id}: {source}")]
    Delete {
        /// Instances deleted before the failure.
        deleted: Vec<String>,
        instance_id: String,
        #[source]
        source: DirectoryError,
    },

    #[error("failed to create instance: {source}")]
    Create {
        /// Instances created and tagged before the failure.
        created: Vec<Instance>,
        #[source]
        source: DirectoryError,
    },

    /// The instance exists but carries no name tag. It is not removed.
    #[error("failed to tag instance {}: {source}", untagged.id)]
    Tag {
        /// Instances created and tagged before the failure.
        created: Vec<Instance>,
        untagged: Box<Instance>,
        #[source]
        source: DirectoryError,
    },
}

impl ReconcileError {
    /// The directory failure that ended the pass.
    pub fn directory_error(&self) -> &DirectoryError {
        match self {
            Self::List { source }
            | Self::Delete { source, .. }
            | Self::Create { source, .. }
            | Self::Tag { source, .. } => source,
        }
    }

    /// Ids of instances that now exist because of this pass, tagged or not.
    pub fn created_ids(&self) -> Vec<&str> {
        match self {
            Self::Create { created, .. } => created.iter().map(|i| i.id.as_str()).collect(),
            Self::Tag {
                created, untagged, ..
            } => created
                .iter()
                .map(|i| i.id.as_str())
                .chain(std::iter::once(untagged.id.as_str()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Ids of instances deleted before the failure.
    pub fn deleted_ids(&self) -> &[String] {
        match self {
            Self::Delete { deleted, .. } => deleted,
            _ => &[],
        }
    }
}

/// Derive the display name for a new instance.
///
/// Uses the first 8 characters of the template id and of the instance id;
/// shorter ids are used whole.
pub fn instance_name_tag(template_id: &str, instance_id: &str) -> String {
    let template: String = template_id.chars().take(8).collect();
    let instance: String = instance_id.chars().take(8).collect();
    format!("tsg-{}-{}", template, instance)
}

/// Converges a service group's instance count onto its target.
pub struct Reconciler<D, S> {
    directory: D,
    sink: S,
}

impl<D: Directory, S: EventSink> Reconciler<D, S> {
    pub fn new(directory: D, sink: S) -> Self {
        Self { directory, sink }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one reconciliation pass.
    #[instrument(skip(self, desired), fields(tsg_name = %desired.group_name, target = desired.target_count))]
    pub async fn reconcile(
        &self,
        desired: &DesiredState,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let filter = ListFilter::for_desired(desired);
        let mut instances = self
            .directory
            .list(&filter)
            .await
            .map_err(|source| ReconcileError::List { source })?;
        sort_newest_first(&mut instances);

        let found = instances.len();
        let expected = desired.target_count as usize;
        debug!(expected, found, "Compared instance count");

        match expected.cmp(&found) {
            Ordering::Less => self.scale_down(desired, instances, found - expected).await,
            Ordering::Greater => self.scale_up(desired, expected - found).await,
            Ordering::Equal => {
                self.sink.emit(ScaleEvent::new(
                    &desired.account,
                    &desired.group_name,
                    NotificationKind::InstanceNoOp,
                    format!(
                        "Expected {} instances in TSG: {:?} - found {} instances",
                        expected, desired.group_name, found
                    ),
                ));
                Ok(ReconcileOutcome::NoOp { expected, found })
            }
        }
    }

    /// Delete `count` instances from the tail of the newest-first list.
    async fn scale_down(
        &self,
        desired: &DesiredState,
        mut instances: Vec<Instance>,
        count: usize,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut deleted = Vec::with_capacity(count);

        for _ in 0..count {
            let Some(instance) = instances.pop() else {
                break;
            };

            if let Err(source) = self.directory.delete(&instance.id).await {
                self.sink.emit(
                    ScaleEvent::new(
                        &desired.account,
                        &desired.group_name,
                        NotificationKind::InstanceTerminateError,
                        format!("Error deleting instance {}", instance.id),
                    )
                    .with_instance(&instance.id)
                    .with_error(&source),
                );
                return Err(ReconcileError::Delete {
                    deleted,
                    instance_id: instance.id,
                    source,
                });
            }

            self.sink.emit(
                ScaleEvent::new(
                    &desired.account,
                    &desired.group_name,
                    NotificationKind::InstanceTerminate,
                    format!("Terminating instance {}", instance.id),
                )
                .with_instance(&instance.id),
            );
            deleted.push(instance.id);
        }

        self.sink.emit(ScaleEvent::new(
            &desired.account,
            &desired.group_name,
            NotificationKind::InstanceTerminate,
            format!(
                "Terminated {} instances in TSG: {:?}",
                deleted.len(),
                desired.group_name
            ),
        ));
        Ok(ReconcileOutcome::ScaledDown { deleted })
    }

    /// Create and name `count` instances, one after another.
    async fn scale_up(
        &self,
        desired: &DesiredState,
        count: usize,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut created = Vec::with_capacity(count);

        for _ in 0..count {
            let spec = CreationSpec::assemble(desired);

            let mut instance = match self.directory.create(&spec).await {
                Ok(instance) => instance,
                Err(source) => {
                    self.emit_launch_error(desired, None, &source);
                    return Err(ReconcileError::Create { created, source });
                }
            };

            let name = instance_name_tag(&desired.template_id, &instance.id);
            let tags = BTreeMap::from([(NAME_TAG.to_string(), name)]);

            if let Err(source) = self.directory.add_tags(&instance.id, &tags).await {
                self.emit_launch_error(desired, Some(&instance.id), &source);
                return Err(ReconcileError::Tag {
                    created,
                    untagged: Box::new(instance),
                    source,
                });
            }
            instance.tags.extend(tags);

            self.sink.emit(
                ScaleEvent::new(
                    &desired.account,
                    &desired.group_name,
                    NotificationKind::InstanceLaunch,
                    format!("Launching new instance {}", instance.id),
                )
                .with_instance(&instance.id),
            );
            created.push(instance);
        }

        self.sink.emit(ScaleEvent::new(
            &desired.account,
            &desired.group_name,
            NotificationKind::InstanceLaunch,
            format!(
                "Launched {} new instances in TSG: {:?}",
                created.len(),
                desired.group_name
            ),
        ));
        Ok(ReconcileOutcome::ScaledUp { created })
    }

    fn emit_launch_error(
        &self,
        desired: &DesiredState,
        instance_id: Option<&str>,
        source: &DirectoryError,
    ) {
        let mut event = ScaleEvent::new(
            &desired.account,
            &desired.group_name,
            NotificationKind::InstanceLaunchError,
            "Error launching new instance",
        )
        .with_error(source);
        if let Some(id) = instance_id {
            event = event.with_instance(id);
        }
        self.sink.emit(event);
    }
}
