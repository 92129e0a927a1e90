//! Instance count reconciliation for Triton Service Groups.
//!
//! A service group is a set of compute instances sharing a `tsg.name` tag.
//! This library converges such a group onto a target instance count:
//!
//! - **Desired state**: the target count plus everything needed to create an
//!   instance, resolved from configuration once per pass.
//! - **Current state**: the instances the directory lists for the group.
//! - **Convergence**: create or delete exactly the difference.
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same listing
//! - Scale-down removes the oldest instances first
//! - Directory calls are issued one at a time and the first failure ends the pass
//! - No state is kept between passes; the directory is the only source of truth

pub mod desired;
pub mod directory;
pub mod events;
pub mod instance;
pub mod reconciler;

pub use desired::{CreationSettings, CreationSpec, DesiredState, ListFilter};
pub use directory::{Directory, DirectoryError};
pub use events::{EventSink, EventStatus, NotificationKind, ScaleEvent, TracingSink};
pub use instance::{sort_newest_first, Instance, GROUP_TAG, NAME_TAG, TEMPLATE_TAG, USER_DATA_KEY};
pub use reconciler::{instance_name_tag, ReconcileError, ReconcileOutcome, Reconciler};
