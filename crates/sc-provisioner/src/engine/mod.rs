//! Embedded infrastructure engine
//!
//! Programs declare resources, the engine diffs them against the state
//! backend and drives [`CloudProvider`] implementations to close the gap.

pub mod events;
pub mod output;
pub mod plan;
pub mod policy;
pub mod program;
pub mod provider;
pub mod stack;
pub mod state;
pub mod store;

pub use events::{EngineEvent, EventReceiver, EventSender, Severity, channel};
pub use output::OutputRef;
pub use plan::{ChangeSummary, OpType, Plan, PropertyDiff, Step};
pub use policy::{EnforcementLevel, Policy, Violation};
pub use program::{
    DesiredResource, Program, ProgramContext, ProviderRef, Registrations, ResourceArgs,
    ResourceRef, StackOutputs,
};
pub use provider::{AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest};
pub use stack::{DestroyOutcome, EngineStack, OperationOptions, read_stack_outputs};
pub use state::{OutputValue, ResourceState, StackState, StateBackend};
pub use store::{HttpObjectStore, LocalObjectStore, ObjectStore};
