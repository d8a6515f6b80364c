//! Control plane integration tests
//!
//! Drive the [`switchyard::ControlPlane`] facade over the in-memory store:
//! - cluster scheduling and sub-cluster binding
//! - domains, route rules and their references
//! - versioned exports of every topic

#[path = "control_plane/support.rs"]
mod support;

#[path = "control_plane/test_scheduling.rs"]
mod test_scheduling;

#[path = "control_plane/test_routing.rs"]
mod test_routing;

#[path = "control_plane/test_exports.rs"]
mod test_exports;
