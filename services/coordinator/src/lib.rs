//! hetsched coordinator
//!
//! Single-process scheduler for a pool of classified processing devices.
//! Three independent components answer three questions:
//!
//! - [`placement`]: which device runs a task
//! - [`allocator`]: how much shared capacity a request may claim right now
//! - [`balancer`]: how aggregate load is split across workers over time
//!
//! The [`coordinator`] module owns one of each and runs periodic
//! rebalancing in the background.

pub mod allocator;
pub mod balancer;
pub mod class;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fleet;
pub mod placement;

pub use class::ProcessorClass;
pub use coordinator::{Coordinator, RebalanceWorker};
pub use error::{CoordinatorError, CoordinatorResult};
