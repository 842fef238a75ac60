//! The run execution engine: `RunManager` materializes a `HierarchyConfig`
//! into a tree of `Agent`s bound to one `Run`, streams their activity onto a
//! per-run `EventBus`, and settles the run to a terminal status.

pub mod agent;
pub mod call_tracker;
pub mod callback;
pub mod cancel;
pub mod context;
pub mod event_bus;
pub mod event_store;
pub mod hierarchy;
pub mod run_manager;
pub mod runner;
pub mod tool_provider;
