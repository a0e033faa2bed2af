//! Daemon components.

pub mod completion;
pub mod learning;
pub mod persist;

pub use completion::{CompletionComponent, CompletionService};
pub use learning::LearningComponent;
pub use persist::PersistComponent;
