pub mod cache;
pub mod database;
pub mod dirnav;
pub mod error;
pub mod fusion;
pub mod history;
pub mod import;
pub mod knowledge;
pub mod predictor;
pub mod sequence;
pub mod settings;
pub mod stores;
pub mod suggestion;
pub mod workflow;

pub use error::StoreError;
pub use settings::Settings;
pub use stores::LearningStores;
pub use suggestion::{CancelFlag, Suggestion, SuggestionSource};
