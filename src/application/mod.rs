pub mod cache;
pub mod catalog;
pub mod orchestrator;
pub mod service;

pub use catalog::ModelCatalog;
pub use orchestrator::{FanOut, Orchestrator, OrchestratorOptions};
pub use service::AppService;
