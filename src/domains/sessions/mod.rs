pub mod entity;
pub mod lifecycle;
pub mod repository;
pub mod service;

pub use entity::{CreateSessionConfig, Session};
pub use repository::SessionStore;
pub use service::SessionOrchestrator;
