pub mod agents;
pub mod git;
pub mod sessions;
pub mod settings;
pub mod terminal;
