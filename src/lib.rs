pub mod cleanup;
pub mod commands;
pub mod domains;
pub mod errors;
pub mod events;
pub mod services;
pub mod transport;
pub mod utils;
