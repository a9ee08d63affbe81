pub mod blocking;
pub mod path_utils;

pub use blocking::run_blocking;
pub use path_utils::{is_contained_relative, normalize_path, paths_match};
