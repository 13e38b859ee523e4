pub mod config;
pub mod ext;
pub mod util;
