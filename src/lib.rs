pub mod config;
pub mod error;
pub mod normalize;
pub mod observability;
pub mod protocol;
pub mod stream;

pub(crate) mod json_scan;
