pub mod engine;
pub mod transcoder;
