pub mod error;
pub mod hls;
pub mod response;
pub mod upload;
