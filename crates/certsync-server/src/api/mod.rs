//! API response types shared by feature routes

pub mod response;

pub use response::{ApiResponse, ErrorResponse};
