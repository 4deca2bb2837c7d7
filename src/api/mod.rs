//! API module
//!
//! Contains HTTP request handlers for the file upload endpoints

pub mod files;
pub mod info;
pub mod multipart;
