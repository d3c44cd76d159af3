//! Uploader for pushing media attachments to an FTP-fed CDN origin
//!
//! When a media file is added, it is copied over FTP to the CDN origin under a
//! timestamped name, and the attachment's public URL is rewritten to the CDN
//! copy on later lookups.

pub mod app;
pub mod error;
pub mod ftp;
pub mod media;
pub mod models;
pub mod resolver;
pub mod settings;
pub mod tester;
pub mod uploader;

pub use error::{Error, Result};
