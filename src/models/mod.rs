//! Data models shared by the deploy services.
//!
//! Only the remote key lives here; local paths stay plain `PathBuf`s.

pub mod object_key;
