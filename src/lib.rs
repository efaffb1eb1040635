//! Offline reader for Windows NT registry hives.
//!
//! [`reg`] validates the base block, finds the root key and walks the key tree without
//! modifying the file. [`render`] turns a walk into the indented text the `regview`
//! binary prints.

pub mod reg;
pub mod render;
