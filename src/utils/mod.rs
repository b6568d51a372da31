//! Shared helpers for binaries and embedding applications.

pub mod bootstrap;
