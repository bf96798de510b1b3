//! Resource confinement helpers for modules
//!
//! Modules are trusted code; this only keeps well-behaved modules inside
//! their own data directory.

pub mod filesystem;

pub use filesystem::FileSystemSandbox;
