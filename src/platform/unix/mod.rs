// cglib-winsys/src/platform/unix/mod.rs
//
//! Backends for Linux and other Unix systems.

pub mod kms;
pub mod wayland;
pub mod x11;
