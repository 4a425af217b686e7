// cglib-winsys/src/platform/generic/mod.rs
//
//! Backends that are not specific to any operating system.

pub mod egl;
