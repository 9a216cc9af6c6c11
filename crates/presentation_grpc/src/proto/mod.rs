//! Protobuf messages and tonic bindings
//!
//! Laid out the way `tonic-build` emits them and checked in, so building the
//! workspace does not need `protoc`.

#![allow(clippy::all, clippy::pedantic, clippy::nursery, clippy::unwrap_used)]

pub mod demo;
pub mod faultinject;
