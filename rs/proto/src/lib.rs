//! Protobuf message definitions for the CION control plane.
//!
//! The message structs under `gen/` are checked in in generated form and
//! follow the SCION control-plane protobuf services; the build does not
//! invoke protoc.

pub mod control_plane;
pub mod crypto;
