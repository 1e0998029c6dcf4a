//! # Fixture Protos
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a compiled descriptor set
//! (with source info, so field comments are available) for integration testing
//! `protobind-core` and the `protobind` CLI.
//! It is not intended for production use.
use prost_reflect::DescriptorPool;

pub const FILE_DESCRIPTOR_SET: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/descriptors.bin"));

/// Decodes [`FILE_DESCRIPTOR_SET`] into a fresh pool.
pub fn descriptor_pool() -> DescriptorPool {
    DescriptorPool::decode(FILE_DESCRIPTOR_SET).expect("fixture descriptor set is valid")
}
