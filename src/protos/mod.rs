//! Protobuf messages, hand-written with prost derives.

pub mod capture;
pub mod capture_data;
