#![forbid(unsafe_code)]

pub mod policy_map_service_impl;
