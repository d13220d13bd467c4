pub mod codec;
pub mod engine;
pub mod entity;
pub mod error;
pub mod ordering;
pub mod render;
pub mod wildcard;
