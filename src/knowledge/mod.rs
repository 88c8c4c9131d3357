//! Knowledge bases

pub mod base;
