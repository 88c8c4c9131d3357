//! API data models
//!
//! This module contains data structures for Bedrock requests and responses,
//! training dataset records, agent action groups and knowledge bases.

pub mod agent;
pub mod bedrock;
pub mod dataset;
pub mod knowledge;
