//! Core application modules
//!
//! This module contains configuration, constants, logging, the Bedrock
//! client and its process-wide cache, and XML scanning helpers.

pub mod client;
pub mod client_cache;
pub mod config;
pub mod constants;
pub mod logging;
pub mod provider;
pub mod xml;
