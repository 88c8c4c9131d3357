//! HTTP host for action-group handlers

pub mod endpoints;
