//! HTTP serving layer for the delay model

pub mod api;
pub mod config;
