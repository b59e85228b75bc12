//! Snowflake transformation - runs block/code SQL scripts in a Snowflake
//! workspace and describes the output tables in manifests.
//!
//! This library exposes the core modules for use in integration tests.

pub mod cli;
pub mod component;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod transformation;
