//! Integration tests for the Snowflake transformation.

pub mod component_test;
pub mod manifest_test;
pub mod snowflake_test;
pub mod transformation_test;
