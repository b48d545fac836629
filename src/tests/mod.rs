// src/tests/mod.rs
pub(crate) mod support;

mod upload_tests;
