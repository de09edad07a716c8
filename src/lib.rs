// src/lib.rs

//! litwatch: one literature query, many bibliographic backends, alerts on new papers.

pub mod backends;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod translate;
pub mod utils;
