pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod ocr;
pub mod report;
pub mod router;
pub mod security;
pub mod util;
