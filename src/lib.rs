pub mod asr;
pub mod audio;
pub mod cli;
pub mod config;
pub mod document;
pub mod inference;
pub mod registration;
pub mod schedule;
pub mod utils;
