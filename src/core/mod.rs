//! Data model shared by the shell: argument vectors, jobs and exit outcomes.

pub mod job;
pub mod tokenizer;
