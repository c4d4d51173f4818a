//! Model provider implementations for BoltStudio.
//!
//! All providers implement the `boltstudio_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::{OpenAiCompatProvider, classify_error};
