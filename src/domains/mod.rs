pub mod content;
pub mod envelope;
