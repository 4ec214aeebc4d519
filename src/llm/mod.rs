pub mod gemini;
pub mod media;
pub mod service;
