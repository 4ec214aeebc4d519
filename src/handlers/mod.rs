pub mod cli;
pub mod commands;
pub mod download;
pub mod photo;
