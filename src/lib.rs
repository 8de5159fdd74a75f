pub mod checkpoint;
pub mod config;
pub mod error;
pub mod export;
pub mod mirror;
pub mod notion;
pub mod retry;
pub mod state;
pub mod web;
