pub mod advisory_client;
pub mod capture;
pub mod config;
pub mod gemini_adapter;
pub mod presenter;
pub mod roster_loader;
pub mod sink;
