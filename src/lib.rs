pub mod app;
pub mod config;
pub mod nodes;
pub mod orchestration;
pub mod provider;
pub mod sandbox;
pub mod shared;
