// Crate root library declaration and module exports.
pub mod agent;
pub mod alert;
pub mod cli;
pub mod config;
pub mod context;
pub mod controller;
pub mod daemon;
pub mod model;
pub mod permission;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod timer;
