pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod global;
pub mod lifecycle;
pub mod normalizer;
pub mod sweeper;
pub mod telephony;
