pub mod accounting;
pub mod collector;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod parsers;
pub mod version;
