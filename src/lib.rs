#[macro_use]
extern crate diesel;

pub mod core;
pub mod auth;
pub mod capability;
pub mod config;
pub mod http;
pub mod db;
pub mod upstream;
pub mod util;
pub mod provider;
