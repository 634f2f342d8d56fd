pub mod aggregate;
pub mod backend;
pub mod db;
pub mod error;
pub mod grocery;
pub mod imaging;
pub mod local;
pub mod models;
pub mod planner;
pub mod samples;
pub mod service;
