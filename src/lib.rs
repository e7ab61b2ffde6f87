pub mod checkpoint;
pub mod config;
pub mod data;
pub mod db;
pub mod engine;
pub mod error;
pub mod text;
