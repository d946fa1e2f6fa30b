pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod routes;
pub mod snowflake;
pub mod sprite;
pub mod state;
pub mod storage;
