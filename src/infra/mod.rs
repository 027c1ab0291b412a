//! Infrastructure layer (adapters/implementations).
//!
//! This module contains the IO-facing pieces: SQLite, snapshot encoding,
//! configuration files and the external service seams.

pub mod app_config;
pub mod db;
pub mod services;
pub mod snapshot;
