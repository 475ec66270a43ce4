//! TuneHub Server Library
//!
//! Server side of a music streaming app. The binary in main.rs wires these
//! modules to real storage; tests wire them to local ones.
//!
//! # Modules
//!
//! - `upload`: Song upload workflow (audio object, image object, song row)
//! - `storage`: Blob stores (S3-compatible, local filesystem)
//! - `db`: SQLite song metadata
//! - `routes`: HTTP API

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ident;
pub mod routes;
pub mod session;
pub mod state;
pub mod storage;
pub mod upload;
