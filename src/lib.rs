//! boxfile - ISO-BMFF codec and streaming engine
//!
//! This library crate exposes the binary's modules for integration testing.

pub mod auth;
pub mod cli;
pub mod config;
pub mod http;
pub mod listener;
pub mod rtsp_server;
pub mod streaming;
