// credhub-auth - Library root

pub mod auth;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod replay;
pub mod repository;
pub mod session;
