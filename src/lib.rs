pub mod api;
pub mod archive;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod layout;
pub mod output;
pub mod restore;
