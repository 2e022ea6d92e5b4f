pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod identity;
pub mod layout;
pub mod output;
pub mod project;
pub mod xml;
