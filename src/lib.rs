pub mod app;
pub mod builder;
pub mod config;
pub mod definitions;
pub mod domain;
pub mod download;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod output;
pub mod psup;
pub mod registry;
pub mod schemas;
pub mod stac;
pub mod transformer;
