pub mod backend;
pub mod cache;
pub mod config;
pub mod domain;
pub mod id;
pub mod notification;
pub mod reconcile;
pub mod rpc;
pub mod signals;
pub mod version;
