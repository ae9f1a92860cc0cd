pub mod api;
pub mod board;
pub mod config;
pub mod dispatcher;
pub mod entity_store;
pub mod memory_api;
pub mod notification;
pub mod projection;
pub mod remote_access;
pub mod rest_api;
pub mod sync;
