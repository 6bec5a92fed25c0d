pub mod actions;
pub mod api;
pub mod config;
pub mod csrf;
pub mod dispatch;
pub mod document;
pub mod draft;
pub mod error;
pub mod extract;
pub mod notify;
pub mod page;
pub mod refresh;
pub mod theme;
pub mod transport;
