pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod merge;
pub mod normalize;
pub mod observability;
pub mod protocol;
pub mod state;
pub mod transcode;

mod util;
