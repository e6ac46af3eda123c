//! Crowd-sourced fact feed: filtered sync, two-phase submissions with image
//! attachment, and confirmed-only voting against a remote store.

pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod gateway;
pub mod model;
pub mod storage;
pub mod theme;
pub mod util;
