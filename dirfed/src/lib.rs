//! Deferred write-through user storage over a remote HTTP directory.
//!
//! The host sees a native, transactional user store. Underneath, every
//! record lives in the remote directory service: reads translate to HTTP
//! lookups, while writes are collected in memory and flushed once, at the
//! end of the host's unit of work. Records created inside a unit of work
//! are resolvable by id, username and email before they exist remotely.

#![deny(warnings)]
#![warn(unused_extern_crates)]

#[macro_use]
extern crate log;

pub mod connector;
pub mod delegate;
pub mod provider;
pub mod session;
pub mod storage_id;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testkit;
