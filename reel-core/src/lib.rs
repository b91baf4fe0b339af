//! Reel Core
//!
//! Core types shared by the Reel services.
//!
//! This crate contains:
//! - Domain types: profiles, proxies, tasks, daily stats and worker results
//! - DTOs: the wire format of the external task API

pub mod domain;
pub mod dto;
