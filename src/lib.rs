//! Print artifact service.
//!
//! Renders print specs through an external renderer and hands the resulting
//! documents out either in the same response or through short-lived tickets.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
