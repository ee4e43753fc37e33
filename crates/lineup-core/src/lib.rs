//! lineup-core - domain model and consistency logic for sign-up lists.
//!
//! A sign-up list is one document: a fixed-capacity table of main-roster
//! and waitlist slots plus the set of users holding them. This crate owns
//! the rules that keep that document consistent while clients take and
//! release spots concurrently and while lists come and go.
//!
//! # Modules
//!
//! - [`slot`]: slot keys and the discriminated slot value
//! - [`list`]: the list document and user profiles
//! - [`signup`]: signup/release planning and execution
//! - [`reconcile`]: shift-and-promote correction after a vacancy
//! - [`teardown`]: batched deletion of dependent bucket signups
//! - [`store`]: the document store trait, versions, and change events
//! - [`ipc`]: the framed socket protocol
//! - [`config`]: daemon configuration
//!
//! The crate is deliberately backend-free: everything here is pure logic
//! over snapshots plus the [`store::ListStore`] seam. Concrete backends
//! and the event wiring live in the daemon crate.

pub mod config;
pub mod ipc;
pub mod list;
pub mod reconcile;
pub mod signup;
pub mod slot;
pub mod store;
pub mod teardown;

pub use list::{ListDoc, UserProfile};
pub use slot::{Entry, SlotKey, SlotValue};
