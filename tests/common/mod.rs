//! Common test utilities shared by the integration tests
//!
//! `peers` wires coordinators onto an in-memory hub and drives them with a
//! synthetic clock, so multi-peer scenarios run without sockets or sleeps.
#![allow(dead_code)]

pub mod peers;
