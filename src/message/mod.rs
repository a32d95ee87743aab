//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write `send` and
//! `recv` operations for a given transport layer (an in-process channel
//! group is included). The trait then provides default implementations for
//! broadcast, reduce, reduce-all and gather-all operations, which the
//! particle routines use to sum transfer totals and to share particle
//! buffers between ranks.
//!

pub mod channel;
pub mod comm;
pub mod util;
