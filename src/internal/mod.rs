// SPDX-License-Identifier: MPL-2.0

//! Non exposed modules.

pub mod arena;
pub mod core;
pub mod graph;
pub mod queue;
