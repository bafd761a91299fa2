//! Core types for the LifeFlow realtime layer: rows, change events, the
//! in-process change bus, the live collection, and the presence model.

pub mod collection;
pub mod events;
pub mod presence;
pub mod row;
