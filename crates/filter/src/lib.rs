//! Subscription filter language for the LifeFlow realtime client.
//!
//! Filters use the backend's PostgREST-style syntax:
//!
//! - `room_id=eq.abc` — simple comparison (`eq`, `neq`, `gt`, `gte`, `lt`,
//!   `lte`)
//! - `status=in.(online,away)` — membership
//! - `and(room_id=eq.abc,deleted=eq.false)` / `or(...)` — compounds,
//!   nestable
//! - dotted columns (`author.id=eq.u1`) traverse nested JSON
//!
//! A parsed [`Filter`] evaluates against any JSON row object and renders
//! back to its wire form via `Display`.

pub mod ast;
pub mod eval;
pub mod parse;

pub use ast::{CompareOp, Comparison, Filter};
pub use parse::{parse, ParseError};
