//! Control-flow and liveness-style analysis over the dual-half line
//! buffer: declared-function discovery, the per-function control-flow map,
//! and the free-register / future-use queries the rewrite rules consult.

pub mod funcs;
pub mod liveness;
pub mod map;

pub use funcs::DeclaredFunctions;
pub use liveness::{find_free_after_use, region_is_interrupt, used_before_overwritten};
pub use map::{ControlFlowEntry, ControlFlowMap, Side};
