//! Line model for m68k GAS assembly: trimmed source lines, the named
//! regex library, registers and register sets, operand classification,
//! per-line register usage, and the emitted/pending line buffer the
//! optimization passes operate on.

pub mod buffer;
pub mod expr;
pub mod line;
pub mod operand;
pub mod patterns;
pub mod register;
pub mod usage;

pub use buffer::{AsmBuf, TailGuard};
pub use line::{split_operands, Instr, Line, PIN_MARKER};
pub use operand::{Disp, IndexSize, Operand, Size};
pub use register::{format_movem_list, from_movem_mask, parse_movem_list, Reg, RegSet};
pub use usage::{classify, flow_kind, FlowKind, Usage};
