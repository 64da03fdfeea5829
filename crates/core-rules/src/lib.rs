//! The rewrite rules, in three tiers: multi-line window rules offered on
//! every append, single-line peepholes, and structural rules (movem
//! degeneration, short-branch shortening on the second pass).
//!
//! Every rule is pure and self-contained: when its preconditions cannot be
//! met (no free register, inadmissible stack-frame change, gated flag off)
//! it answers "no change" and the driver moves on.

pub mod multiline;
pub mod shorten;
pub mod single;
pub mod structural;

use core_config::OptimizerConfig;
use core_flow::{find_free_after_use, used_before_overwritten, DeclaredFunctions};
use core_line::{AsmBuf, Line, Reg, RegSet};

/// Result of a matched rule: how many trailing emitted lines to splice out
/// and what to put in their place.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub rule: &'static str,
    pub consumed: usize,
    pub replacement: Vec<Line>,
}

/// One applied rewrite, for the diff log.
#[derive(Debug, Clone)]
pub struct RewriteRecord {
    pub rule: &'static str,
    pub origin: Option<u32>,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Shared context handed to every rule: the buffer (cursor at the point
/// just past the window under consideration), the flag surface, and the
/// declared-function table.
pub struct RuleCtx<'a> {
    pub buf: &'a mut AsmBuf,
    pub cfg: &'a OptimizerConfig,
    pub funcs: &'a DeclaredFunctions,
}

impl RuleCtx<'_> {
    /// The last `k` emitted lines, or `None` when the window is short or
    /// touches a pinned line.
    pub fn window(&self, k: usize) -> Option<&[Line]> {
        if self.buf.cursor() < k {
            return None;
        }
        let window = self.buf.window(k);
        if window.iter().any(|l| l.pinned) {
            return None;
        }
        Some(window)
    }

    /// Next pending line, for rules that must wait until a run is maximal.
    pub fn peek_pending(&self) -> Option<&Line> {
        self.buf.pending().first()
    }

    /// Registers of `class` free at the point past the (neutralized)
    /// window. Empty when the analysis is disabled.
    pub fn find_free(&mut self, window: usize, class: RegSet, excludes: RegSet) -> Vec<Reg> {
        if !self.cfg.use_find_free_after_use {
            return Vec::new();
        }
        find_free_after_use(self.buf, window, class, excludes)
    }

    pub fn find_free_data(&mut self, window: usize, excludes: RegSet) -> Option<Reg> {
        self.find_free(window, RegSet::DATA, excludes).into_iter().next()
    }

    pub fn find_free_addr(&mut self, window: usize, excludes: RegSet) -> Option<Reg> {
        self.find_free(window, RegSet::ADDR, excludes).into_iter().next()
    }

    /// Conservative "might `reg` still be needed" answer; `true` when the
    /// analysis is disabled.
    pub fn used_after(&mut self, window: usize, reg: Reg) -> bool {
        if !self.cfg.use_find_not_used {
            return true;
        }
        used_before_overwritten(self.buf, window, reg)
    }

    /// Commit a synthesized scratch register: free for scratch-pad
    /// registers in ordinary routines, a prologue/epilogue frame change
    /// otherwise. Call only once every other precondition holds.
    pub fn ensure_saved(&mut self, reg: Reg) -> bool {
        core_frame::ensure_saved(self.buf, reg)
    }

    /// Retire a register from the enclosing prologue set.
    pub fn retire_saved(&mut self, reg: Reg) -> bool {
        core_frame::remove_register(self.buf, reg)
    }
}

/// Offer the trailing window to the multi-line table, widest window first.
pub fn try_multiline(ctx: &mut RuleCtx<'_>) -> Option<Rewrite> {
    let limit = ctx.cfg.multi_line_optimization_limit.clamp(2, 6);
    for k in (2..=limit).rev() {
        if ctx.window(k).is_none() {
            continue;
        }
        for rule in multiline::RULES {
            if let Some(rewrite) = (rule.apply)(ctx, k) {
                debug_assert_eq!(rewrite.consumed, k);
                return Some(rewrite);
            }
        }
    }
    None
}

pub use shorten::run_shorten;
pub use single::run_single_line;
pub use structural::run_structural;

/// Helper shared by the tiers: record one applied rewrite.
pub(crate) fn record(
    out: &mut Vec<RewriteRecord>,
    rule: &'static str,
    origin: Option<u32>,
    before: &[Line],
    after: &[Line],
) {
    out.push(RewriteRecord {
        rule,
        origin,
        before: before.iter().map(|l| l.text().to_string()).collect(),
        after: after.iter().map(|l| l.text().to_string()).collect(),
    });
}
