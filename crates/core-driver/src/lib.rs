//! The optimization driver: normalization, then two full passes. Each
//! pass feeds pending lines into the emitted half one at a time, offering
//! the trailing window to the multi-line rules on every append, then runs
//! the single-line and structural tiers over the accumulated output. The
//! second pass additionally shortens in-range branches. For a fixed input
//! and configuration the output is bit-identical across runs.

pub mod normalize;
pub mod report;

use core_config::OptimizerConfig;
use core_flow::DeclaredFunctions;
use core_line::AsmBuf;
use core_rules::{
    run_shorten, run_single_line, run_structural, try_multiline, RewriteRecord, RuleCtx,
};
use tracing::{debug, info};

pub use report::Report;

/// Cap on back-to-back window matches after one append; rewrites that
/// keep enabling each other must not stall the pass.
const CASCADE_LIMIT: usize = 8;

pub struct Optimizer {
    cfg: OptimizerConfig,
}

pub struct OptimizeOutcome {
    pub text: String,
    pub report: Report,
}

impl Optimizer {
    pub fn new(cfg: OptimizerConfig) -> Optimizer {
        Optimizer { cfg }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.cfg
    }

    pub fn optimize(&self, source: &str) -> OptimizeOutcome {
        let mut buf = AsmBuf::from_source(source);
        mark_inline_asm(&mut buf, &self.cfg);
        let funcs = DeclaredFunctions::scan(buf.lines());
        info!(
            target: "driver",
            lines = buf.len(),
            functions = funcs.len(),
            "optimize_start"
        );

        let mut report = Report::default();
        normalize::run(&mut buf, &self.cfg);
        self.pass(&mut buf, &funcs, &mut report, 1);
        self.pass(&mut buf, &funcs, &mut report, 2);

        info!(
            target: "driver",
            rewrites = report.len(),
            "optimize_done"
        );
        for (rule, count) in report.counts() {
            debug!(target: "driver", rule, count, "rule_summary");
        }
        OptimizeOutcome {
            text: buf.to_source(),
            report,
        }
    }

    fn pass(
        &self,
        buf: &mut AsmBuf,
        funcs: &DeclaredFunctions,
        report: &mut Report,
        number: usize,
    ) {
        buf.rewind();
        while buf.advance() {
            let mut cascades = 0;
            loop {
                if cascades >= CASCADE_LIMIT {
                    break;
                }
                let rewrite = {
                    let mut ctx = RuleCtx {
                        buf: &mut *buf,
                        cfg: &self.cfg,
                        funcs,
                    };
                    try_multiline(&mut ctx)
                };
                let Some(rewrite) = rewrite else { break };
                let before = buf.window(rewrite.consumed).to_vec();
                report.record(RewriteRecord {
                    rule: rewrite.rule,
                    origin: before.iter().find_map(|l| l.origin),
                    before: before.iter().map(|l| l.text().to_string()).collect(),
                    after: rewrite
                        .replacement
                        .iter()
                        .map(|l| l.text().to_string())
                        .collect(),
                });
                buf.splice_tail(rewrite.consumed, rewrite.replacement);
                cascades += 1;
            }
        }
        report.extend(run_single_line(buf, &self.cfg, funcs));
        report.extend(run_structural(buf, &self.cfg, number == 2));
        if number == 2 {
            report.extend(run_shorten(buf));
        }
        debug!(target: "driver", pass = number, rewrites = report.len(), "pass_done");
    }
}

/// Pin everything between `#APP` and `#NO_APP` unless inline-asm
/// optimization was requested. The delimiters themselves are comments and
/// pass through verbatim either way.
fn mark_inline_asm(buf: &mut AsmBuf, cfg: &OptimizerConfig) {
    if cfg.optimize_inline_asm_blocks {
        return;
    }
    let mut in_app = false;
    for idx in 0..buf.len() {
        let text = buf.line(idx).text().to_string();
        match text.as_str() {
            "#APP" => in_app = true,
            "#NO_APP" => in_app = false,
            _ => {
                if in_app {
                    buf.line_mut(idx).pinned = true;
                }
            }
        }
    }
}

/// Convenience entry: optimize `source` under `cfg`.
pub fn optimize(source: &str, cfg: &OptimizerConfig) -> OptimizeOutcome {
    Optimizer::new(cfg.clone()).optimize(source)
}
