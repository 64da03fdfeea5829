//! Configuration: the fixed map of booleans selecting which rule families
//! run, parsed from `mdopt.toml` (or an override path provided by the
//! binary). Unknown fields are ignored and a parse error falls back to the
//! defaults, so a stale config file never aborts an optimization run.

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

/// Flag surface. Field names follow the recognized option names exactly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// When false, candidates are reported but nothing is rewritten and no
    /// output file is produced.
    pub save_optimizations: bool,
    /// Emit a per-match diff to stdout.
    pub print_log: bool,
    /// Present the diff as aligned columns.
    pub two_column_log: bool,
    /// Consider lines between `#APP`/`#NO_APP`.
    pub optimize_inline_asm_blocks: bool,
    pub use_find_free_after_use: bool,
    pub use_find_not_used: bool,
    pub use_fabri1983_movem_optimizations: bool,
    pub use_fabri1983_optimizations: bool,
    /// `bset.b #7,mem / beq` -> `tas mem / bpl`; hazardous on memory-mapped
    /// I/O regions.
    pub use_tas_on_io_memory: bool,
    pub optimize_mul_high_word_important: bool,
    pub optimize_mul_high_word_not_important: bool,
    pub optimize_division_high_word_not_important: bool,
    /// Shrink `addq.l`/`subq.l` on address registers to `.w`.
    pub use_replace_addql_subql_by_addqw_subqw: bool,
    pub use_replace_load_subroutine_into_an_by_direct_call: bool,
    pub use_aggressive_avoid_clear_before_move_word: bool,
    pub use_aggressive_compact_two_words_push: bool,
    pub use_aggressive_clr_sp: bool,
    pub use_aggressive_replace_long_indirect_by_word: bool,
    /// Maximum multi-line window size (2..=6).
    pub multi_line_optimization_limit: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            save_optimizations: true,
            print_log: false,
            two_column_log: false,
            optimize_inline_asm_blocks: false,
            use_find_free_after_use: true,
            use_find_not_used: true,
            use_fabri1983_movem_optimizations: true,
            use_fabri1983_optimizations: true,
            use_tas_on_io_memory: false,
            optimize_mul_high_word_important: false,
            optimize_mul_high_word_not_important: true,
            optimize_division_high_word_not_important: true,
            use_replace_addql_subql_by_addqw_subqw: false,
            use_replace_load_subroutine_into_an_by_direct_call: false,
            use_aggressive_avoid_clear_before_move_word: false,
            use_aggressive_compact_two_words_push: false,
            use_aggressive_clr_sp: false,
            use_aggressive_replace_long_indirect_by_word: false,
            multi_line_optimization_limit: 6,
        }
    }
}

impl OptimizerConfig {
    /// Resolve conflicting or out-of-range settings, logging each
    /// adjustment.
    pub fn validate(&mut self) {
        if self.optimize_mul_high_word_important && self.optimize_mul_high_word_not_important {
            warn!(
                target: "config",
                "optimize_mul_high_word_important and optimize_mul_high_word_not_important are \
                 mutually exclusive; keeping the high-word-important table"
            );
            self.optimize_mul_high_word_not_important = false;
        }
        let clamped = self.multi_line_optimization_limit.clamp(2, 6);
        if clamped != self.multi_line_optimization_limit {
            info!(
                target: "config",
                requested = self.multi_line_optimization_limit,
                clamped,
                "multi_line_optimization_limit_clamped"
            );
            self.multi_line_optimization_limit = clamped;
        }
    }
}

/// Best-effort config path: a local `mdopt.toml` next to the invocation.
pub fn discover() -> PathBuf {
    PathBuf::from("mdopt.toml")
}

/// Load configuration from `path` (or the discovered default). A missing
/// file or a parse error yields the defaults.
pub fn load_from(path: Option<PathBuf>) -> Result<OptimizerConfig> {
    let path = path.unwrap_or_else(discover);
    let mut config = if let Ok(content) = std::fs::read_to_string(&path) {
        match toml::from_str::<OptimizerConfig>(&content) {
            Ok(config) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                config
            }
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_error_using_defaults");
                OptimizerConfig::default()
            }
        }
    } else {
        OptimizerConfig::default()
    };
    config.validate();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert!(cfg.save_optimizations);
        assert!(!cfg.use_tas_on_io_memory);
        assert_eq!(cfg.multi_line_optimization_limit, 6);
    }

    #[test]
    fn parses_flags() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "use_tas_on_io_memory = true\nmulti_line_optimization_limit = 4\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.use_tas_on_io_memory);
        assert_eq!(cfg.multi_line_optimization_limit, 4);
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not valid = = toml").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.save_optimizations);
    }

    #[test]
    fn mul_tables_are_mutually_exclusive() {
        let mut cfg = OptimizerConfig::default();
        cfg.optimize_mul_high_word_important = true;
        cfg.optimize_mul_high_word_not_important = true;
        cfg.validate();
        assert!(cfg.optimize_mul_high_word_important);
        assert!(!cfg.optimize_mul_high_word_not_important);
    }

    #[test]
    fn limit_is_clamped() {
        let mut cfg = OptimizerConfig::default();
        cfg.multi_line_optimization_limit = 99;
        cfg.validate();
        assert_eq!(cfg.multi_line_optimization_limit, 6);
        cfg.multi_line_optimization_limit = 0;
        cfg.validate();
        assert_eq!(cfg.multi_line_optimization_limit, 2);
    }
}
