//! Named regular expressions shared across the engine. Every syntactic
//! recognition the passes need funnels through this table so each GAS
//! idiom is spelled exactly once.

use std::sync::LazyLock;

use regex::Regex;

/// `label:` at the start of a line.
pub static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_.$][A-Za-z0-9_.$]*):").unwrap());

/// Compiler-local numeric label definition `0:`..`9:`.
pub static NUMERIC_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([0-9]):").unwrap());

/// Numeric label reference `0f`/`0b`..`9f`/`9b` as a whole operand.
pub static NUMERIC_LABEL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9])([fb])$").unwrap());

/// `.type name,@function`
pub static TYPE_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.type\s+([A-Za-z_.$][A-Za-z0-9_.$]*)\s*,\s*@function").unwrap()
});

/// `.globl name` / `.global name`
pub static GLOBL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.globa?l\s+([A-Za-z_.$][A-Za-z0-9_.$]*)").unwrap());

/// `.size name,...`
pub static SIZE_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.size\s+([A-Za-z_.$][A-Za-z0-9_.$]*)").unwrap());

/// Mnemonic with optional `.b/.w/.l/.s` suffix and the operand tail.
pub static MNEMONIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+)(?:\.([bwls]))?(?:\s+(.*))?$").unwrap());

/// `d(%sp...` — sp-relative displacement, prefix syntax (with or without
/// a trailing index part).
pub static SP_DISP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+)\(%sp").unwrap());

/// `(d,%sp...` — sp-relative displacement, comma syntax.
pub static SP_DISP_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((-?\d+),%sp").unwrap());

/// Alternative pc-relative syntax `%pc@(disp,%dN:s)`.
pub static PC_AT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%pc@\(([^,()]+),%([da][0-7]):([wl])\)").unwrap());

/// `%fp` register alias.
pub static FP_ALIAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%fp\b").unwrap());

/// Long index width inside an indexed mode: `...,%xN.l)`.
pub static INDEX_LONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:\(|,)%a[0-7],%[da][0-7])\.l\)").unwrap());

/// Redundant parentheses around a bare symbol in a jump/call/pea operand.
pub static PAREN_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(([A-Za-z_.$][A-Za-z0-9_.$+-]*)\)$").unwrap());

/// Redundant parentheses inside an immediate: `#(expr)`.
pub static PAREN_IMMEDIATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\(([^()]*)\)$").unwrap());
