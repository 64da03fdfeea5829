//! Byte sizer for the short-branch pass: a model of encoded instruction
//! sizes per addressing mode, plus the data directives (`.byte`/`.word`/
//! `.long`, `.ascii`/`.asciz`, `.rept`/`.endr`, `.if`/`.endif` with
//! variables from `.set`). Anything the model cannot size makes the whole
//! region unmeasurable; the caller then skips shortening there, which is
//! always the sound direction.

use std::collections::HashMap;

use core_line::expr::{self, ExprError};
use core_line::{split_operands, Instr, Line, Operand, Size};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SizerError {
    #[error("cannot size mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("cannot size operand `{0}`")]
    UnknownOperand(String),
    #[error("cannot size directive `{0}`")]
    UnknownDirective(String),
    #[error("malformed `{0}` block")]
    MalformedBlock(&'static str),
    #[error("expression error: {0}")]
    Expr(#[from] ExprError),
}

/// Byte layout of a region: per-line start offsets and label offsets.
#[derive(Debug, Default)]
pub struct Layout {
    pub offsets: Vec<i64>,
    pub labels: HashMap<String, i64>,
    pub total: i64,
}

/// Compute the byte layout of `lines`. `.set` variables accumulate in
/// order; `.if` blocks are included or skipped by their evaluated
/// condition; `.rept` bodies count once per repetition.
pub fn layout(lines: &[Line]) -> Result<Layout, SizerError> {
    let mut vars: HashMap<String, i64> = HashMap::new();
    let mut out = Layout {
        offsets: vec![0; lines.len()],
        ..Layout::default()
    };
    let mut offset = 0i64;
    let mut idx = 0usize;
    while idx < lines.len() {
        let line = &lines[idx];
        out.offsets[idx] = offset;
        if let Some(name) = line.label() {
            out.labels.insert(name.to_string(), offset);
            idx += 1;
            continue;
        }
        if let Some(name) = line.numeric_label() {
            out.labels.insert(name.to_string(), offset);
            idx += 1;
            continue;
        }
        if let Some((name, args)) = line.directive() {
            match name {
                ".set" | ".equ" => {
                    let (sym, value) = args
                        .split_once(',')
                        .ok_or(SizerError::MalformedBlock(".set"))?;
                    let value = expr::eval(value.trim(), &vars)?;
                    vars.insert(sym.trim().to_string(), value);
                    idx += 1;
                }
                ".if" => {
                    let cond = expr::eval(args, &vars)?;
                    if cond != 0 {
                        idx += 1; // size the body in place
                    } else {
                        idx = skip_block(lines, idx, ".if", ".endif")?;
                    }
                }
                ".endif" => idx += 1,
                ".rept" => {
                    let count = expr::eval(args, &vars)?.max(0);
                    let end = find_block_end(lines, idx, ".rept", ".endr")?;
                    let mut body = 0i64;
                    for (body_idx, body_line) in lines[idx + 1..end].iter().enumerate() {
                        out.offsets[idx + 1 + body_idx] = offset + body;
                        body += line_size(body_line, &vars)?;
                    }
                    offset += body * count;
                    out.offsets[end] = offset;
                    idx = end + 1;
                }
                ".endr" => return Err(SizerError::MalformedBlock(".endr")),
                _ => {
                    offset += directive_size(name, args)?;
                    idx += 1;
                }
            }
            continue;
        }
        offset += line_size(line, &vars)?;
        idx += 1;
    }
    out.total = offset;
    Ok(out)
}

fn skip_block(
    lines: &[Line],
    start: usize,
    open: &'static str,
    close: &'static str,
) -> Result<usize, SizerError> {
    let end = find_block_end(lines, start, open, close)?;
    Ok(end + 1)
}

fn find_block_end(
    lines: &[Line],
    start: usize,
    open: &'static str,
    close: &'static str,
) -> Result<usize, SizerError> {
    let mut depth = 0usize;
    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        if let Some((name, _)) = line.directive() {
            if name == open {
                depth += 1;
            } else if name == close {
                if depth == 0 {
                    return Ok(idx);
                }
                depth -= 1;
            }
        }
    }
    Err(SizerError::MalformedBlock(open))
}

/// Size of one line that is not a label and not a block directive.
pub fn line_size(line: &Line, vars: &HashMap<String, i64>) -> Result<i64, SizerError> {
    if line.is_empty() || line.is_comment() || line.is_label() {
        return Ok(0);
    }
    if let Some((name, args)) = line.directive() {
        if name == ".set" || name == ".equ" {
            return Ok(0);
        }
        return directive_size(name, args);
    }
    let _ = vars;
    match line.instr() {
        Some(ins) => instr_size(&ins),
        None => Err(SizerError::UnknownMnemonic(line.text().to_string())),
    }
}

fn directive_size(name: &str, args: &str) -> Result<i64, SizerError> {
    let arg_count = || split_operands(args).len() as i64;
    match name {
        ".byte" => Ok(arg_count()),
        ".word" | ".short" | ".hword" => Ok(2 * arg_count()),
        ".long" | ".int" => Ok(4 * arg_count()),
        ".ascii" => Ok(string_bytes(args)),
        ".asciz" | ".string" => Ok(string_bytes(args) + 1),
        ".space" | ".skip" => expr::eval(args, &HashMap::new()).map_err(Into::into),
        ".even" => Ok(1), // maximum padding
        ".align" | ".balign" => {
            let v = expr::eval(args, &HashMap::new())?;
            // Both byte-count and power-of-two readings exist in the
            // wild; take the larger padding so distances are never
            // underestimated.
            let pow = 1i64 << v.clamp(0, 6);
            Ok(pow.max(v) - 1)
        }
        ".text" | ".data" | ".bss" | ".section" | ".globl" | ".global" | ".type" | ".size"
        | ".comm" | ".lcomm" | ".local" | ".file" | ".ident" | ".extern" | ".weak" => Ok(0),
        other => Err(SizerError::UnknownDirective(other.to_string())),
    }
}

fn string_bytes(args: &str) -> i64 {
    // Count bytes inside the quotes, folding escape sequences to one.
    let mut total = 0i64;
    let mut in_string = false;
    let mut chars = args.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_string = !in_string,
            '\\' if in_string => {
                let _ = chars.next();
                total += 1;
            }
            _ if in_string => total += 1,
            _ => {}
        }
    }
    total
}

fn ea_ext(op: &Operand, size: Option<Size>) -> i64 {
    match op {
        Operand::Data(_)
        | Operand::Addr(_)
        | Operand::Indirect(_)
        | Operand::PostInc(_)
        | Operand::PreDec(_)
        | Operand::MovemList(_) => 0,
        Operand::Disp { .. }
        | Operand::Index { .. }
        | Operand::PcDisp { .. }
        | Operand::PcIndex { .. } => 2,
        Operand::Imm(_) => {
            if size == Some(Size::Long) {
                4
            } else {
                2
            }
        }
        Operand::Abs(sym) => {
            if sym.ends_with(".w") {
                2
            } else {
                4
            }
        }
    }
}

fn require(ins: &Instr, idx: usize) -> Result<&Operand, SizerError> {
    ins.operand(idx).ok_or_else(|| {
        SizerError::UnknownOperand(ins.raw.get(idx).cloned().unwrap_or_default())
    })
}

/// Encoded size of one instruction in bytes.
pub fn instr_size(ins: &Instr) -> Result<i64, SizerError> {
    let op = ins.op.as_str();
    let size = ins.size;
    match op {
        "moveq" => Ok(2),
        "move" | "movea" => Ok(2 + ea_ext(require(ins, 0)?, size) + ea_ext(require(ins, 1)?, size)),
        "movem" => {
            let mem = if require(ins, 1)?.is_memory() {
                require(ins, 1)?
            } else {
                require(ins, 0)?
            };
            Ok(4 + ea_ext(mem, size))
        }
        "lea" | "pea" => Ok(2 + ea_ext(require(ins, 0)?, size)),
        "jmp" | "jsr" => Ok(2 + ea_ext(require(ins, 0)?, size)),
        // GAS relaxes the j-pseudos to whatever fits; account for the
        // worst case so a measured distance is never too small.
        "jra" | "jbsr" => Ok(6),
        "bra" | "bsr" => Ok(if ins.short { 2 } else { 4 }),
        "dbra" => Ok(4),
        "link" => Ok(4),
        "unlk" => Ok(2),
        "rts" | "rte" | "rtr" | "nop" | "reset" | "trapv" | "illegal" | "trap" => Ok(2),
        "stop" => Ok(4),
        "exg" | "ext" | "extb" | "swap" => Ok(2),
        "addq" | "subq" => Ok(2 + ea_ext(require(ins, 1)?, size)),
        "addi" | "subi" | "cmpi" | "andi" | "ori" | "eori" => {
            let imm = if size == Some(Size::Long) { 4 } else { 2 };
            Ok(2 + imm + ea_ext(require(ins, 1)?, size))
        }
        "add" | "adda" | "addx" | "sub" | "suba" | "subx" | "and" | "or" | "eor" | "cmp"
        | "cmpa" | "cmpm" | "abcd" | "sbcd" => {
            Ok(2 + ea_ext(require(ins, 0)?, size) + ea_ext(require(ins, 1)?, size))
        }
        "mulu" | "muls" | "divu" | "divs" | "chk" => Ok(2 + ea_ext(require(ins, 0)?, size)),
        "tst" | "clr" | "neg" | "negx" | "not" | "tas" | "nbcd" => {
            Ok(2 + ea_ext(require(ins, 0)?, size))
        }
        "btst" | "bset" | "bclr" | "bchg" => {
            let imm_words = match require(ins, 0)? {
                Operand::Imm(_) => 2,
                _ => 0,
            };
            Ok(2 + imm_words + ea_ext(require(ins, 1)?, size))
        }
        "asl" | "asr" | "lsl" | "lsr" | "rol" | "ror" | "roxl" | "roxr" => {
            if ins.operand_count() == 1 {
                Ok(2 + ea_ext(require(ins, 0)?, size))
            } else {
                Ok(2)
            }
        }
        op => {
            if let Some(cc) = op.strip_prefix("db") {
                if core_line::usage::is_condition_code(cc) {
                    return Ok(4);
                }
            }
            if let Some(cc) = op.strip_prefix('b') {
                if core_line::usage::is_condition_code(cc) {
                    return Ok(if ins.short { 2 } else { 4 });
                }
            }
            if let Some(cc) = op.strip_prefix('j') {
                if core_line::usage::is_condition_code(cc) {
                    return Ok(6);
                }
            }
            if let Some(cc) = op.strip_prefix('s') {
                if core_line::usage::is_condition_code(cc) {
                    return Ok(2 + ea_ext(require(ins, 0)?, size));
                }
            }
            Err(SizerError::UnknownMnemonic(op.to_string()))
        }
    }
}
