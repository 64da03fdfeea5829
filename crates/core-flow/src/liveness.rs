//! The two register liveness queries. Both walk forward from the current
//! scan point over the concatenation of emitted and pending lines, with a
//! visited-label set to break loops and a return-frame stack to resume the
//! fall-through path of conditional branches. Both are hints, not proofs:
//! callers gate value-visible rewrites behind the aggressive flags.

use std::collections::HashSet;

use core_line::{classify, flow_kind, AsmBuf, FlowKind, Reg, RegSet, TailGuard};
use tracing::trace;

use crate::map::ControlFlowMap;

/// Walk-step budget; a loop-dense function cannot stall a query.
const MAX_STEPS: usize = 50_000;

/// True when the function enclosing the region terminates with `rte`:
/// interrupt handlers preserve even the scratch-pad registers and calls
/// inside them are treated as transparent.
pub fn region_is_interrupt(buf: &AsmBuf, map: &ControlFlowMap) -> bool {
    (map.func_start..map.func_end).any(|idx| {
        buf.line(idx)
            .instr()
            .is_some_and(|ins| ins.op == "rte")
    })
}

/// Find registers of `class` free for use at the current scan point,
/// excluding `excludes`. A register is free when at least one complete
/// path reaches a definite overwrite before any read, and no explored path
/// reads it first. The last `window` emitted lines (the ones a rule is
/// about to replace) are neutralized for the duration of the query.
///
/// Returns candidates ordered d0..d7 then a0..a6.
pub fn find_free_after_use(
    buf: &mut AsmBuf,
    window: usize,
    class: RegSet,
    excludes: RegSet,
) -> Vec<Reg> {
    let guard = TailGuard::neutralize(buf, window);
    let buf = guard.buf();
    let map = ControlFlowMap::build(buf);
    let interrupt = region_is_interrupt(buf, &map);
    let initial = class
        .difference(excludes)
        .difference(RegSet::single(Reg::A7));
    if initial.is_empty() {
        return Vec::new();
    }

    let mut confirmed = RegSet::EMPTY;
    let mut eliminated = RegSet::EMPTY;
    let mut visited: HashSet<String> = HashSet::new();
    let mut frames: Vec<(usize, RegSet)> = vec![(buf.cursor(), initial)];
    let mut steps = 0usize;

    while let Some((start, start_alive)) = frames.pop() {
        let mut pos = start;
        let mut alive = start_alive;
        loop {
            steps += 1;
            if steps > MAX_STEPS {
                eliminated = eliminated.union(alive);
                break;
            }
            if pos >= map.func_end || pos >= buf.len() {
                break;
            }
            let line = buf.line(pos);
            if let Some(usage) = classify(line) {
                let reads = usage.reads.intersect(alive);
                if !reads.is_empty() {
                    eliminated = eliminated.union(reads);
                    alive = alive.difference(reads);
                }
                let writes = usage.overwrites.intersect(alive);
                if !writes.is_empty() {
                    confirmed = confirmed.union(writes);
                    alive = alive.difference(writes);
                }
            }
            if alive.is_empty() {
                break;
            }
            match flow_kind(line) {
                FlowKind::Return | FlowKind::FunctionEnd => {
                    // A candidate that reaches the return unread is usable
                    // provided the caller commits it through the frame
                    // maintainer, which restores it before this point.
                    // Scratch registers may carry the return value, so
                    // they stay unconfirmed here.
                    let saveable = if interrupt {
                        alive
                    } else {
                        alive.difference(RegSet::SCRATCH)
                    };
                    confirmed = confirmed.union(saveable);
                    break;
                }
                FlowKind::Goto { target } => {
                    match target.as_deref().and_then(|t| map.def(t)) {
                        Some(def) => {
                            let name = target.unwrap();
                            if visited.insert(name) {
                                pos = def;
                                continue;
                            }
                            break;
                        }
                        None => {
                            // Cannot follow: all paths may reach anywhere.
                            eliminated = eliminated.union(alive);
                            break;
                        }
                    }
                }
                FlowKind::Branch { target } => match map.def(&target) {
                    Some(def) => {
                        if visited.insert(target) {
                            frames.push((pos + 1, alive));
                            pos = def;
                            continue;
                        }
                        pos += 1;
                        continue;
                    }
                    None => {
                        eliminated = eliminated.union(alive);
                        break;
                    }
                },
                FlowKind::Call { .. } => {
                    if !interrupt {
                        // Scratch-pad registers are callee-clobbered and
                        // carry no arguments; their current value is dead.
                        let scratch = alive.intersect(RegSet::SCRATCH);
                        confirmed = confirmed.union(scratch);
                        alive = alive.difference(scratch);
                        if alive.is_empty() {
                            break;
                        }
                    }
                    pos += 1;
                }
                FlowKind::Label(_) | FlowKind::Other => pos += 1,
            }
        }
    }

    let free = confirmed.difference(eliminated);
    trace!(
        target: "flow",
        free = ?free.iter().collect::<Vec<_>>(),
        eliminated = ?eliminated.iter().collect::<Vec<_>>(),
        "find_free_after_use"
    );
    free.iter().collect()
}

/// Is `reg` read on some path from the current scan point before being
/// definitely overwritten? Ambiguous control flow answers `true`. At a
/// return, callee-saved registers answer `true` (the caller relies on
/// them); scratch-pad registers answer `false` in ordinary routines.
pub fn used_before_overwritten(buf: &mut AsmBuf, window: usize, reg: Reg) -> bool {
    let guard = TailGuard::neutralize(buf, window);
    let buf = guard.buf();
    let map = ControlFlowMap::build(buf);
    let interrupt = region_is_interrupt(buf, &map);

    let mut visited: HashSet<String> = HashSet::new();
    let mut frames: Vec<usize> = vec![buf.cursor()];
    let mut steps = 0usize;

    while let Some(start) = frames.pop() {
        let mut pos = start;
        loop {
            steps += 1;
            if steps > MAX_STEPS {
                return true;
            }
            if pos >= map.func_end || pos >= buf.len() {
                // Fell off the region without a return: keep the safe
                // answer for callee-saved registers.
                if !reg.is_scratch() || interrupt {
                    return true;
                }
                break;
            }
            let line = buf.line(pos);
            if let Some(usage) = classify(line) {
                if usage.reads.contains(reg) {
                    return true;
                }
                if usage.overwrites.contains(reg) {
                    break;
                }
            }
            match flow_kind(line) {
                FlowKind::Return | FlowKind::FunctionEnd => {
                    if !reg.is_scratch() || interrupt {
                        return true;
                    }
                    break;
                }
                FlowKind::Goto { target } => match target.as_deref().and_then(|t| map.def(t)) {
                    Some(def) => {
                        let name = target.unwrap();
                        if visited.insert(name) {
                            pos = def;
                            continue;
                        }
                        break;
                    }
                    None => return true,
                },
                FlowKind::Branch { target } => match map.def(&target) {
                    Some(def) => {
                        if visited.insert(target) {
                            frames.push(pos + 1);
                            pos = def;
                            continue;
                        }
                        pos += 1;
                        continue;
                    }
                    None => return true,
                },
                FlowKind::Call { .. } => {
                    if !interrupt && reg.is_scratch() {
                        // Callee-clobbered: the current value is dead past
                        // the call on this path.
                        break;
                    }
                    pos += 1;
                }
                FlowKind::Label(_) | FlowKind::Other => pos += 1,
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_line::Line;

    fn buf(lines: &[&str], cursor: usize) -> AsmBuf {
        let mut b = AsmBuf::load(lines.iter().map(|l| Line::new(*l)).collect());
        b.set_cursor(cursor);
        b
    }

    #[test]
    fn overwritten_register_is_free() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "move.l %d0,%d1",
                "moveq #0,%d2",
                "move.l %d2,%d3",
                "rts",
                ".size f,.-f",
            ],
            3, // query point before `moveq #0,%d2`
        );
        let free = find_free_after_use(&mut b, 0, RegSet::DATA, RegSet::EMPTY);
        // d2 is overwritten before any read; d3 likewise.
        assert!(free.contains(&Reg::D2));
        assert!(free.contains(&Reg::D3));
        // Scratch d1 reaches rts without an overwrite: it may carry the
        // return value, so it stays unconfirmed.
        assert!(!free.contains(&Reg::D1));
        // Callee-saved d4 is reportable: committing it saves/restores it.
        assert!(free.contains(&Reg::D4));
    }

    #[test]
    fn read_before_overwrite_eliminates() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "move.l %d2,%d3",
                "moveq #0,%d2",
                "rts",
                ".size f,.-f",
            ],
            2,
        );
        let free = find_free_after_use(&mut b, 0, RegSet::DATA, RegSet::EMPTY);
        assert!(!free.contains(&Reg::D2), "read at cursor comes first");
        assert!(free.contains(&Reg::D3));
    }

    #[test]
    fn both_branch_arms_must_agree() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "bne .L1",
                "move.l %d4,%d0",
                ".L1:",
                "moveq #1,%d4",
                "rts",
                ".size f,.-f",
            ],
            2,
        );
        let free = find_free_after_use(&mut b, 0, RegSet::DATA, RegSet::EMPTY);
        // d4 is read on the fall-through arm even though the target arm
        // overwrites it.
        assert!(!free.contains(&Reg::D4));
    }

    #[test]
    fn computed_jump_is_worst_case() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "jmp (%a0)",
                "moveq #0,%d5",
                "rts",
                ".size f,.-f",
            ],
            2,
        );
        let free = find_free_after_use(&mut b, 0, RegSet::DATA, RegSet::EMPTY);
        assert!(free.is_empty());
    }

    #[test]
    fn call_confirms_scratch() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "jsr helper",
                "rts",
                ".size f,.-f",
            ],
            2,
        );
        let free = find_free_after_use(&mut b, 0, RegSet::DATA, RegSet::EMPTY);
        // d0/d1 are dead across the call; d2..d7 are reportable via the
        // save/restore commitment at the return.
        assert!(free.contains(&Reg::D0));
        assert!(free.contains(&Reg::D1));
        assert!(free.contains(&Reg::D2));
    }

    #[test]
    fn used_query_sees_reads_and_writes() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "add.l %d3,%d4",
                "rts",
                ".size f,.-f",
            ],
            2,
        );
        assert!(used_before_overwritten(&mut b, 0, Reg::D3));
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "moveq #9,%d3",
                "rts",
                ".size f,.-f",
            ],
            2,
        );
        assert!(!used_before_overwritten(&mut b, 0, Reg::D3));
    }

    #[test]
    fn callee_saved_is_used_at_return() {
        let mut b = buf(
            &[".type f,@function", "f:", "rts", ".size f,.-f"],
            2,
        );
        assert!(used_before_overwritten(&mut b, 0, Reg::D2));
        assert!(!used_before_overwritten(&mut b, 0, Reg::D1));
    }

    #[test]
    fn neutralized_window_is_ignored() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "move.l %d5,%d0",
                "moveq #0,%d5",
                "rts",
                ".size f,.-f",
            ],
            3,
        );
        // Without neutralization the emitted `move.l %d5,%d0` would not
        // matter anyway (it is behind the cursor); the guard must restore
        // text afterwards.
        let before = b.line(2).text().to_string();
        let _ = find_free_after_use(&mut b, 1, RegSet::DATA, RegSet::EMPTY);
        assert_eq!(b.line(2).text(), before);
    }
}
