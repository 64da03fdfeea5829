//! End-to-end scenarios: literal inputs through the full two-pass driver.

use core_config::OptimizerConfig;
use core_driver::optimize;

fn run(source: &str) -> String {
    optimize(source, &OptimizerConfig::default()).text
}

fn run_with(source: &str, tweak: impl FnOnce(&mut OptimizerConfig)) -> String {
    let mut cfg = OptimizerConfig::default();
    tweak(&mut cfg);
    cfg.validate();
    optimize(source, &cfg).text
}

fn func(body: &[&str]) -> String {
    let mut s = String::from("\t.text\n\t.globl f\n\t.type f,@function\nf:\n");
    for line in body {
        s.push('\t');
        s.push_str(line);
        s.push('\n');
    }
    s.push_str("\t.size f,.-f\n");
    s
}

#[test]
fn immediate_materialization() {
    let out = run(&func(&["move.l #0,%d0", "rts"]));
    assert!(out.contains("moveq #0,%d0"), "{out}");
    assert!(!out.contains("move.l #0,%d0"), "{out}");
}

#[test]
fn materialization_by_negation() {
    let out = run(&func(&["move.l #200,%d1", "rts"]));
    assert!(out.contains("moveq #55,%d1"), "{out}");
    assert!(out.contains("not.b %d1"), "{out}");
}

#[test]
fn constant_multiply_low_word() {
    let out = run(&func(&["mulu.w #10,%d2", "rts"]));
    // Doubling chain through a scratch register.
    assert!(out.contains("move.w %d2,%d3"), "{out}");
    assert_eq!(out.matches("add.w %d2,%d2").count(), 3, "{out}");
    assert!(out.contains("add.w %d3,%d2"), "{out}");
    assert!(!out.contains("mulu"), "{out}");
    // The scratch register is saved around the function body.
    assert!(out.contains("%d3,-(%sp)"), "{out}");
    assert!(out.contains("(%sp)+,%d3"), "{out}");
}

#[test]
fn range_test_by_address_comparison() {
    let out = run(&func(&[
        "cmp.l #-32768,%a3",
        "blt .L1",
        "cmp.l #32767,%a3",
        "bgt .L1",
        "moveq #1,%d0",
        ".L1:",
        "rts",
    ]));
    assert!(out.contains("cmpa.w %a3,%a3"), "{out}");
    assert!(out.contains("bne"), "{out}");
    assert!(!out.contains("cmp.l"), "{out}");
}

#[test]
fn movem_single_register_load() {
    let out = run(&func(&["movem.w 8(%a0),%d4", "rts"]));
    assert!(out.contains("move.w 8(%a0),%d4"), "{out}");
    assert!(out.contains("ext.l %d4"), "{out}");
}

#[test]
fn branch_shortening() {
    let mut body = vec!["bra .L1"];
    // 5 x 6-byte instructions: the target sits ~34 bytes in, well within
    // short range.
    for _ in 0..5 {
        body.push("move.l #70000,%d0");
    }
    body.push(".L1:");
    body.push("rts");
    let out = run(&func(&body));
    assert!(out.contains("bra.s .L1"), "{out}");
}

#[test]
fn branch_beyond_short_range_stays_long() {
    let mut body = vec!["bra .L1"];
    for _ in 0..40 {
        body.push("move.l #70000,%d0");
    }
    body.push(".L1:");
    body.push("rts");
    let out = run(&func(&body));
    assert!(out.contains("bra .L1"), "{out}");
    assert!(!out.contains("bra.s"), "{out}");
}

#[test]
fn tail_recursion() {
    let out = run(&func(&["jsr foo", "rts"]));
    assert!(out.contains("jmp foo"), "{out}");
    assert!(!out.contains("jsr foo"), "{out}");
    assert!(!out.contains("rts"), "{out}");
}

#[test]
fn bsr_chain_becomes_pea() {
    let out = run(&func(&["bsr f1", "bsr f2", "bsr f3", "rts"]));
    assert!(out.contains("pea f3"), "{out}");
    assert!(out.contains("pea f2"), "{out}");
    assert!(out.contains("bra f1"), "{out}");
}

#[test]
fn push_run_coalesces_into_movem() {
    let out = run(&func(&[
        "move.l %d4,-(%sp)",
        "move.l %d3,-(%sp)",
        "move.l %d2,-(%sp)",
        "jsr foo",
        "movem.l (%sp)+,%d2-%d4",
        "rts",
    ]));
    assert!(out.contains("movem.l %d2-%d4,-(%sp)"), "{out}");
}

#[test]
fn stride_loads_coalesce() {
    let out = run(&func(&[
        "move.l (%a0),%d2",
        "move.l 4(%a0),%d3",
        "move.l 8(%a0),%d4",
        "jsr foo",
        "rts",
    ]));
    assert!(out.contains("movem.l (%a0),%d2-%d4"), "{out}");
}

#[test]
fn stride_gap_is_bridged_with_a_free_register() {
    let out = run(&func(&[
        "move.l (%a1),%d2",
        "move.l 8(%a1),%d5",
        "jsr foo",
        "rts",
    ]));
    assert!(out.contains("movem.l (%a1),%d2-%d3/%d5"), "{out}");
    // The bridging register is callee-saved, so it gets pushed/popped.
    assert!(out.contains("%d3,-(%sp)"), "{out}");
    assert!(out.contains("(%sp)+,%d3"), "{out}");
}

#[test]
fn direct_call_substitution_cascades_into_tail_call() {
    let out = run_with(
        &func(&["move.l #frob,%a0", "jsr (%a0)", "rts"]),
        |cfg| cfg.use_replace_load_subroutine_into_an_by_direct_call = true,
    );
    assert!(out.contains("jmp frob"), "{out}");
    assert!(!out.contains("(%a0)"), "{out}");
}

#[test]
fn zero_pair_drops_dead_clears() {
    let out = run(&func(&[
        "moveq #0,%d3",
        "move.w %d1,%d3",
        "swap %d3",
        "clr.w %d3",
        "move.w %d2,%d3",
        "move.l %d3,(%a0)",
        "rts",
    ]));
    assert!(!out.contains("moveq #0,%d3"), "{out}");
    assert!(!out.contains("clr.w %d3"), "{out}");
    assert_eq!(out.matches("swap %d3").count(), 1, "{out}");
}

#[test]
fn aggressive_push_compaction() {
    let out = run_with(
        &func(&[
            "move.w %d1,-(%sp)",
            "subq.l #2,%sp",
            "move.w %d2,-(%sp)",
            "subq.l #2,%sp",
            "jsr foo",
            "addq.l #8,%sp",
            "rts",
        ]),
        |cfg| cfg.use_aggressive_compact_two_words_push = true,
    );
    assert!(out.contains("subq.l #8,%sp"), "{out}");
    assert!(out.contains("move.w %d1,6(%sp)"), "{out}");
    assert!(out.contains("move.w %d2,2(%sp)"), "{out}");
}

#[test]
fn tas_on_io_memory() {
    let out = run_with(
        &func(&["bset.b #7,ioreg", "beq .L1", ".L1:", "rts"]),
        |cfg| cfg.use_tas_on_io_memory = true,
    );
    assert!(out.contains("tas ioreg"), "{out}");
    assert!(out.contains("bpl"), "{out}");
}

#[test]
fn quick_arithmetic_and_division() {
    let out = run(&func(&["add.l #4,%d0", "divu.w #8,%d3", "rts"]));
    assert!(out.contains("addq.l #4,%d0"), "{out}");
    assert!(out.contains("lsr.w #3,%d3"), "{out}");
}

#[test]
fn addq_long_on_address_register_shrinks_when_enabled() {
    let body = func(&["addq.l #1,%a2", "rts"]);
    let default_out = run(&body);
    assert!(default_out.contains("addq.l #1,%a2"), "{default_out}");
    let out = run_with(&body, |cfg| {
        cfg.use_replace_addql_subql_by_addqw_subqw = true;
    });
    assert!(out.contains("addq.w #1,%a2"), "{out}");
}

#[test]
fn clear_before_word_move_is_gated() {
    let body = func(&["moveq #0,%d0", "move.w %d1,%d0", "rts"]);
    let default_out = run(&body);
    assert!(default_out.contains("moveq #0,%d0"), "{default_out}");
    let out = run_with(&body, |cfg| {
        cfg.use_aggressive_avoid_clear_before_move_word = true;
    });
    assert!(!out.contains("moveq #0,%d0"), "{out}");
    assert!(out.contains("move.w %d1,%d0"), "{out}");
}

#[test]
fn normalization_applies() {
    let out = run(&func(&["move.l 8(%fp),%d0", "jsr (frob)", "rts"]));
    assert!(out.contains("8(%a6)"), "{out}");
    assert!(out.contains("jsr frob") || out.contains("jmp frob"), "{out}");
}

#[test]
fn optimizer_is_idempotent() {
    let source = {
        let mut s = String::new();
        s.push_str(&func(&[
            "move.l #0,%d0",
            "move.l #200,%d1",
            "mulu.w #10,%d2",
            "cmp.l #0,%d4",
            "beq .L1",
            "move.l %d4,-(%sp)",
            "move.l %d3,-(%sp)",
            "jsr foo",
            "addq.l #8,%sp",
            ".L1:",
            "rts",
        ]));
        s.push_str("\t.globl g\n\t.type g,@function\ng:\n");
        s.push_str("\tjsr foo\n\trts\n");
        s.push_str("\t.size g,.-g\n");
        s
    };
    let once = run(&source);
    let twice = run(&once);
    assert_eq!(once, twice);
}

#[test]
fn stack_pushes_stay_balanced() {
    let out = run(&func(&["mulu.w #10,%d2", "rts"]));
    let pushes = out.matches(",-(%sp)").count();
    let pops = out.matches("(%sp)+").count();
    assert_eq!(pushes, pops, "{out}");
}

#[test]
fn comments_and_app_blocks_survive() {
    let source = "#APP\n\tmove.l #0,%d0\n#NO_APP\n\t.text\n";
    let out = run(source);
    assert!(out.contains("#APP"));
    assert!(out.contains("move.l #0,%d0"));
    assert!(out.contains("#NO_APP"));
}
