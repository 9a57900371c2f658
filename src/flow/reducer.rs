//! The statement reducer (`spec.md` §4.6): an algebraic fixed-point
//! rewriter over the reduced stream lowering produces.
//!
//! One listed rule is deliberately NOT implemented here: `dealloc use_ →
//! dealloc ;`. `spec.md` §4.7 witness 6 ("a `dealloc ; use_` pair anywhere →
//! use-after-free at the `use_`") needs that exact adjacency to survive into
//! `crate::flow::leak`, which runs after this reducer. Collapsing it here
//! would delete the evidence before the leak engine ever saw it, so the
//! collapse-after-reporting only happens conceptually, not as a stream edit.
//! Likewise a reduced-level switch-to-if pass is skipped: [`ReducedKind`]
//! carries no case-label value (`spec.md` §3's data model doesn't give
//! `Case` one either), so there is nothing to build an `if (cond == label)`
//! chain from at this layer — that rewrite belongs to, and is implemented
//! in, the token-level simplifier (`crate::simplifier::switch_to_if`).

use crate::flow::reduced::{ReducedKind, ReducedStmt};

const MAX_ITERATIONS: usize = 200;

/// Runs every conservative reduction rule to a fixed point.
#[must_use]
pub fn reduce(stream: Vec<ReducedStmt>) -> Vec<ReducedStmt> {
    reduce_inner(stream, false)
}

/// As [`reduce`], plus the "show-all" aggressive rules (`spec.md` §4.6):
/// an `if` immediately followed by `alloc` with no `else` has its condition
/// dropped, trading soundness for recall (`PossibleError` severity
/// downstream, per `spec.md` §7).
#[must_use]
pub fn reduce_show_all(stream: Vec<ReducedStmt>) -> Vec<ReducedStmt> {
    reduce_inner(stream, true)
}

fn reduce_inner(mut stream: Vec<ReducedStmt>, show_all: bool) -> Vec<ReducedStmt> {
    expand_realloc(&mut stream);
    let mut iterations = 0;
    loop {
        iterations += 1;
        let mut changed = false;
        changed |= remove_empty_blocks(&mut stream);
        changed |= collapse_single_statement_blocks(&mut stream);
        changed |= collapse_empty_if(&mut stream);
        changed |= collapse_identical_branches(&mut stream);
        changed |= truncate_unreachable_code(&mut stream);
        changed |= collapse_loop_if_break(&mut stream);
        changed |= collapse_alloc_dealloc_alloc(&mut stream);
        changed |= collapse_duplicate_case(&mut stream);
        if show_all {
            changed |= drop_unconditional_alloc_if(&mut stream);
        }
        if !changed || iterations >= MAX_ITERATIONS {
            break;
        }
    }
    stream
}

fn expand_realloc(stream: &mut Vec<ReducedStmt>) {
    let mut i = 0;
    while i < stream.len() {
        if let ReducedKind::Realloc(kind) = stream[i].kind {
            let var = stream[i].var;
            let origin = stream[i].origin;
            stream.splice(
                i..=i,
                [ReducedStmt::new(ReducedKind::Dealloc(kind), var, origin), ReducedStmt::new(ReducedKind::Alloc(kind), var, origin)],
            );
            i += 2;
        } else {
            i += 1;
        }
    }
}

/// `{ }` → nothing.
fn remove_empty_blocks(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i + 1 < stream.len() {
        if matches!(stream[i].kind, ReducedKind::OpenBrace) && matches!(stream[i + 1].kind, ReducedKind::CloseBrace) {
            stream.drain(i..=i + 1);
            changed = true;
            continue;
        }
        i += 1;
    }
    changed
}

/// `{ X }` with exactly one statement inside → `X`.
fn collapse_single_statement_blocks(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i + 2 < stream.len() {
        if matches!(stream[i].kind, ReducedKind::OpenBrace)
            && matches!(stream[i + 2].kind, ReducedKind::CloseBrace)
            && !matches!(stream[i + 1].kind, ReducedKind::OpenBrace | ReducedKind::CloseBrace)
        {
            stream.remove(i + 2);
            stream.remove(i);
            changed = true;
            continue;
        }
        i += 1;
    }
    changed
}

fn is_control_header(kind: &ReducedKind) -> bool {
    matches!(
        kind,
        ReducedKind::If
            | ReducedKind::IfVar
            | ReducedKind::IfNotVar
            | ReducedKind::IfValueDependent
    )
}

/// `if (...) { }` with no following `else` → removed entirely (a dead
/// condition with no effect either way).
fn collapse_empty_if(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < stream.len() {
        if is_control_header(&stream[i].kind) {
            let body_empty = stream.get(i + 1).is_some_and(|s| matches!(s.kind, ReducedKind::OpenBrace))
                && stream.get(i + 2).is_some_and(|s| matches!(s.kind, ReducedKind::CloseBrace));
            let followed_by_else = stream.get(i + 3).is_some_and(|s| matches!(s.kind, ReducedKind::Else));
            if body_empty && !followed_by_else {
                stream.drain(i..=i + 2);
                changed = true;
                continue;
            }
            // `if ; else S` → `S` when the then-branch is empty.
            if body_empty && followed_by_else {
                stream.drain(i..=i + 3); // if, {, }, else
                changed = true;
                continue;
            }
        }
        i += 1;
    }
    changed
}

/// `if X else X` (identical single-statement branches) → `X`.
fn collapse_identical_branches(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < stream.len() {
        if is_control_header(&stream[i].kind) {
            if let Some(shape) = single_stmt_branch(stream, i + 1) {
                let (then_stmt, then_len) = shape;
                let else_idx = i + 1 + then_len;
                if stream.get(else_idx).is_some_and(|s| matches!(s.kind, ReducedKind::Else)) {
                    if let Some((else_stmt, else_len)) = single_stmt_branch(stream, else_idx + 1) {
                        if else_stmt.kind == then_stmt.kind && else_stmt.var == then_stmt.var {
                            let end = else_idx + else_len;
                            stream.drain(i..=end);
                            stream.insert(i, then_stmt);
                            changed = true;
                            continue;
                        }
                    }
                }
            }
        }
        i += 1;
    }
    changed
}

/// If position `at` holds a `{ X }` or a bare `X`, returns `(X, consumed_len)`.
fn single_stmt_branch(stream: &[ReducedStmt], at: usize) -> Option<(ReducedStmt, usize)> {
    if matches!(stream.get(at)?.kind, ReducedKind::OpenBrace) {
        if matches!(stream.get(at + 2)?.kind, ReducedKind::CloseBrace)
            && !matches!(stream[at + 1].kind, ReducedKind::OpenBrace)
        {
            return Some((stream[at + 1].clone(), 3));
        }
        return None;
    }
    if is_control_header(&stream.get(at)?.kind) || matches!(stream[at].kind, ReducedKind::Else) {
        return None;
    }
    Some((stream[at].clone(), 1))
}

/// Deletes statements between an unconditional exit (`Return`, `ReturnUse`,
/// `Exit`, `Break`, `Continue`) and the next block boundary (`CloseBrace`,
/// `Else`, `Case`, `Default`) — unreachable code.
fn truncate_unreachable_code(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < stream.len() {
        let is_exit = matches!(
            stream[i].kind,
            ReducedKind::Return | ReducedKind::ReturnUse | ReducedKind::Exit | ReducedKind::Break | ReducedKind::Continue
        );
        if is_exit {
            let mut j = i + 1;
            while j < stream.len()
                && !matches!(
                    stream[j].kind,
                    ReducedKind::CloseBrace | ReducedKind::Else | ReducedKind::Case | ReducedKind::Default
                )
            {
                j += 1;
            }
            if j > i + 1 {
                stream.drain(i + 1..j);
                changed = true;
            }
        }
        i += 1;
    }
    changed
}

/// `loop { if break ; }` → removed (no side effect); `loop { alloc ; if
/// break ; }` → `alloc ;` (the loop body runs exactly once).
fn collapse_loop_if_break(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < stream.len() {
        if matches!(stream[i].kind, ReducedKind::Loop) {
            if let Some(end) = loop_body_is_single_pass_break(stream, i) {
                let body_start = i + 2; // past Loop, OpenBrace
                let preserved: Vec<ReducedStmt> = stream[body_start..end]
                    .iter()
                    .filter(|s| !is_control_header(&s.kind) && !matches!(s.kind, ReducedKind::Break))
                    .cloned()
                    .collect();
                let block_end = end + 3; // past If, Break, CloseBrace
                stream.splice(i..block_end.min(stream.len()), preserved);
                changed = true;
                continue;
            }
        }
        i += 1;
    }
    changed
}

/// Recognizes `Loop OpenBrace [Alloc] If Break CloseBrace` and returns the
/// index of the `If` token, or `None` if the loop body doesn't have that
/// exact shape.
fn loop_body_is_single_pass_break(stream: &[ReducedStmt], loop_idx: usize) -> Option<usize> {
    if !matches!(stream.get(loop_idx + 1)?.kind, ReducedKind::OpenBrace) {
        return None;
    }
    let mut idx = loop_idx + 2;
    // Zero or one leading non-control statement (e.g. `alloc`).
    if idx < stream.len() && !is_control_header(&stream[idx].kind) && !matches!(stream[idx].kind, ReducedKind::CloseBrace) {
        idx += 1;
    }
    if !is_control_header(&stream.get(idx)?.kind) {
        return None;
    }
    let if_idx = idx;
    idx += 1;
    if !matches!(stream.get(idx)?.kind, ReducedKind::Break) {
        return None;
    }
    idx += 1;
    if !matches!(stream.get(idx)?.kind, ReducedKind::CloseBrace) {
        return None;
    }
    Some(if_idx)
}

/// `alloc ; dealloc ; alloc ;` (same variable) → `alloc ;`.
fn collapse_alloc_dealloc_alloc(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i + 2 < stream.len() {
        let (a, b, c) = (&stream[i], &stream[i + 1], &stream[i + 2]);
        if a.is_alloc() && b.is_dealloc() && c.is_alloc() && a.var == b.var && b.var == c.var {
            let keep = stream[i + 2].clone();
            stream.splice(i..=i + 2, [keep]);
            changed = true;
            continue;
        }
        i += 1;
    }
    changed
}

/// Adjacent `case ; case ;` (empty fallthrough) → `case ;`.
fn collapse_duplicate_case(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i + 1 < stream.len() {
        if matches!(stream[i].kind, ReducedKind::Case) && matches!(stream[i + 1].kind, ReducedKind::Case) {
            stream.remove(i);
            changed = true;
            continue;
        }
        i += 1;
    }
    changed
}

/// Show-all only: `if alloc ;` not followed by `else` drops the condition,
/// keeping just the `alloc` — a conservative over-approximation.
fn drop_unconditional_alloc_if(stream: &mut Vec<ReducedStmt>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < stream.len() {
        if is_control_header(&stream[i].kind) {
            if let Some(next) = stream.get(i + 1) {
                if next.is_alloc() && !stream.get(i + 2).is_some_and(|s| matches!(s.kind, ReducedKind::Else)) {
                    stream.remove(i);
                    changed = true;
                    continue;
                }
            }
        }
        i += 1;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::reduced::AllocKind;
    use crate::token::{TokenId, VarId};

    fn s(kind: ReducedKind) -> ReducedStmt {
        ReducedStmt::new(kind, VarId(1), TokenId(0))
    }

    #[test]
    fn if_empty_else_x_reduces_to_x() {
        let stream = vec![s(ReducedKind::If), s(ReducedKind::OpenBrace), s(ReducedKind::CloseBrace), s(ReducedKind::Else), s(ReducedKind::Use)];
        let result = reduce(stream);
        assert_eq!(result, vec![s(ReducedKind::Use)]);
    }

    #[test]
    fn alloc_dealloc_alloc_reduces_to_alloc() {
        let stream = vec![
            s(ReducedKind::Alloc(AllocKind::HeapScalar)),
            s(ReducedKind::Dealloc(AllocKind::HeapScalar)),
            s(ReducedKind::Alloc(AllocKind::HeapScalar)),
        ];
        let result = reduce(stream);
        assert_eq!(result, vec![s(ReducedKind::Alloc(AllocKind::HeapScalar))]);
    }

    #[test]
    fn realloc_expands_to_dealloc_then_alloc() {
        let stream = vec![s(ReducedKind::Realloc(AllocKind::HeapScalar))];
        let result = reduce(stream);
        assert_eq!(
            result,
            vec![s(ReducedKind::Dealloc(AllocKind::HeapScalar)), s(ReducedKind::Alloc(AllocKind::HeapScalar))]
        );
    }

    #[test]
    fn loop_if_break_with_no_alloc_vanishes() {
        let stream = vec![s(ReducedKind::Loop), s(ReducedKind::OpenBrace), s(ReducedKind::If), s(ReducedKind::Break), s(ReducedKind::CloseBrace)];
        let result = reduce(stream);
        assert!(result.is_empty());
    }

    #[test]
    fn loop_alloc_if_break_keeps_the_alloc_without_the_loop() {
        let stream = vec![
            s(ReducedKind::Loop),
            s(ReducedKind::OpenBrace),
            s(ReducedKind::Alloc(AllocKind::HeapScalar)),
            s(ReducedKind::If),
            s(ReducedKind::Break),
            s(ReducedKind::CloseBrace),
        ];
        let result = reduce(stream);
        assert_eq!(result, vec![s(ReducedKind::Alloc(AllocKind::HeapScalar))]);
    }

    #[test]
    fn unreachable_code_after_return_is_dropped() {
        let stream = vec![s(ReducedKind::Return), s(ReducedKind::Use), s(ReducedKind::CloseBrace)];
        let result = reduce(stream);
        assert_eq!(result, vec![s(ReducedKind::Return), s(ReducedKind::CloseBrace)]);
    }

    #[test]
    fn reducer_is_idempotent() {
        let stream = vec![
            s(ReducedKind::If),
            s(ReducedKind::OpenBrace),
            s(ReducedKind::Use),
            s(ReducedKind::CloseBrace),
        ];
        let once = reduce(stream.clone());
        let twice = reduce(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn show_all_drops_unconditional_alloc_if_condition() {
        let stream = vec![s(ReducedKind::If), s(ReducedKind::Alloc(AllocKind::HeapScalar))];
        let result = reduce_show_all(stream);
        assert_eq!(result, vec![s(ReducedKind::Alloc(AllocKind::HeapScalar))]);
    }
}
