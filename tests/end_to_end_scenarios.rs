//! The ten end-to-end scenarios from the runtime's testable-properties
//! table: one source program each, run to a known return value or error
//! kind.

use std::collections::HashMap;

use monty::{CollectPrint, ExcType, Object, Program, ResourceLimits};

fn run_no_inputs(source: &str) -> Result<Object, monty::Exception> {
    Program::new(source, Vec::<String>::new(), Vec::<String>::new())
        .unwrap()
        .run(None, None, None, None)
}

#[test]
fn division_by_zero_raises_zero_division_error() {
    let err = run_no_inputs("1 / 0").unwrap_err();
    assert_eq!(err.kind, ExcType::ZeroDivisionError);
}

#[test]
fn declared_inputs_are_bound_by_name() {
    let program = Program::new("x * 2 + y", ["x", "y"], Vec::<String>::new()).unwrap();
    let mut inputs = HashMap::new();
    inputs.insert("x".to_owned(), Object::Int(5));
    inputs.insert("y".to_owned(), Object::Int(3));
    let result = program.run(Some(inputs), None, None, None).unwrap();
    assert_eq!(result, Object::Int(13));
}

#[test]
fn try_except_catches_zero_division_error() {
    let source = "try:\n 1/0\nexcept ZeroDivisionError:\n result='caught'\nresult";
    let result = run_no_inputs(source).unwrap();
    assert_eq!(result, Object::Str("caught".to_owned()));
}

#[test]
fn recursion_within_the_configured_depth_succeeds() {
    let source = "def f(n):\n if n<=0: return 0\n return 1+f(n-1)\nf(5)";
    let program = Program::new(source, Vec::<String>::new(), Vec::<String>::new()).unwrap();
    let limits = ResourceLimits { max_recursion_depth: Some(100), ..Default::default() };
    let result = program.run(None, None, None, Some(limits)).unwrap();
    assert_eq!(result, Object::Int(5));
}

#[test]
fn recursion_past_the_configured_depth_raises_recursion_error() {
    let source = "def f(n):\n if n<=0: return 0\n return 1+f(n-1)\nf(10)";
    let program = Program::new(source, Vec::<String>::new(), Vec::<String>::new()).unwrap();
    let limits = ResourceLimits { max_recursion_depth: Some(5), ..Default::default() };
    let err = program.run(None, None, None, Some(limits)).unwrap_err();
    assert_eq!(err.kind, ExcType::RecursionError);
}

#[test]
fn a_list_containing_itself_has_length_one_and_leaves_no_live_cells() {
    // Invariant 9 is checked indirectly: if `run` leaked the cycle, a debug
    // build's allocator bookkeeping would be the only witness available
    // from outside the crate, so this test exercises the return value half
    // of scenario 6 and trusts the cycle collector (covered directly in
    // `heap.rs`'s own unit tests) for the leak-freedom half.
    let result = run_no_inputs("a=[]; a.append(a); len(a)").unwrap();
    assert_eq!(result, Object::Int(1));
}

#[test]
fn returning_a_self_referential_list_materializes_without_looping_forever() {
    // Exercises `object::materialize`'s cycle guard directly: the return
    // value itself is the self-referential list, not merely its length.
    let result = run_no_inputs("a=[]; a.append(a); a").unwrap();
    assert_eq!(result, Object::List(vec![Object::Str("[...]".to_owned())]));
}

#[test]
fn two_lists_referencing_each_other_have_length_one() {
    let result = run_no_inputs("a,b=[],[]; a.append(b); b.append(a); len(b)").unwrap();
    assert_eq!(result, Object::Int(1));
}

#[test]
fn print_applies_sep_and_end_then_invokes_the_callback_once() {
    let program = Program::new(r#"print("hi", end="!")"#, Vec::<String>::new(), Vec::<String>::new()).unwrap();
    let mut out = CollectPrint::default();
    let result = program.run(None, None, Some(&mut out), None).unwrap();
    assert_eq!(out.lines, vec!["hi!".to_owned()]);
    assert_eq!(result, Object::None);
}

#[test]
fn sorted_is_stable_and_honors_key_and_reverse() {
    let result = run_no_inputs("sorted([3,-1,2,-4], key=abs, reverse=True)").unwrap();
    assert_eq!(result, Object::List(vec![Object::Int(-4), Object::Int(3), Object::Int(2), Object::Int(-1)]));
}

#[test]
fn zip_truncates_to_the_shortest_iterable() {
    let result = run_no_inputs(r#"list(zip([1,2,3],"ab"))"#).unwrap();
    assert_eq!(
        result,
        Object::List(vec![
            Object::Tuple(vec![Object::Int(1), Object::Str("a".to_owned())]),
            Object::Tuple(vec![Object::Int(2), Object::Str("b".to_owned())]),
        ])
    );
}
