//! One representative program per error kind not already exercised by
//! `end_to_end_scenarios.rs` or `host_boundary.rs` (§7).

use monty::{ExcType, Object, Program};

fn run(source: &str) -> Result<Object, monty::Exception> {
    Program::new(source, Vec::<String>::new(), Vec::<String>::new())
        .unwrap()
        .run(None, None, None, None)
}

#[test]
fn reading_an_unbound_name_is_a_name_error() {
    assert_eq!(run("undefined_name").unwrap_err().kind, ExcType::NameError);
}

#[test]
fn adding_incompatible_types_is_a_type_error() {
    assert_eq!(run("1 + 'a'").unwrap_err().kind, ExcType::TypeError);
}

#[test]
fn removing_a_missing_list_element_is_a_value_error() {
    assert_eq!(run("[1,2,3].remove(9)").unwrap_err().kind, ExcType::ValueError);
}

#[test]
fn indexing_past_the_end_of_a_list_is_an_index_error() {
    assert_eq!(run("[1,2,3][10]").unwrap_err().kind, ExcType::IndexError);
}

#[test]
fn calling_a_nonexistent_method_is_an_attribute_error() {
    assert_eq!(run("(1).no_such_method()").unwrap_err().kind, ExcType::AttributeError);
}

#[test]
fn a_false_assert_raises_assertion_error_with_its_message() {
    let err = run("assert 1 == 2, 'nope'").unwrap_err();
    assert_eq!(err.kind, ExcType::AssertionError);
    assert_eq!(err.message.as_deref(), Some("nope"));
}

#[test]
fn explicit_raise_of_not_implemented_error_propagates_its_kind() {
    assert_eq!(run("raise NotImplementedError('later')").unwrap_err().kind, ExcType::NotImplementedError);
}

#[test]
fn a_tuple_unpacking_arity_mismatch_is_a_value_error() {
    assert_eq!(run("a, b = 1, 2, 3").unwrap_err().kind, ExcType::ValueError);
}

#[test]
fn finally_runs_on_every_exit_path_including_a_propagating_raise() {
    let source = "log = []\ntry:\n    try:\n        raise ValueError('x')\n    finally:\n        log.append('inner')\nexcept ValueError:\n    log.append('outer')\nlog";
    let result = run(source).unwrap();
    assert_eq!(result, Object::List(vec![Object::Str("inner".to_owned()), Object::Str("outer".to_owned())]));
}

#[test]
fn a_bare_except_catches_any_exception_kind() {
    let result = run("try:\n    [1][5]\nexcept:\n    result = 'handled'\nresult").unwrap();
    assert_eq!(result, Object::Str("handled".to_owned()));
}
