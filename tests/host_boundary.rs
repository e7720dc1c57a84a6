//! Contracts at the `Program::new`/`Program::run` boundary (§6, §7):
//! input declaration mismatches, external-function dispatch, and the
//! print-callback default.

use std::collections::HashMap;

use monty::{ExcType, Object, Program};

#[test]
fn providing_inputs_to_a_program_that_declared_none_is_a_type_error() {
    let program = Program::new("1 + 1", Vec::<String>::new(), Vec::<String>::new()).unwrap();
    let mut inputs = HashMap::new();
    inputs.insert("x".to_owned(), Object::Int(1));
    let err = program.run(Some(inputs), None, None, None).unwrap_err();
    assert_eq!(err.kind, ExcType::TypeError);
}

#[test]
fn omitting_a_declared_input_is_a_key_error() {
    let program = Program::new("x", ["x"], Vec::<String>::new()).unwrap();
    let err = program.run(None, None, None, None).unwrap_err();
    assert_eq!(err.kind, ExcType::KeyError);
}

#[test]
fn a_declared_external_function_without_a_supplied_callback_raises_runtime_error() {
    let program = Program::new("greet()", Vec::<String>::new(), ["greet"]).unwrap();
    let err = program.run(None, None, None, None).unwrap_err();
    assert_eq!(err.kind, ExcType::RuntimeError);
}

#[test]
fn a_supplied_external_callback_is_invoked_with_materialized_arguments() {
    let program = Program::new("double(21)", Vec::<String>::new(), ["double"]).unwrap();
    let mut externals: HashMap<String, monty::ExternalFunction> = HashMap::new();
    externals.insert(
        "double".to_owned(),
        Box::new(|args, _kwargs| match args.as_slice() {
            [Object::Int(n)] => Ok(Object::Int(n * 2)),
            _ => Err("expected exactly one int argument".to_owned()),
        }),
    );
    let result = program.run(None, Some(externals), None, None).unwrap();
    assert_eq!(result, Object::Int(42));
}

#[test]
fn a_failed_external_callback_surfaces_as_runtime_error_with_its_message() {
    let program = Program::new("boom()", Vec::<String>::new(), ["boom"]).unwrap();
    let mut externals: HashMap<String, monty::ExternalFunction> = HashMap::new();
    externals.insert("boom".to_owned(), Box::new(|_args, _kwargs| Err("host refused".to_owned())));
    let err = program.run(None, Some(externals), None, None).unwrap_err();
    assert_eq!(err.kind, ExcType::RuntimeError);
    assert_eq!(err.message.as_deref(), Some("host refused"));
}

#[test]
fn malformed_source_fails_to_parse_as_a_syntax_error() {
    let err = Program::new("def f(:\n  pass", Vec::<String>::new(), Vec::<String>::new()).unwrap_err();
    assert_eq!(err.kind, ExcType::SyntaxError);
}

#[test]
fn a_program_whose_last_statement_is_not_an_expression_returns_the_null_sentinel() {
    let program = Program::new("x = 1", Vec::<String>::new(), Vec::<String>::new()).unwrap();
    let result = program.run(None, None, None, None).unwrap();
    assert_eq!(result, Object::None);
}

#[test]
fn with_no_print_callback_installed_output_is_silently_discarded() {
    let program = Program::new(r#"print("ignored")"#, Vec::<String>::new(), Vec::<String>::new()).unwrap();
    let result = program.run(None, None, None, None).unwrap();
    assert_eq!(result, Object::None);
}
