//! Universally-quantified invariants, each checked against a handful of
//! representative programs rather than exhaustively.

use monty::{ExcType, Object, Program};

fn run(source: &str) -> Result<Object, monty::Exception> {
    Program::new(source, Vec::<String>::new(), Vec::<String>::new())
        .unwrap()
        .run(None, None, None, None)
}

#[test]
fn bool_and_int_hash_and_compare_equal_across_the_numeric_tower() {
    assert_eq!(run("True == 1").unwrap(), Object::Bool(true));
    assert_eq!(run("False == 0").unwrap(), Object::Bool(true));
    assert_eq!(run("{True: 'a', 1: 'b'}[1]").unwrap(), Object::Str("b".to_owned()));
}

#[test]
fn negative_indices_mirror_positive_ones_in_range() {
    assert_eq!(run("s = [10,20,30]; s[-1] == s[len(s) - 1]").unwrap(), Object::Bool(true));
    assert_eq!(run("s = 'abc'; s[-1] == s[len(s) - 1]").unwrap(), Object::Bool(true));
}

#[test]
fn sorting_is_permutation_invariant_given_the_same_key() {
    let a = run("sorted([3,1,2], key=lambda x: -x)").unwrap();
    let b = run("sorted([2,3,1], key=lambda x: -x)").unwrap();
    // both orderings of the same multiset sort to the same result
    assert_eq!(a, b);
}

#[test]
fn list_iter_round_trips_through_list_and_iter() {
    assert_eq!(run("list(iter([1,2,3])) == [1,2,3]").unwrap(), Object::Bool(true));
    assert_eq!(run("list(iter((1,2,3))) == [1,2,3]").unwrap(), Object::Bool(true));
    assert_eq!(run("list(iter('ab')) == ['a','b']").unwrap(), Object::Bool(true));
}

#[test]
fn upper_then_lower_matches_casefold_on_ascii() {
    assert_eq!(run("s = 'Hello World'; s.upper().lower() == s.casefold()").unwrap(), Object::Bool(true));
}

#[test]
fn int_of_str_of_n_round_trips() {
    assert_eq!(run("int(str(12345)) == 12345").unwrap(), Object::Bool(true));
    assert_eq!(run("int(str(-7)) == -7").unwrap(), Object::Bool(true));
}

#[test]
fn concatenation_length_is_additive_for_sequences() {
    assert_eq!(run("len([1,2] + [3,4,5]) == len([1,2]) + len([3,4,5])").unwrap(), Object::Bool(true));
    assert_eq!(run("len('ab' + 'cde') == len('ab') + len('cde')").unwrap(), Object::Bool(true));
    assert_eq!(run("len((1,2) + (3,4,5)) == len((1,2)) + len((3,4,5))").unwrap(), Object::Bool(true));
    assert_eq!(run("len(b'ab' + b'cde') == len(b'ab') + len(b'cde')").unwrap(), Object::Bool(true));
}

#[test]
fn dict_size_change_during_iteration_is_a_runtime_error() {
    let source = "d = {1: 'a', 2: 'b'}\nfor k in d:\n    d[3] = 'c'\n";
    let err = run(source).unwrap_err();
    assert_eq!(err.kind, ExcType::RuntimeError);
}

#[test]
fn appending_during_list_iteration_visits_the_new_items() {
    let source = "a = [1]\ncount = 0\nfor x in a:\n    count += 1\n    if len(a) < 3:\n        a.append(x + 1)\ncount";
    assert_eq!(run(source).unwrap(), Object::Int(3));
}

#[test]
fn unhashable_key_raises_type_error() {
    let err = run("{[1,2]: 1}").unwrap_err();
    assert_eq!(err.kind, ExcType::TypeError);
}
