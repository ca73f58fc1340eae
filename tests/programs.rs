//! End-to-end runs of complete programs, checked against their expected
//! printed output.

use indoc::indoc;

use quill::error::Error;
use quill::interpreter::{Interpreter, RuntimeError};

fn run(source: &str) -> (String, Result<(), Error>) {
    let mut out = Vec::new();
    let result = {
        let mut interpreter = Interpreter::new(&mut out);
        interpreter.run(source.chars())
    };
    (String::from_utf8(out).expect("output should be utf-8"), result)
}

fn run_ok(source: &str) -> String {
    let (output, result) = run(source);
    result.expect("program failed");
    output
}

#[test]
fn hello_world() {
    assert_eq!(run_ok(r#"print("hello, world")"#), "hello, world");
}

#[test]
fn multiplication_by_repeated_addition() {
    let source = indoc! {r#"
        def mul2(x, y)
            c = 0
            a = 0
            while lt(c, y) do
                a = add(a, x)
                c = add(c, 1)
            end-while
            return a
        end-def
        print(mul2(6, 7))
    "#};
    assert_eq!(run_ok(source), "42");
}

#[test]
fn operator_precedence_matches_the_conventional_order() {
    let source = indoc! {r#"
        def mul2(x, y)
            c = 0
            a = 0
            while c < y do
                a = a + x
                c = c + 1
            end-while
            return a
        end-def
        x = 2 + 3 * 4 - 10 / 2
        y = add(2, sub(mul2(3, 4), mul2(10, 1) / 2))
        print(x == y)
    "#};
    assert_eq!(run_ok(source), "true");
}

#[test]
fn builds_a_sentence_with_array_primitives() {
    let source = indoc! {r#"
        words = ["this", "was", "a"]
        insert(words, len(words), "triumph")
        i = 0
        while lt(i, len(words)) do
            print(geti(words, i))
            if lt(i, sub(len(words), 1)) then
                print(" ")
            end-if
            i = add(i, 1)
        end-while
        count = 0
        while lt(count, 7) do
            print("!")
            count = add(count, 1)
        end-while
    "#};
    assert_eq!(run_ok(source), "this was a triumph!!!!!!!");
}

#[test]
fn prints_the_fibonacci_sequence() {
    let source = indoc! {r#"
        def fib(n)
            if n < 2 then
                return n
            end-if
            return fib(n - 1) + fib(n - 2)
        end-def
        i = 0
        while i < 10 do
            print(fib(i))
            print(" ")
            i = i + 1
        end-while
    "#};
    assert_eq!(run_ok(source), "0 1 1 2 3 5 8 13 21 34 ");
}

#[test]
fn nested_functions_capture_their_enclosure() {
    let source = indoc! {r#"
        def outer()
            hidden = 9
            def inner()
                return hidden
            end-def
            return inner()
        end-def
        print(outer())
    "#};
    assert_eq!(run_ok(source), "9");
}

#[test]
fn conditionals_select_the_right_branch() {
    let source = indoc! {r#"
        x = 5
        if x > 3 then
            print("big")
        else
            print("small")
        end-if
        if x > 10 then
            print("bigger")
        else
            print("smaller")
        end-if
    "#};
    assert_eq!(run_ok(source), "bigsmaller");
}

#[test]
fn output_before_an_error_is_preserved() {
    let source = indoc! {r#"
        print("before ")
        print(1 / 0)
        print("after")
    "#};
    let (output, result) = run(source);
    assert_eq!(output, "before ");
    assert_eq!(result, Err(Error::Runtime(RuntimeError::DivisionByZero)));
}

#[test]
fn reports_a_parse_error_with_its_position() {
    let (output, result) = run("print(1)\nwhile do\nend-while");
    assert_eq!(output, "1");
    let error = result.expect_err("expected a parse failure");
    let message = error.to_string();
    assert!(message.contains("line 2"), "unexpected message: {message}");
}

#[test]
fn deep_recursion_fails_cleanly_instead_of_crashing() {
    let source = indoc! {r#"
        def countdown(n)
            if n == 0 then
                return 0
            end-if
            return countdown(n - 1)
        end-def
        countdown(100000)
    "#};
    let (_, result) = run(source);
    assert!(matches!(
        result,
        Err(Error::Runtime(RuntimeError::RecursionLimitExceeded { .. }))
    ));
}
