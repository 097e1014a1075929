use kaleidoscope::backend::interp::InterpBackend;
use kaleidoscope::config::Options;
use kaleidoscope::lexer::Lexer;
use kaleidoscope::parser::Parser;
use kaleidoscope::toplevel::{Outcome, TopLevel};
use kaleidoscope::ErrorKind;

fn run(src: &str) -> Vec<Result<Outcome, ErrorKind>> {
    run_with(src, &Options::default())
}

fn run_with(src: &str, options: &Options) -> Vec<Result<Outcome, ErrorKind>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut toplevel = TopLevel::new(
        Parser::new(Lexer::with_text(src)),
        InterpBackend::new(options),
        false,
    );
    let mut results = Vec::new();
    while let Some(r) = toplevel.step() {
        results.push(r.map_err(|e| e.kind().clone()));
    }
    results
}

fn evaluated(results: &[Result<Outcome, ErrorKind>]) -> Vec<f64> {
    results
        .iter()
        .filter_map(|r| match r {
            Ok(Outcome::Evaluated { value, .. }) => Some(*value),
            _ => None,
        })
        .collect()
}

#[test]
fn test_fibonacci_program() {
    let results = run(r#"
# Compute the x'th fibonacci number.
def fib(x)
  if x < 3 then
    1
  else
    fib(x-1)+fib(x-2);

fib(20);
"#);
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert_eq!(evaluated(&results), vec![6765.0]);
}

#[test]
fn test_iterative_loop_with_user_operators() {
    let results = run(r#"
def binary : 1 (x y) y;
def unary-(v) 0-v;
def binary> 10 (LHS RHS) RHS < LHS;

extern printd(x);

def sumto(n)
  for i = 1, i < n in printd(i) : 0;

sumto(3);
-(2 + 3);
5 > 2;
"#);
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert_eq!(evaluated(&results), vec![0.0, -5.0, 1.0]);
}

#[test]
fn test_errors_do_not_stop_the_session() {
    let results = run(r#"
def f(x) x;
def f(x) x;
extern g(a b);
g(1);
y;
if 1 then 2;
f(41) + 1;
"#);
    let kinds: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().err().cloned())
        .collect();
    assert_eq!(kinds[0], ErrorKind::Redefinition("f".to_owned()));
    assert_eq!(
        kinds[1],
        ErrorKind::ArgumentCount {
            callee: "g".to_owned(),
            expected: 2,
            found: 1
        }
    );
    assert_eq!(kinds[2], ErrorKind::UnknownVariable("y".to_owned()));
    assert!(matches!(kinds[3], ErrorKind::Parse(_)));
    assert_eq!(evaluated(&results).last(), Some(&42.0));
}

#[test]
fn test_unresolved_extern_fails_at_run_time() {
    let results = run("extern cos(x); cos(1);");
    assert!(matches!(results[0], Ok(Outcome::Extern { .. })));
    assert!(matches!(results[1], Err(ErrorKind::Execution(_))));
}

#[test]
fn test_deep_recursion_is_bounded() {
    let options = Options {
        max_call_depth: 50,
        ..Options::default()
    };
    let results = run_with("def down(n) if n < 1 then 0 else down(n-1); down(10); down(100);", &options);
    assert!(matches!(results[1], Ok(Outcome::Evaluated { value, .. }) if value == 0.0));
    assert!(matches!(results[2], Err(ErrorKind::Execution(_))));
}

#[test]
fn test_default_depth_limit_is_reached_before_the_host_stack() {
    let results = run("def down(n) if n < 1 then 0 else 1 + down(n-1); down(1000); down(5000);");
    assert!(matches!(results[1], Ok(Outcome::Evaluated { value, .. }) if value == 1000.0));
    assert!(matches!(results[2], Err(ErrorKind::Execution(_))));
}

#[test]
fn test_optimisation_does_not_change_results() {
    let src = "def f(x) (1+2)*x - 4*(1<2); f(5); for i = 0, i < 3 in i*2;";
    let optimised = run(src);
    let plain = run_with(
        src,
        &Options {
            optimize: false,
            ..Options::default()
        },
    );
    assert_eq!(evaluated(&optimised), vec![11.0, 0.0]);
    assert_eq!(evaluated(&optimised), evaluated(&plain));
}
