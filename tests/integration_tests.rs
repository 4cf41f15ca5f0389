use algo_lang::interpreter::event::{Event, InputType};
use algo_lang::interpreter::value::Value;
use algo_lang::keywords;
use algo_lang::parser::ast::Program;
use algo_lang::scanner::token::TokenKind;
use algo_lang::scanner::Scanner;
use algo_lang::{interpret, parse, tokenize};
use std::collections::HashMap;

fn program(source: &str) -> Program {
    let tokens = tokenize(source).expect("tokenize failed");
    parse(tokens).expect("parse failed")
}

// Drives a program to completion, feeding the given replies to Input
// events in order, and collects the full event stream (Done included).
fn run(source: &str, replies: &[&str]) -> Vec<Event> {
    let program = program(source);
    let mut handle = interpret(&program);
    let mut events = Vec::new();
    let mut replies = replies.iter();
    let mut reply: Option<&str> = None;

    loop {
        let event = handle.advance(reply.take());
        if let Event::Input { .. } = &event {
            reply = replies.next().copied();
        }
        let done = matches!(event, Event::Done);
        events.push(event);
        if done {
            break;
        }
        assert!(events.len() < 10_000, "runaway program in test");
    }

    events
}

fn outputs(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Output(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

fn step_lines(events: &[Event]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Step { line, .. } => Some(*line),
            _ => None,
        })
        .collect()
}

// --- END-TO-END SCENARIOS ---

#[test]
fn test_hello_world_event_stream() {
    let events = run("Algorithm H\nBegin Write(\"Hello, World!\") End", &[]);
    assert_eq!(
        events,
        vec![
            Event::Step {
                line: 2,
                snapshot: HashMap::new()
            },
            Event::Output("Hello, World!".to_string()),
            Event::Done,
        ]
    );
}

#[test]
fn test_average_of_five_grades() {
    let source = "Algorithm Average_Note
Var
  n1, n2, n3, n4, n5 : Real
  avg : Real
Begin
  Read(n1, n2, n3, n4, n5)
  avg <- (n1 + n2 + n3 + n4 + n5) / 5
  Write(\"The average is:\", avg)
End";
    let events = run(source, &["15", "12", "18", "10", "10"]);

    let inputs = events
        .iter()
        .filter(|e| matches!(e, Event::Input { .. }))
        .count();
    assert_eq!(inputs, 5);

    // Done is last; the Output precedes it, announced by a Step at the
    // Write line
    let n = events.len();
    assert_eq!(events[n - 1], Event::Done);
    assert_eq!(
        events[n - 2],
        Event::Output("The average is: 13".to_string())
    );
    assert!(matches!(events[n - 3], Event::Step { line: 8, .. }));
}

#[test]
fn test_matrix_indexing() {
    let source = "Algorithm Grid_Fill
Var
  Grid : array [3] [3] of Integer
  r, c : Integer
Begin
  For r <- 0 To 2 Do
    For c <- 0 To 2 Do
      Grid[r][c] <- r * 3 + c + 1
      Write(\"cell\", Grid[r][c])
    EndFor
  EndFor
End";
    let events = run(source, &[]);
    let expected: Vec<String> = (1..=9).map(|n| format!("cell {}", n)).collect();
    assert_eq!(outputs(&events), expected);
}

#[test]
fn test_function_call_from_expression() {
    let source = "Algorithm Adder
Var
  result : Integer
Function Add(a : Integer, b : Integer) : Integer
Begin
  Return a + b
EndFunction
Begin
  result <- Add(10, 20)
  Write(result)
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["30"]);

    // Expression-mode calls are synchronous: no Step for the Return on
    // line 6 inside Add
    assert_eq!(step_lines(&events), vec![9, 10]);
}

#[test]
fn test_out_of_bounds_write() {
    let source = "Algorithm Bounds
Var
  v : array [3] of Integer
Begin
  v[3] <- 1
End";
    let events = run(source, &[]);
    assert!(matches!(events[0], Event::Step { line: 5, .. }));
    assert_eq!(events[1], Event::Error("Index 3 out of bounds.".to_string()));
    assert_eq!(events[2], Event::Done);
}

#[test]
fn test_unterminated_string_reports_opening_line() {
    let result = tokenize("Algorithm H\nBegin\nWrite(\"hi");
    match result {
        Err(e) => assert!(e.to_string().contains("line 3"), "got: {}", e),
        Ok(_) => panic!("expected a lexical error"),
    }
}

// --- TOKENIZER ---

#[test]
fn test_keyword_case_insensitivity() {
    let kinds = |src: &str| -> Vec<TokenKind> {
        tokenize(src)
            .expect("tokenize failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    };
    let lower = kinds("algorithm H\nbegin write(1) end");
    let upper = kinds("ALGORITHM H\nBEGIN WRITE(1) END");
    let mixed = kinds("AlGoRiThM H\nBeGiN WrItE(1) EnD");
    assert_eq!(lower, upper);
    assert_eq!(lower, mixed);
}

#[test]
fn test_identifier_lexemes_preserved_verbatim() {
    let tokens = tokenize("Algorithm MyAlgo\nBegin\nMyVar <- 1\nEnd").unwrap();
    let lexemes: Vec<&str> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Identifier)
        .map(|t| t.lexeme.as_str())
        .collect();
    assert_eq!(lexemes, vec!["MyAlgo", "MyVar"]);
}

#[test]
fn test_token_line_provenance() {
    let tokens = tokenize("Algorithm H\nBegin\nWrite(1)\nEnd").unwrap();
    let line_of = |kind: TokenKind| tokens.iter().find(|t| t.kind == kind).unwrap().line;
    assert_eq!(line_of(TokenKind::Algorithm), 1);
    assert_eq!(line_of(TokenKind::Begin), 2);
    assert_eq!(line_of(TokenKind::Write), 3);
    assert_eq!(line_of(TokenKind::End), 4);
}

#[test]
fn test_unexpected_character() {
    let result = tokenize("Algorithm H\nBegin @ End");
    match result {
        Err(e) => assert_eq!(e.to_string(), "Unexpected character '@' at line 2"),
        Ok(_) => panic!("expected a lexical error"),
    }
}

#[test]
fn test_comments_track_line_numbers() {
    // Both comment forms, with a brace comment spanning lines; the Write
    // must still be attributed to line 6
    let source = "Algorithm C
Begin
// line comment
{ brace
comment }
Write(1)
End";
    let events = run(source, &[]);
    assert_eq!(step_lines(&events), vec![6]);
    assert_eq!(outputs(&events), vec!["1"]);
}

#[test]
fn test_leading_zero_literal() {
    let events = run("Algorithm Z\nBegin Write(007) End", &[]);
    assert_eq!(outputs(&events), vec!["7"]);
}

#[test]
fn test_localised_keyword_spellings() {
    // The scanner takes keyword spellings as data; a French table works
    // without touching anything else
    let mut kw = keywords::default_keywords();
    kw.insert("algorithme".to_string(), TokenKind::Algorithm);
    kw.insert("debut".to_string(), TokenKind::Begin);
    kw.insert("fin".to_string(), TokenKind::End);
    kw.insert("ecrire".to_string(), TokenKind::Write);

    let tokens = Scanner::new("Algorithme H\nDebut Ecrire(1) Fin", &kw)
        .scan_tokens()
        .unwrap();
    let program = parse(tokens).unwrap();
    let mut handle = interpret(&program);
    assert!(matches!(handle.advance(None), Event::Step { line: 2, .. }));
    assert_eq!(handle.advance(None), Event::Output("1".to_string()));
}

// --- PARSER ---

#[test]
fn test_assignment_forms_parse_identically() {
    let arrow = program("Algorithm A\nVar\nx : Integer\nBegin\nx <- 1\nEnd");
    let symbol = program("Algorithm A\nVar\nx : Integer\nBegin\nx ← 1\nEnd");
    let pascal = program("Algorithm A\nVar\nx : Integer\nBegin\nx := 1\nEnd");
    assert_eq!(format!("{:?}", arrow), format!("{:?}", symbol));
    assert_eq!(format!("{:?}", arrow), format!("{:?}", pascal));
}

#[test]
fn test_parse_error_shape() {
    let tokens = tokenize("Algorithm").unwrap();
    let err = parse(tokens).unwrap_err();
    assert!(err.to_string().starts_with("Line 1: Expected"), "got: {}", err);
}

#[test]
fn test_const_is_reserved() {
    let tokens = tokenize("Algorithm C\nConst\nBegin End").unwrap();
    let err = parse(tokens).unwrap_err();
    assert!(err.to_string().contains("Const"), "got: {}", err);
}

#[test]
fn test_trailing_tokens_rejected() {
    let tokens = tokenize("Algorithm T\nBegin End extra").unwrap();
    assert!(parse(tokens).is_err());
}

#[test]
fn test_empty_bodies_parse_and_run() {
    assert_eq!(run("Algorithm E\nBegin End", &[]), vec![Event::Done]);

    let source = "Algorithm E
Var
  x : Integer
Begin
  If x = 0 Then EndIf
  While x > 0 Do EndWhile
End";
    let events = run(source, &[]);
    assert!(!events.iter().any(|e| matches!(e, Event::Error(_))));
}

#[test]
fn test_semicolons_are_statement_separators() {
    let source = "Algorithm S\nVar\nx : Integer;\nBegin\nx <- 1; Write(x);\nEnd";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["1"]);
}

// --- LOOPS ---

#[test]
fn test_while_steps_at_header_each_iteration() {
    let source = "Algorithm Count
Var
  i : Integer
Begin
  i <- 0
  While i < 3 Do
    i <- i + 1
  EndWhile
End";
    let events = run(source, &[]);
    // One Step per statement execution: the header announces every
    // condition evaluation, including the failing one
    assert_eq!(step_lines(&events), vec![5, 6, 7, 6, 7, 6, 7, 6]);
}

#[test]
fn test_for_start_greater_than_end_runs_zero_times() {
    let source = "Algorithm Z
Var
  i : Integer
Begin
  For i <- 5 To 1 Do
    Write(\"never\")
  EndFor
End";
    let events = run(source, &[]);
    assert!(outputs(&events).is_empty());
}

#[test]
fn test_for_negative_step() {
    let source = "Algorithm Down
Var
  i : Integer
Begin
  For i <- 3 To 1 Step -1 Do
    Write(i)
  EndFor
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["3", "2", "1"]);
}

#[test]
fn test_for_loop_variable_aliases_its_cell() {
    // The body writes the loop variable; the next test sees the change
    let source = "Algorithm Alias
Var
  i : Integer
Begin
  For i <- 0 To 9 Do
    i <- i + 4
  EndFor
  Write(i)
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["10"]);
    let body_steps = step_lines(&events).iter().filter(|&&l| l == 6).count();
    assert_eq!(body_steps, 2);
}

#[test]
fn test_for_step_zero_loops_forever() {
    // Acceptable per the language; a host step budget breaks it
    let source = "Algorithm L
Var
  i : Integer
Begin
  For i <- 0 To 1 Step 0 Do
    i <- i
  EndFor
End";
    let parsed = program(source);
    let mut handle = interpret(&parsed);
    for _ in 0..200 {
        let event = handle.advance(None);
        assert!(!matches!(event, Event::Done | Event::Error(_)));
    }
}

// --- READ / WRITE ---

#[test]
fn test_input_event_carries_name_and_type() {
    let source = "Algorithm I
Var
  n : Integer
  v : array [2] of Real
Begin
  Read(n, v[1])
End";
    let events = run(source, &["4", "5"]);
    assert_eq!(
        events[1],
        Event::Input {
            name: "n".to_string(),
            expected: InputType::Number
        }
    );
    assert_eq!(
        events[2],
        Event::Input {
            name: "v[1]".to_string(),
            expected: InputType::Number
        }
    );
}

#[test]
fn test_read_boolean_and_string() {
    let source = "Algorithm R
Var
  b : Boolean
  s : String
Begin
  Read(b, s)
  Write(b, s)
End";
    let events = run(source, &["TRUE", "hello world"]);
    assert_eq!(outputs(&events), vec!["true hello world"]);
}

#[test]
fn test_read_number_parse_failure() {
    let source = "Algorithm R\nVar\nn : Integer\nBegin\nRead(n)\nEnd";
    let events = run(source, &["abc"]);
    assert!(events.contains(&Event::Error("Expected a number input.".to_string())));
}

#[test]
fn test_read_boolean_parse_failure() {
    let source = "Algorithm R\nVar\nb : Boolean\nBegin\nRead(b)\nEnd";
    let events = run(source, &["yes"]);
    assert!(events.contains(&Event::Error("Expected a boolean input.".to_string())));
}

#[test]
fn test_read_into_whole_array_rejected() {
    let source = "Algorithm R\nVar\nv : array [2] of Integer\nBegin\nRead(v)\nEnd";
    let events = run(source, &[]);
    assert!(events.contains(&Event::Error("Cannot read into array 'v'.".to_string())));
}

#[test]
fn test_write_formatting() {
    let source = "Algorithm W
Var
  v : array [3] of Integer
Begin
  Write(10 / 4, 1 / 3, 100)
  Write(true, False)
  Write(v)
End";
    let events = run(source, &[]);
    assert_eq!(
        outputs(&events),
        vec!["2.5 0.3333 100", "true false", "[0, 0, 0]"]
    );
}

// --- EXPRESSIONS ---

#[test]
fn test_div_and_mod_semantics() {
    // Div floors; Mod keeps the dividend's sign (host % semantics)
    let events = run(
        "Algorithm M\nBegin Write(7 Div 2, 7 Mod 2, -7 Div 2, -7 Mod 2) End",
        &[],
    );
    assert_eq!(outputs(&events), vec!["3 1 -4 -1"]);
}

#[test]
fn test_division_by_zero_propagates() {
    // No trap: the host real arithmetic decides
    let events = run("Algorithm D\nBegin Write(1 / 0 > 100) End", &[]);
    assert_eq!(outputs(&events), vec!["true"]);
}

#[test]
fn test_chained_comparison_is_a_type_error() {
    // 1 < 2 < 3 parses left-to-right, then compares boolean to number
    let events = run("Algorithm C\nBegin Write(1 < 2 < 3) End", &[]);
    assert!(events.contains(&Event::Error(
        "Cannot apply '<' to a boolean and a number.".to_string()
    )));
}

#[test]
fn test_short_circuit_evaluation() {
    // The right operand would be an undeclared-variable error if evaluated
    let source = "Algorithm S\nBegin\nIf false And missing Then Write(\"no\") EndIf\nWrite(\"ok\")\nEnd";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["ok"]);
}

#[test]
fn test_string_equality_and_ordering() {
    let events = run(
        "Algorithm E\nBegin Write(\"a\" = \"a\", \"a\" <> \"b\", \"a\" < \"b\") End",
        &[],
    );
    assert_eq!(outputs(&events), vec!["true true true"]);
}

#[test]
fn test_char_literal_is_a_string() {
    let events = run("Algorithm C\nBegin Write('A') End", &[]);
    assert_eq!(outputs(&events), vec!["A"]);
}

// --- RUNTIME ERRORS ---

#[test]
fn test_undeclared_variable() {
    let events = run("Algorithm U\nBegin\nx <- 1\nEnd", &[]);
    assert_eq!(events[1], Event::Error("Variable 'x' not declared.".to_string()));
}

#[test]
fn test_not_an_array() {
    let source = "Algorithm N\nVar\nx : Integer\nBegin\nx[0] <- 2\nEnd";
    let events = run(source, &[]);
    assert!(events.contains(&Event::Error("'x' is not an array.".to_string())));
}

#[test]
fn test_zero_length_array_always_out_of_bounds() {
    let source = "Algorithm Z\nVar\nv : array [0] of Integer\nBegin\nv[0] <- 1\nEnd";
    let events = run(source, &[]);
    assert!(events.contains(&Event::Error("Index 0 out of bounds.".to_string())));
}

#[test]
fn test_unknown_callable() {
    let events = run("Algorithm U\nBegin\nFoo(1)\nEnd", &[]);
    assert!(events.contains(&Event::Error(
        "Unknown procedure/function 'Foo'.".to_string()
    )));
}

#[test]
fn test_arity_mismatch() {
    let source = "Algorithm A
Function Add(a : Integer, b : Integer) : Integer
Begin
  Return a + b
EndFunction
Begin
  Add(1)
End";
    let events = run(source, &[]);
    assert!(events.contains(&Event::Error(
        "'Add' expects 2 arguments, got 1.".to_string()
    )));
}

#[test]
fn test_return_outside_callable() {
    let events = run("Algorithm R\nBegin\nReturn 1\nEnd", &[]);
    assert!(events.contains(&Event::Error(
        "'Return' outside of a function or procedure.".to_string()
    )));
}

#[test]
fn test_duplicate_callable_names() {
    let source = "Algorithm D
Procedure P()
Begin
EndProcedure
Procedure p()
Begin
EndProcedure
Begin
End";
    let events = run(source, &[]);
    assert_eq!(
        events[0],
        Event::Error("'p' is declared more than once.".to_string())
    );
}

// --- CALLS AND SCOPES ---

#[test]
fn test_procedure_call_yields_nested_events() {
    let source = "Algorithm P
Procedure Shout()
Begin
  Write(\"hi\")
EndProcedure
Begin
  Shout()
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["hi"]);
    // Stepping mode: the Write inside the procedure gets its own Step
    assert!(step_lines(&events).contains(&4));
}

#[test]
fn test_callable_names_match_case_insensitively() {
    let source = "Algorithm C
Procedure Shout()
Begin
  Write(\"hi\")
EndProcedure
Begin
  SHOUT()
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["hi"]);
}

#[test]
fn test_expression_mode_skips_io() {
    let source = "Algorithm E
Var
  x : Integer
Function Noisy() : Integer
Begin
  Write(\"ignored\")
  Return 7
EndFunction
Begin
  x <- Noisy() + 1
  Write(x)
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["8"]);
}

#[test]
fn test_function_without_return_in_expression() {
    let source = "Algorithm F
Var
  x : Integer
Function Nothing() : Integer
Begin
EndFunction
Begin
  x <- Nothing()
End";
    let events = run(source, &[]);
    assert!(events.contains(&Event::Error(
        "'Nothing' did not return a value.".to_string()
    )));
}

#[test]
fn test_return_unwinds_one_activation() {
    let source = "Algorithm R
Procedure Early()
Begin
  Return
  Write(\"never\")
EndProcedure
Begin
  Early()
  Write(\"after\")
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["after"]);
}

#[test]
fn test_scope_freshness_after_call() {
    let source = "Algorithm Scopes
Var
  x : Integer
Procedure Bump(a : Integer)
Var
  local : Integer
Begin
  local <- a + 1
EndProcedure
Begin
  x <- 5
  Bump(x)
  x <- x
End";
    let events = run(source, &[]);

    // Inside the call the snapshot sees caller and callee frames merged
    let inside = events
        .iter()
        .find_map(|e| match e {
            Event::Step { line: 8, snapshot } => Some(snapshot.clone()),
            _ => None,
        })
        .expect("no Step inside Bump");
    assert!(inside.contains_key("x"));
    assert!(inside.contains_key("a"));
    assert!(inside.contains_key("local"));

    // After the call returns, only the caller's names remain
    let after = events
        .iter()
        .find_map(|e| match e {
            Event::Step { line: 13, snapshot } => Some(snapshot.clone()),
            _ => None,
        })
        .expect("no Step after Bump");
    let mut names: Vec<&String> = after.keys().collect();
    names.sort();
    assert_eq!(names, vec!["x"]);
    assert_eq!(after["x"], Value::Real(5.0));
}

#[test]
fn test_snapshot_is_immutable_copy() {
    let source = "Algorithm Snap
Var
  x : Integer
Begin
  x <- 5
  x <- 9
End";
    let parsed = program(source);
    let mut handle = interpret(&parsed);

    handle.advance(None); // Step at x <- 5
    // The next advance applies the assignment and announces x <- 9
    let snapshot = match handle.advance(None) {
        Event::Step { snapshot, .. } => snapshot,
        other => panic!("expected Step, got {:?}", other),
    };
    assert_eq!(snapshot["x"], Value::Real(5.0));

    // Run the mutation; the retained snapshot must not change
    while !matches!(handle.advance(None), Event::Done) {}
    assert_eq!(snapshot["x"], Value::Real(5.0));
}

#[test]
fn test_true_false_are_evaluation_constants() {
    let source = "Algorithm B
Var
  b : Boolean
Begin
  b <- True
  If b Then Write(\"yes\") EndIf
  b <- FALSE
  If Not b Then Write(\"no\") EndIf
End";
    let events = run(source, &[]);
    assert_eq!(outputs(&events), vec!["yes", "no"]);
}

#[test]
fn test_abandoning_a_suspended_handle() {
    // Dropping mid-Input needs no teardown
    let source = "Algorithm A\nVar\nn : Integer\nBegin\nRead(n)\nEnd";
    let parsed = program(source);
    let mut handle = interpret(&parsed);
    handle.advance(None); // Step
    let event = handle.advance(None); // Input, now suspended
    assert!(matches!(event, Event::Input { .. }));
    drop(handle);
}
