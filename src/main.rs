use algo_lang::diagnostics;
use algo_lang::interpreter::event::Event;
use algo_lang::interpreter::value;
use algo_lang::interpreter::Interpreter;
use algo_lang::keywords::load_keywords;
use algo_lang::parser::ast::Program;
use algo_lang::parser::Parser;
use algo_lang::scanner::Scanner;
use anyhow::Result;
use clap::Parser as ClapParser;
use rustyline::DefaultEditor;
use std::collections::HashSet;
use std::fs;
use std::process::ExitCode;

#[derive(ClapParser)]
#[command(name = "algolang")]
#[command(about = "Interpreter for the AlgoLang teaching language")]
struct Cli {
    /// Program file to run
    script: String,

    /// Path to a keyword spellings JSON file (localised keyword sets)
    #[arg(short, long)]
    keywords: Option<String>,

    /// Echo each executed line number
    #[arg(long)]
    trace: bool,

    /// Pause before the given source line (repeatable)
    #[arg(short, long)]
    breakpoint: Vec<usize>,

    /// Stop after this many step events (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    step_limit: u64,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.script)?;
    let keywords = load_keywords(cli.keywords.as_deref())?;

    let scanner = Scanner::new(source.as_str(), &keywords);
    let tokens = match scanner.scan_tokens() {
        Ok(tokens) => tokens,
        Err(e) => {
            eprint!("{}", diagnostics::render(&source, "lex", e.line(), &e.to_string()));
            return Ok(ExitCode::FAILURE);
        }
    };

    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(e) => {
            eprint!("{}", diagnostics::render(&source, "parse", e.line, &e.message));
            return Ok(ExitCode::FAILURE);
        }
    };

    run(&program, &cli)
}

fn run(program: &Program, cli: &Cli) -> Result<ExitCode> {
    let breakpoints: HashSet<usize> = cli.breakpoint.iter().copied().collect();
    let mut editor = DefaultEditor::new()?;
    let mut handle = Interpreter::new(program);

    let mut reply: Option<String> = None;
    let mut steps: u64 = 0;

    loop {
        let event = handle.advance(reply.as_deref());
        reply = None;

        match event {
            Event::Step { line, snapshot } => {
                steps += 1;
                if cli.step_limit > 0 && steps > cli.step_limit {
                    eprintln!("Step limit of {} reached, stopping.", cli.step_limit);
                    return Ok(ExitCode::FAILURE);
                }
                if cli.trace {
                    eprintln!("[line {}]", line);
                }
                if breakpoints.contains(&line) {
                    eprintln!("Paused at line {}.", line);
                    let mut names: Vec<&String> = snapshot.keys().collect();
                    names.sort();
                    for name in names {
                        eprintln!("  {} = {}", name, value::format(&snapshot[name]));
                    }
                    let _ = editor.readline("continue> ");
                }
            }
            Event::Output(text) => println!("{}", text),
            Event::Input { name, expected } => {
                let prompt = format!("{} ({})? ", name, expected);
                reply = match editor.readline(&prompt) {
                    Ok(line) => Some(line),
                    Err(_) => Some(String::new()),
                };
            }
            Event::Error(message) => {
                eprintln!("Runtime Error: {}", message);
                return Ok(ExitCode::FAILURE);
            }
            Event::Done => return Ok(ExitCode::SUCCESS),
        }
    }
}
