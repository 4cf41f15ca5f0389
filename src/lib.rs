pub mod diagnostics;
pub mod interpreter;
pub mod keywords;
pub mod parser;
pub mod scanner;

use crate::interpreter::Interpreter;
use crate::parser::ast::Program;
use crate::parser::{ParseError, Parser};
use crate::scanner::token::Token;
use crate::scanner::{LexError, Scanner};

/// Tokenizes source text with the canonical keyword spellings.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Scanner::new(source, &keywords::default_keywords()).scan_tokens()
}

pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse()
}

/// Constructs a fresh, ready interpreter over a parsed program. Drive it
/// with [`Interpreter::advance`]; drop it to cancel.
pub fn interpret(program: &Program) -> Interpreter<'_> {
    Interpreter::new(program)
}
