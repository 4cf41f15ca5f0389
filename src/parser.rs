pub mod ast;

use crate::parser::ast::{
    BaseType, BinOp, Block, Callable, Expr, ExprKind, FunctionDecl, IoDir, Literal, Param,
    ProcedureDecl, Program, Ref, Stmt, StmtKind, UnOp, VarDecl,
};
use crate::scanner::token::{Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("Line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    // utility methods
    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        for k in kinds {
            if self.check(k.clone()) {
                self.advance();
                return true;
            }
        }
        false
    }

    // Contextual words: `array` and `of` are not keywords, they only mean
    // something inside a declaration
    fn check_word(&self, word: &str) -> bool {
        self.check(TokenKind::Identifier) && self.peek().lexeme.eq_ignore_ascii_case(word)
    }

    fn error_expected(&self, expected: &str) -> ParseError {
        let current = self.peek();
        let context = if self.current > 0 {
            format!(" after '{}'", self.previous().lexeme)
        } else {
            String::new()
        };
        ParseError {
            line: current.line,
            message: format!("Expected {}{}, got '{}'", expected, context, current.lexeme),
        }
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn skip_semicolons(&mut self) {
        while self.check(TokenKind::Semicolon) {
            self.advance();
        }
    }

    pub fn parse(mut self) -> Result<Program, ParseError> {
        self.program()
    }

    fn program(&mut self) -> Result<Program, ParseError> {
        let line = self.peek().line;
        self.consume(TokenKind::Algorithm, "'Algorithm'")?;
        let name = self
            .consume(TokenKind::Identifier, "algorithm name")?
            .lexeme
            .clone();
        self.skip_semicolons();

        let vars = if self.check(TokenKind::Var) {
            self.advance();
            self.var_decls()?
        } else {
            Vec::new()
        };

        let mut callables = Vec::new();
        loop {
            if self.check(TokenKind::Function) {
                callables.push(Callable::Function(self.function_decl()?));
            } else if self.check(TokenKind::Procedure) {
                callables.push(Callable::Procedure(self.procedure_decl()?));
            } else if self.check(TokenKind::Const) {
                return Err(ParseError {
                    line: self.peek().line,
                    message: "'Const' declarations are reserved and not supported".to_string(),
                });
            } else {
                break;
            }
        }

        self.consume(TokenKind::Begin, "'Begin'")?;
        let body = self.block()?;
        self.consume(TokenKind::End, "'End'")?;
        self.skip_semicolons();
        self.consume(TokenKind::Eof, "end of file")?;

        Ok(Program {
            name,
            vars,
            callables,
            body,
            line,
        })
    }

    fn var_decls(&mut self) -> Result<Vec<VarDecl>, ParseError> {
        let mut decls = Vec::new();

        while self.check(TokenKind::Identifier) {
            let line = self.peek().line;
            let mut names = vec![self
                .consume(TokenKind::Identifier, "variable name")?
                .lexeme
                .clone()];
            while self.check(TokenKind::Comma) {
                self.advance();
                names.push(
                    self.consume(TokenKind::Identifier, "variable name")?
                        .lexeme
                        .clone(),
                );
            }

            self.consume(TokenKind::Colon, "':'")?;

            let mut dims = Vec::new();
            if self.check_word("array") {
                self.advance();
                self.consume(TokenKind::LeftBracket, "'['")?;
                dims.push(self.dimension()?);
                self.consume(TokenKind::RightBracket, "']'")?;
                while self.check(TokenKind::LeftBracket) {
                    self.advance();
                    dims.push(self.dimension()?);
                    self.consume(TokenKind::RightBracket, "']'")?;
                }
                if !self.check_word("of") {
                    return Err(self.error_expected("'of'"));
                }
                self.advance();
            }

            let ty = self.base_type()?;
            self.skip_semicolons();
            decls.push(VarDecl {
                names,
                ty,
                dims,
                line,
            });
        }

        Ok(decls)
    }

    fn dimension(&mut self) -> Result<usize, ParseError> {
        match self.peek().kind {
            TokenKind::Number(n) if n.fract() == 0.0 && n >= 0.0 => {
                self.advance();
                Ok(n as usize)
            }
            _ => Err(self.error_expected("array size")),
        }
    }

    fn base_type(&mut self) -> Result<BaseType, ParseError> {
        let ty = match self.peek().kind {
            TokenKind::Integer => BaseType::Integer,
            TokenKind::Real => BaseType::Real,
            TokenKind::Boolean => BaseType::Boolean,
            TokenKind::String => BaseType::String,
            TokenKind::Char => BaseType::Char,
            _ => return Err(self.error_expected("a type name")),
        };
        self.advance();
        Ok(ty)
    }

    fn function_decl(&mut self) -> Result<FunctionDecl, ParseError> {
        let line = self.peek().line;
        self.advance(); // consume Function

        let name = self
            .consume(TokenKind::Identifier, "function name")?
            .lexeme
            .clone();
        let params = self.params()?;
        self.consume(TokenKind::Colon, "':'")?;
        let ret = self.base_type()?;
        self.skip_semicolons();

        let locals = if self.check(TokenKind::Var) {
            self.advance();
            self.var_decls()?
        } else {
            Vec::new()
        };

        self.consume(TokenKind::Begin, "'Begin'")?;
        let body = self.block()?;
        self.consume(TokenKind::EndFunction, "'EndFunction'")?;

        Ok(FunctionDecl {
            name,
            params,
            ret,
            locals,
            body,
            line,
        })
    }

    fn procedure_decl(&mut self) -> Result<ProcedureDecl, ParseError> {
        let line = self.peek().line;
        self.advance(); // consume Procedure

        let name = self
            .consume(TokenKind::Identifier, "procedure name")?
            .lexeme
            .clone();
        let params = self.params()?;
        self.skip_semicolons();

        let locals = if self.check(TokenKind::Var) {
            self.advance();
            self.var_decls()?
        } else {
            Vec::new()
        };

        self.consume(TokenKind::Begin, "'Begin'")?;
        let body = self.block()?;
        self.consume(TokenKind::EndProcedure, "'EndProcedure'")?;

        Ok(ProcedureDecl {
            name,
            params,
            locals,
            body,
            line,
        })
    }

    fn params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.consume(TokenKind::LeftParen, "'('")?;
        let mut params = Vec::new();

        if !self.check(TokenKind::RightParen) {
            loop {
                let name = self
                    .consume(TokenKind::Identifier, "parameter name")?
                    .lexeme
                    .clone();
                self.consume(TokenKind::Colon, "':'")?;
                let ty = self.base_type()?;
                params.push(Param { name, ty });

                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }

        self.consume(TokenKind::RightParen, "')'")?;
        Ok(params)
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();

        loop {
            self.skip_semicolons();
            match self.peek().kind {
                TokenKind::End
                | TokenKind::EndIf
                | TokenKind::EndWhile
                | TokenKind::EndFor
                | TokenKind::EndFunction
                | TokenKind::EndProcedure
                | TokenKind::Else
                | TokenKind::Eof => break,
                _ => stmts.push(self.statement()?),
            }
        }

        Ok(Block { stmts })
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        match self.peek().kind {
            TokenKind::Read => {
                self.advance();
                let args = self.paren_expr_list()?;
                Ok(Stmt {
                    kind: StmtKind::Io {
                        dir: IoDir::Read,
                        args,
                    },
                    line,
                })
            }

            TokenKind::Write => {
                self.advance();
                let args = self.paren_expr_list()?;
                Ok(Stmt {
                    kind: StmtKind::Io {
                        dir: IoDir::Write,
                        args,
                    },
                    line,
                })
            }

            TokenKind::If => {
                self.advance();
                let condition = self.expression()?;
                self.consume(TokenKind::Then, "'Then'")?;
                let then_block = self.block()?;
                let else_block = if self.check(TokenKind::Else) {
                    self.advance();
                    Some(self.block()?)
                } else {
                    None
                };
                self.consume(TokenKind::EndIf, "'EndIf'")?;
                Ok(Stmt {
                    kind: StmtKind::If {
                        condition,
                        then_block,
                        else_block,
                    },
                    line,
                })
            }

            TokenKind::While => {
                self.advance();
                let condition = self.expression()?;
                self.consume(TokenKind::Do, "'Do'")?;
                let body = self.block()?;
                self.consume(TokenKind::EndWhile, "'EndWhile'")?;
                Ok(Stmt {
                    kind: StmtKind::While { condition, body },
                    line,
                })
            }

            TokenKind::For => {
                self.advance();
                let var = self
                    .consume(TokenKind::Identifier, "loop variable")?
                    .lexeme
                    .clone();
                self.consume(TokenKind::Assign, "':='")?;
                let start = self.expression()?;
                self.consume(TokenKind::To, "'To'")?;
                let end = self.expression()?;
                let step = if self.check(TokenKind::Step) {
                    self.advance();
                    Some(self.expression()?)
                } else {
                    None
                };
                self.consume(TokenKind::Do, "'Do'")?;
                let body = self.block()?;
                self.consume(TokenKind::EndFor, "'EndFor'")?;
                Ok(Stmt {
                    kind: StmtKind::For {
                        var,
                        start,
                        end,
                        step,
                        body,
                    },
                    line,
                })
            }

            TokenKind::Return => {
                self.advance();
                let value = if self.starts_expression() {
                    Some(self.expression()?)
                } else {
                    None
                };
                Ok(Stmt {
                    kind: StmtKind::Return { value },
                    line,
                })
            }

            TokenKind::Identifier => {
                let name = self.advance().lexeme.clone();
                if self.check(TokenKind::LeftParen) {
                    let args = self.paren_expr_list()?;
                    Ok(Stmt {
                        kind: StmtKind::Call { name, args },
                        line,
                    })
                } else {
                    let mut indices = Vec::new();
                    while self.check(TokenKind::LeftBracket) {
                        self.advance();
                        indices.push(self.expression()?);
                        self.consume(TokenKind::RightBracket, "']'")?;
                    }
                    self.consume(TokenKind::Assign, "':='")?;
                    let value = self.expression()?;
                    Ok(Stmt {
                        kind: StmtKind::Assign {
                            target: Ref {
                                name,
                                indices,
                                line,
                            },
                            value,
                        },
                        line,
                    })
                }
            }

            _ => Err(self.error_expected("a statement")),
        }
    }

    // A bare `Return` is legal in procedures, so only parse an expression
    // when one can actually start here
    fn starts_expression(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Number(_)
                | TokenKind::Text(_)
                | TokenKind::Identifier
                | TokenKind::LeftParen
                | TokenKind::Minus
                | TokenKind::Not
        )
    }

    fn paren_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.consume(TokenKind::LeftParen, "'('")?;
        let mut args = Vec::new();

        if !self.check(TokenKind::RightParen) {
            args.push(self.expression()?);
            while self.check(TokenKind::Comma) {
                self.advance();
                args.push(self.expression()?);
            }
        }

        self.consume(TokenKind::RightParen, "')'")?;
        Ok(args)
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.logic_or()
    }

    fn binary(&mut self, left: Expr, op: BinOp, right: Expr) -> Expr {
        // A node's line is the line of its first token
        let line = left.line;
        Expr {
            kind: ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            line,
        }
    }

    fn logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.logic_and()?;

        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.logic_and()?;
            left = self.binary(left, BinOp::Or, right);
        }

        Ok(left)
    }

    fn logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;

        while self.check(TokenKind::And) {
            self.advance();
            let right = self.equality()?;
            left = self.binary(left, BinOp::And, right);
        }

        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;

        while self.match_any(&[TokenKind::Equal, TokenKind::NotEqual]) {
            let op = match self.previous().kind {
                TokenKind::Equal => BinOp::Eq,
                _ => BinOp::NotEq,
            };
            let right = self.comparison()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;

        while self.match_any(&[
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
        ]) {
            let op = match self.previous().kind {
                TokenKind::Less => BinOp::Less,
                TokenKind::LessEqual => BinOp::LessEq,
                TokenKind::Greater => BinOp::Greater,
                _ => BinOp::GreaterEq,
            };
            let right = self.term()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.factor()?;

        while self.match_any(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = match self.previous().kind {
                TokenKind::Plus => BinOp::Add,
                _ => BinOp::Sub,
            };
            let right = self.factor()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;

        while self.match_any(&[
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Mod,
            TokenKind::Div,
        ]) {
            let op = match self.previous().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                _ => BinOp::IntDiv,
            };
            let right = self.unary()?;
            left = self.binary(left, op, right);
        }

        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_any(&[TokenKind::Not, TokenKind::Minus]) {
            let line = self.previous().line;
            let op = match self.previous().kind {
                TokenKind::Not => UnOp::Not,
                _ => UnOp::Neg,
            };
            let operand = self.unary()?; // recursive for chained unary: --x
            Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                line,
            })
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let line = token.line;

        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Literal(Literal::Number(n)),
                    line,
                })
            }

            TokenKind::Text(s) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Literal(Literal::Text(s)),
                    line,
                })
            }

            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }

            TokenKind::Identifier => {
                let name = token.lexeme;
                self.advance();

                if self.check(TokenKind::LeftParen) {
                    let args = self.paren_expr_list()?;
                    return Ok(Expr {
                        kind: ExprKind::Call { name, args },
                        line,
                    });
                }

                if self.check(TokenKind::LeftBracket) {
                    let mut indices = Vec::new();
                    while self.check(TokenKind::LeftBracket) {
                        self.advance();
                        indices.push(self.expression()?);
                        self.consume(TokenKind::RightBracket, "']'")?;
                    }
                    return Ok(Expr {
                        kind: ExprKind::Index { name, indices },
                        line,
                    });
                }

                Ok(Expr {
                    kind: ExprKind::Identifier { name },
                    line,
                })
            }

            _ => Err(self.error_expected("an expression")),
        }
    }
}
