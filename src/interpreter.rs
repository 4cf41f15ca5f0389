//! Resumable tree-walking interpreter.
//!
//! Execution is a state machine over an explicit frame stack that mirrors
//! the language's own call stack. Each `advance` runs until the next event
//! is ready, then suspends. Expressions never suspend: calls reached from
//! expression context run synchronously and emit no events.

pub mod event;
pub mod scope;
pub mod value;

use crate::interpreter::event::{Event, InputType};
use crate::interpreter::scope::Scope;
use crate::interpreter::value::Value;
use crate::parser::ast::{
    BinOp, Block, Callable, Expr, ExprKind, IoDir, Literal, Program, Stmt, StmtKind, UnOp,
};
use std::collections::HashMap;

// Outcome of the synchronous executor: either fall through or unwind one
// activation with the pending return value.
enum Flow {
    Normal,
    Return(Option<Value>),
}

// One suspended position in the walk.
enum Frame<'p> {
    // Cursor over a block's statements
    Block { stmts: &'p [Stmt], index: usize },
    // A statement whose Step has been emitted; effects pending
    Ready { stmt: &'p Stmt },
    // Re-announced at the header line before every condition evaluation
    WhileLoop {
        condition: &'p Expr,
        body: &'p Block,
        line: usize,
        announced: bool,
    },
    // Header evaluated once at entry; the loop variable aliases its
    // declaring cell
    ForLoop {
        var: &'p str,
        end: f64,
        step: f64,
        body: &'p Block,
        line: usize,
        announced: bool,
    },
    // Cursor over Read arguments, one Input event each
    ReadArgs { args: &'p [Expr], index: usize },
    // Pops the activation scope when the body completes without Return
    CallReturn,
}

struct PendingInput {
    name: String,
    indices: Vec<f64>,
    expected: InputType,
}

pub struct Interpreter<'p> {
    functions: HashMap<String, &'p Callable>,
    scopes: Vec<Scope>,
    frames: Vec<Frame<'p>>,
    pending: Option<PendingInput>,
    staged_error: Option<String>,
    finished: bool,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program) -> Self {
        let mut functions: HashMap<String, &'p Callable> = HashMap::new();
        let mut staged_error = None;
        for callable in &program.callables {
            let key = callable.name().to_ascii_lowercase();
            if functions.insert(key, callable).is_some() && staged_error.is_none() {
                staged_error = Some(format!(
                    "'{}' is declared more than once.",
                    callable.name()
                ));
            }
        }

        let mut globals = Scope::new();
        for decl in &program.vars {
            for name in &decl.names {
                globals.define(name.clone(), value::materialize(decl.ty, &decl.dims));
            }
        }

        Interpreter {
            functions,
            scopes: vec![globals],
            frames: vec![Frame::Block {
                stmts: &program.body.stmts,
                index: 0,
            }],
            pending: None,
            staged_error,
            finished: false,
        }
    }

    /// Runs until the next event. `reply` is only read when the previous
    /// event was an `Input`.
    pub fn advance(&mut self, reply: Option<&str>) -> Event {
        if self.finished {
            return Event::Done;
        }
        if let Some(message) = self.staged_error.take() {
            return self.fail(message);
        }
        if let Some(pending) = self.pending.take() {
            match value::parse_input(reply.unwrap_or(""), pending.expected) {
                Ok(v) => {
                    if let Err(message) = self.store(&pending.name, &pending.indices, v) {
                        return self.fail(message);
                    }
                }
                Err(message) => return self.fail(message),
            }
        }
        self.run()
    }

    fn run(&mut self) -> Event {
        loop {
            let frame = match self.frames.pop() {
                Some(frame) => frame,
                None => {
                    self.finished = true;
                    return Event::Done;
                }
            };

            match frame {
                Frame::Block { stmts, index } => {
                    if index >= stmts.len() {
                        continue;
                    }
                    let stmt = &stmts[index];
                    self.frames.push(Frame::Block {
                        stmts,
                        index: index + 1,
                    });
                    self.frames.push(Frame::Ready { stmt });
                    return Event::Step {
                        line: stmt.line,
                        snapshot: self.snapshot(),
                    };
                }

                Frame::Ready { stmt } => match self.execute(stmt) {
                    Ok(Some(event)) => return event,
                    Ok(None) => {}
                    Err(message) => return self.fail(message),
                },

                Frame::WhileLoop {
                    condition,
                    body,
                    line,
                    announced,
                } => {
                    if !announced {
                        self.frames.push(Frame::WhileLoop {
                            condition,
                            body,
                            line,
                            announced: true,
                        });
                        return Event::Step {
                            line,
                            snapshot: self.snapshot(),
                        };
                    }
                    match self.eval(condition) {
                        Ok(Value::Bool(true)) => {
                            self.frames.push(Frame::WhileLoop {
                                condition,
                                body,
                                line,
                                announced: false,
                            });
                            self.frames.push(Frame::Block {
                                stmts: &body.stmts,
                                index: 0,
                            });
                        }
                        Ok(Value::Bool(false)) => {}
                        Ok(_) => return self.fail("Condition is not a boolean.".to_string()),
                        Err(message) => return self.fail(message),
                    }
                }

                Frame::ForLoop {
                    var,
                    end,
                    step,
                    body,
                    line,
                    announced,
                } => {
                    if !announced {
                        // Body finished: bump the loop variable, then
                        // announce the next test at the header line
                        if let Err(message) = self.bump_loop_var(var, step) {
                            return self.fail(message);
                        }
                        self.frames.push(Frame::ForLoop {
                            var,
                            end,
                            step,
                            body,
                            line,
                            announced: true,
                        });
                        return Event::Step {
                            line,
                            snapshot: self.snapshot(),
                        };
                    }
                    let current = match self.numeric_loop_var(var) {
                        Ok(n) => n,
                        Err(message) => return self.fail(message),
                    };
                    let done = if step >= 0.0 {
                        current > end
                    } else {
                        current < end
                    };
                    if !done {
                        self.frames.push(Frame::ForLoop {
                            var,
                            end,
                            step,
                            body,
                            line,
                            announced: false,
                        });
                        self.frames.push(Frame::Block {
                            stmts: &body.stmts,
                            index: 0,
                        });
                    }
                }

                Frame::ReadArgs { args, index } => {
                    if index >= args.len() {
                        continue;
                    }
                    self.frames.push(Frame::ReadArgs {
                        args,
                        index: index + 1,
                    });
                    match self.prepare_input(&args[index]) {
                        Ok(event) => return event,
                        Err(message) => return self.fail(message),
                    }
                }

                Frame::CallReturn => {
                    self.scopes.pop();
                }
            }
        }
    }

    fn fail(&mut self, message: String) -> Event {
        self.finished = true;
        Event::Error(message)
    }

    /// Deep copy of every live variable, inner scopes overriding outer.
    fn snapshot(&self) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for scope in &self.scopes {
            for (name, value) in scope.vars() {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    // Applies one statement's effects. Pushes frames for anything that has
    // to suspend; returns the event to deliver, if any.
    fn execute(&mut self, stmt: &'p Stmt) -> Result<Option<Event>, String> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let mut indices = Vec::with_capacity(target.indices.len());
                for expr in &target.indices {
                    indices.push(self.index_value(expr)?);
                }
                let v = self.eval(value)?;
                self.store(&target.name, &indices, v)?;
                Ok(None)
            }

            StmtKind::Io { dir, args } => match dir {
                IoDir::Write => {
                    let mut parts = Vec::with_capacity(args.len());
                    for arg in args {
                        let v = self.eval(arg)?;
                        parts.push(value::format(&v));
                    }
                    Ok(Some(Event::Output(parts.join(" "))))
                }
                IoDir::Read => {
                    self.frames.push(Frame::ReadArgs { args, index: 0 });
                    Ok(None)
                }
            },

            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                match self.eval(condition)? {
                    Value::Bool(true) => self.frames.push(Frame::Block {
                        stmts: &then_block.stmts,
                        index: 0,
                    }),
                    Value::Bool(false) => {
                        if let Some(block) = else_block {
                            self.frames.push(Frame::Block {
                                stmts: &block.stmts,
                                index: 0,
                            });
                        }
                    }
                    _ => return Err("Condition is not a boolean.".to_string()),
                }
                Ok(None)
            }

            StmtKind::While { condition, body } => {
                // The Step just emitted for this statement announces the
                // first condition evaluation
                self.frames.push(Frame::WhileLoop {
                    condition,
                    body,
                    line: stmt.line,
                    announced: true,
                });
                Ok(None)
            }

            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let (end_v, step_v) = self.setup_for(var, start, end, step.as_ref())?;
                self.frames.push(Frame::ForLoop {
                    var,
                    end: end_v,
                    step: step_v,
                    body,
                    line: stmt.line,
                    announced: true,
                });
                Ok(None)
            }

            StmtKind::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                let callable = self.lookup_callable(name)?;
                self.enter(callable, &values, name)?;
                self.frames.push(Frame::CallReturn);
                self.frames.push(Frame::Block {
                    stmts: &callable.body().stmts,
                    index: 0,
                });
                Ok(None)
            }

            StmtKind::Return { value } => {
                let ret = match value {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                // Unwind to the nearest activation, stash the pending value
                // on its scope, pop it
                loop {
                    match self.frames.pop() {
                        Some(Frame::CallReturn) => {
                            if let Some(scope) = self.scopes.last_mut() {
                                scope.set_return(ret);
                            }
                            self.scopes.pop();
                            break;
                        }
                        Some(_) => {}
                        None => {
                            return Err(
                                "'Return' outside of a function or procedure.".to_string()
                            );
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    fn prepare_input(&mut self, arg: &'p Expr) -> Result<Event, String> {
        let (name, index_exprs): (&str, &[Expr]) = match &arg.kind {
            ExprKind::Identifier { name } => (name, &[]),
            ExprKind::Index { name, indices } => (name, indices),
            _ => return Err("'Read' arguments must be variables.".to_string()),
        };

        let mut indices = Vec::with_capacity(index_exprs.len());
        for expr in index_exprs {
            indices.push(self.index_value(expr)?);
        }

        let expected = match self.peek_cell(name, &indices)? {
            Value::Real(_) => InputType::Number,
            Value::Bool(_) => InputType::Boolean,
            Value::Str(_) => InputType::Text,
            Value::Array { .. } => return Err(format!("Cannot read into array '{}'.", name)),
        };

        let display = display_target(name, &indices);
        self.pending = Some(PendingInput {
            name: name.to_string(),
            indices,
            expected,
        });
        Ok(Event::Input {
            name: display,
            expected,
        })
    }

    // ---- name resolution ----

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    fn lookup_callable(&self, name: &str) -> Result<&'p Callable, String> {
        self.functions
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| format!("Unknown procedure/function '{}'.", name))
    }

    fn peek_cell(&self, name: &str, indices: &[f64]) -> Result<&Value, String> {
        let mut cell = self
            .lookup(name)
            .ok_or_else(|| format!("Variable '{}' not declared.", name))?;
        for &n in indices {
            cell = match cell {
                Value::Array { items, .. } => {
                    let idx = array_index(n, items.len())?;
                    &items[idx]
                }
                _ => return Err(format!("'{}' is not an array.", name)),
            };
        }
        Ok(cell)
    }

    fn store(&mut self, name: &str, indices: &[f64], value: Value) -> Result<(), String> {
        let mut cell = self
            .lookup_mut(name)
            .ok_or_else(|| format!("Variable '{}' not declared.", name))?;
        for &n in indices {
            cell = match cell {
                Value::Array { items, .. } => {
                    let idx = array_index(n, items.len())?;
                    &mut items[idx]
                }
                _ => return Err(format!("'{}' is not an array.", name)),
            };
        }
        *cell = value;
        Ok(())
    }

    // ---- loops ----

    /// Evaluates the `For` header once, checks the loop variable and sets
    /// it to the start value. Returns (end, step).
    fn setup_for(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
    ) -> Result<(f64, f64), String> {
        let start_v = self.numeric_expr(start, "'For' start value")?;
        let end_v = self.numeric_expr(end, "'For' end value")?;
        let step_v = match step {
            Some(expr) => self.numeric_expr(expr, "'For' step value")?,
            None => 1.0,
        };

        match self.lookup(var) {
            None => return Err(format!("Variable '{}' not declared.", var)),
            Some(Value::Real(_)) => {}
            Some(_) => return Err(format!("For loop variable '{}' must be numeric.", var)),
        }
        self.store(var, &[], Value::Real(start_v))?;
        Ok((end_v, step_v))
    }

    fn numeric_loop_var(&self, var: &str) -> Result<f64, String> {
        match self.lookup(var) {
            Some(Value::Real(n)) => Ok(*n),
            Some(_) => Err(format!("For loop variable '{}' must be numeric.", var)),
            None => Err(format!("Variable '{}' not declared.", var)),
        }
    }

    fn bump_loop_var(&mut self, var: &str, step: f64) -> Result<(), String> {
        let current = self.numeric_loop_var(var)?;
        self.store(var, &[], Value::Real(current + step))
    }

    // ---- calls ----

    fn enter(&mut self, callable: &Callable, args: &[Value], call_name: &str) -> Result<(), String> {
        let params = callable.params();
        if params.len() != args.len() {
            return Err(format!(
                "'{}' expects {} arguments, got {}.",
                call_name,
                params.len(),
                args.len()
            ));
        }

        let mut scope = Scope::new();
        for (param, value) in params.iter().zip(args) {
            scope.define(param.name.clone(), value.clone());
        }
        for decl in callable.locals() {
            for name in &decl.names {
                scope.define(name.clone(), value::materialize(decl.ty, &decl.dims));
            }
        }
        self.scopes.push(scope);
        Ok(())
    }

    // Synchronous call, used from expression context and by the
    // synchronous executor itself. No events are emitted.
    fn call_sync(
        &mut self,
        callable: &'p Callable,
        args: &[Value],
        call_name: &str,
    ) -> Result<Option<Value>, String> {
        self.enter(callable, args, call_name)?;
        let flow = self.exec_block_sync(callable.body());
        let mut scope = match self.scopes.pop() {
            Some(scope) => scope,
            None => return Err("System Error: call scope missing.".to_string()),
        };
        match flow? {
            Flow::Return(v) => {
                scope.set_return(v);
                Ok(scope.take_return())
            }
            Flow::Normal => Ok(None),
        }
    }

    // ---- synchronous executor (expression-mode bodies) ----

    fn exec_block_sync(&mut self, block: &Block) -> Result<Flow, String> {
        for stmt in &block.stmts {
            if let Flow::Return(v) = self.exec_sync(stmt)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_sync(&mut self, stmt: &Stmt) -> Result<Flow, String> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let mut indices = Vec::with_capacity(target.indices.len());
                for expr in &target.indices {
                    indices.push(self.index_value(expr)?);
                }
                let v = self.eval(value)?;
                self.store(&target.name, &indices, v)?;
                Ok(Flow::Normal)
            }

            // I/O inside expression-called bodies is silently skipped
            StmtKind::Io { .. } => Ok(Flow::Normal),

            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => match self.eval(condition)? {
                Value::Bool(true) => self.exec_block_sync(then_block),
                Value::Bool(false) => match else_block {
                    Some(block) => self.exec_block_sync(block),
                    None => Ok(Flow::Normal),
                },
                _ => Err("Condition is not a boolean.".to_string()),
            },

            StmtKind::While { condition, body } => {
                loop {
                    match self.eval(condition)? {
                        Value::Bool(true) => {
                            if let Flow::Return(v) = self.exec_block_sync(body)? {
                                return Ok(Flow::Return(v));
                            }
                        }
                        Value::Bool(false) => break,
                        _ => return Err("Condition is not a boolean.".to_string()),
                    }
                }
                Ok(Flow::Normal)
            }

            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let (end_v, step_v) = self.setup_for(var, start, end, step.as_ref())?;
                loop {
                    let current = self.numeric_loop_var(var)?;
                    let done = if step_v >= 0.0 {
                        current > end_v
                    } else {
                        current < end_v
                    };
                    if done {
                        break;
                    }
                    if let Flow::Return(v) = self.exec_block_sync(body)? {
                        return Ok(Flow::Return(v));
                    }
                    self.bump_loop_var(var, step_v)?;
                }
                Ok(Flow::Normal)
            }

            StmtKind::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                let callable = self.lookup_callable(name)?;
                self.call_sync(callable, &values, name)?;
                Ok(Flow::Normal)
            }

            StmtKind::Return { value } => {
                let v = match value {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                Ok(Flow::Return(v))
            }
        }
    }

    // ---- expression evaluation ----

    fn eval(&mut self, expr: &Expr) -> Result<Value, String> {
        match &expr.kind {
            ExprKind::Literal(Literal::Number(n)) => Ok(Value::Real(*n)),
            ExprKind::Literal(Literal::Text(s)) => Ok(Value::Str(s.clone())),

            ExprKind::Identifier { name } => {
                // True/False are identifiers lexically, constants here
                if name.eq_ignore_ascii_case("true") {
                    return Ok(Value::Bool(true));
                }
                if name.eq_ignore_ascii_case("false") {
                    return Ok(Value::Bool(false));
                }
                self.lookup(name)
                    .cloned()
                    .ok_or_else(|| format!("Variable '{}' not declared.", name))
            }

            ExprKind::Index { name, indices } => {
                let mut idxs = Vec::with_capacity(indices.len());
                for expr in indices {
                    idxs.push(self.index_value(expr)?);
                }
                Ok(self.peek_cell(name, &idxs)?.clone())
            }

            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match (op, v) {
                    (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnOp::Neg, Value::Real(n)) => Ok(Value::Real(-n)),
                    (op, v) => Err(format!("Cannot apply '{}' to {}.", op, v.kind_name())),
                }
            }

            ExprKind::Binary { left, op, right } => {
                if matches!(op, BinOp::And | BinOp::Or) {
                    return self.eval_logical(*op, left, right);
                }
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                apply_binary(*op, l, r)
            }

            ExprKind::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                let callable = self.lookup_callable(name)?;
                match self.call_sync(callable, &values, name)? {
                    Some(v) => Ok(v),
                    None => Err(format!("'{}' did not return a value.", name)),
                }
            }
        }
    }

    fn eval_logical(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value, String> {
        let l = match self.eval(left)? {
            Value::Bool(b) => b,
            other => return Err(format!("Cannot apply '{}' to {}.", op, other.kind_name())),
        };
        // short-circuit
        match (op, l) {
            (BinOp::And, false) => return Ok(Value::Bool(false)),
            (BinOp::Or, true) => return Ok(Value::Bool(true)),
            _ => {}
        }
        match self.eval(right)? {
            Value::Bool(b) => Ok(Value::Bool(b)),
            other => Err(format!("Cannot apply '{}' to {}.", op, other.kind_name())),
        }
    }

    fn index_value(&mut self, expr: &Expr) -> Result<f64, String> {
        match self.eval(expr)? {
            Value::Real(n) => Ok(n),
            other => Err(format!(
                "Array index must be a number, got {}.",
                other.kind_name()
            )),
        }
    }

    fn numeric_expr(&mut self, expr: &Expr, what: &str) -> Result<f64, String> {
        match self.eval(expr)? {
            Value::Real(n) => Ok(n),
            other => Err(format!("{} must be a number, got {}.", what, other.kind_name())),
        }
    }
}

fn apply_binary(op: BinOp, l: Value, r: Value) -> Result<Value, String> {
    use Value::{Bool, Real, Str};
    match (op, l, r) {
        // arithmetic; division by zero propagates inf/NaN untrapped
        (BinOp::Add, Real(a), Real(b)) => Ok(Real(a + b)),
        (BinOp::Sub, Real(a), Real(b)) => Ok(Real(a - b)),
        (BinOp::Mul, Real(a), Real(b)) => Ok(Real(a * b)),
        (BinOp::Div, Real(a), Real(b)) => Ok(Real(a / b)),
        (BinOp::IntDiv, Real(a), Real(b)) => Ok(Real((a / b).floor())),
        (BinOp::Mod, Real(a), Real(b)) => Ok(Real(a % b)),

        // structural equality on scalars
        (BinOp::Eq, a, b) => Ok(Bool(a == b)),
        (BinOp::NotEq, a, b) => Ok(Bool(a != b)),

        (BinOp::Less, Real(a), Real(b)) => Ok(Bool(a < b)),
        (BinOp::LessEq, Real(a), Real(b)) => Ok(Bool(a <= b)),
        (BinOp::Greater, Real(a), Real(b)) => Ok(Bool(a > b)),
        (BinOp::GreaterEq, Real(a), Real(b)) => Ok(Bool(a >= b)),

        (BinOp::Less, Str(a), Str(b)) => Ok(Bool(a < b)),
        (BinOp::LessEq, Str(a), Str(b)) => Ok(Bool(a <= b)),
        (BinOp::Greater, Str(a), Str(b)) => Ok(Bool(a > b)),
        (BinOp::GreaterEq, Str(a), Str(b)) => Ok(Bool(a >= b)),

        (op, l, r) => Err(format!(
            "Cannot apply '{}' to {} and {}.",
            op,
            l.kind_name(),
            r.kind_name()
        )),
    }
}

fn array_index(n: f64, len: usize) -> Result<usize, String> {
    if !(n.fract() == 0.0 && n >= 0.0 && n < len as f64) {
        return Err(format!("Index {} out of bounds.", value::format_number(n)));
    }
    Ok(n as usize)
}

fn display_target(name: &str, indices: &[f64]) -> String {
    let mut out = String::from(name);
    for &n in indices {
        out.push('[');
        out.push_str(&value::format_number(n));
        out.push(']');
    }
    out
}
