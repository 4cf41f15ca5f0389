use std::fmt;

#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub vars: Vec<VarDecl>,
    pub callables: Vec<Callable>,
    pub body: Block,
    pub line: usize,
}

/// One `a, b, c : array [2] [3] of Integer` line. `dims` is empty for
/// scalars.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub names: Vec<String>,
    pub ty: BaseType,
    pub dims: Vec<usize>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Integer,
    Real,
    Boolean,
    String,
    Char,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: BaseType,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: BaseType,
    pub locals: Vec<VarDecl>,
    pub body: Block,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ProcedureDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub locals: Vec<VarDecl>,
    pub body: Block,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum Callable {
    Function(FunctionDecl),
    Procedure(ProcedureDecl),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Function(f) => &f.name,
            Callable::Procedure(p) => &p.name,
        }
    }

    pub fn params(&self) -> &[Param] {
        match self {
            Callable::Function(f) => &f.params,
            Callable::Procedure(p) => &p.params,
        }
    }

    pub fn locals(&self) -> &[VarDecl] {
        match self {
            Callable::Function(f) => &f.locals,
            Callable::Procedure(p) => &p.locals,
        }
    }

    pub fn body(&self) -> &Block {
        match self {
            Callable::Function(f) => &f.body,
            Callable::Procedure(p) => &p.body,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Assign {
        target: Ref,
        value: Expr,
    },
    If {
        condition: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    For {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Block,
    },
    Io {
        dir: IoDir,
        args: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Return {
        value: Option<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDir {
    Read,
    Write,
}

/// Assignment target: a plain name or an indexed access.
#[derive(Debug, Clone)]
pub struct Ref {
    pub name: String,
    pub indices: Vec<Expr>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Literal(Literal),
    Identifier {
        name: String,
    },
    Index {
        name: String,
        indices: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone)]
pub enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,    // real division, /
    IntDiv, // floor division, the Div word operator
    Mod,
    And,
    Or,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "Div",
            BinOp::Mod => "Mod",
            BinOp::And => "And",
            BinOp::Or => "Or",
            BinOp::Eq => "=",
            BinOp::NotEq => "<>",
            BinOp::Less => "<",
            BinOp::LessEq => "<=",
            BinOp::Greater => ">",
            BinOp::GreaterEq => ">=",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "Not"),
        }
    }
}
