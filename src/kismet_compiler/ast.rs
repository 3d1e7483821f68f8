// Syntax tree consumed by the Kismet script compiler
//
// The front end (lexer/parser) produces these nodes. Every declaration, statement and
// expression carries a SourceSpan so diagnostics can point back at the source.

use crate::kismet_compiler::error::CompilerError;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SourceSpan {
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
}

impl SourceSpan {
    pub fn new(line: usize, column: usize) -> Self {
        SourceSpan { line, column }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilationUnit {
    #[serde(default)]
    pub imports: Vec<ImportDecl>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

impl CompilationUnit {
    /// Read a unit serialized by the front end
    pub fn from_toml_str(text: &str) -> Result<Self, CompilerError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CompilerError> {
        let unit = Self::from_toml_str(&fs::read_to_string(path)?)?;
        log::debug!(
            "AST: loaded {} declarations, {} imports",
            unit.declarations.len(),
            unit.imports.len()
        );
        Ok(unit)
    }
}

/// Declarations owned by another package; everything inside is external
#[derive(Debug, Clone, Deserialize)]
pub struct ImportDecl {
    pub package: String,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Deserialize)]
pub enum Declaration {
    Class(ClassDecl),
    Procedure(ProcedureDecl),
    Variable(VariableDecl),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Class(c) => &c.name,
            Declaration::Procedure(p) => &p.name,
            Declaration::Variable(v) => &v.name,
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            Declaration::Class(c) => c.span,
            Declaration::Procedure(p) => p.span,
            Declaration::Variable(v) => v.span,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ClassKind {
    #[default]
    Class,
    Struct,
    Interface,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub members: Vec<Declaration>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_sealed: bool,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl Modifiers {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureDecl {
    pub name: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub return_type: Option<TypeRef>,
    #[serde(default)]
    pub parameters: Vec<ParameterDecl>,
    #[serde(default)]
    pub body: Option<Block>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub is_out: bool,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub span: SourceSpan,
}

impl ParameterDecl {
    /// The out-parameter that carries the procedure's return value
    pub fn is_return(&self) -> bool {
        self.is_out && self.attributes.iter().any(|a| a == "Return")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub span: SourceSpan,
}

/// A declared type: either a plain name (`int`, `Actor`) or a constructed
/// generic with one argument (`Struct<Vector>`, `Class<Actor>`, `Array<int>`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypeRef {
    pub name: String,
    #[serde(default)]
    pub argument: Option<Box<TypeRef>>,
}

impl TypeRef {
    pub fn plain(name: &str) -> Self {
        TypeRef {
            name: name.to_string(),
            argument: None,
        }
    }

    pub fn generic(name: &str, argument: TypeRef) -> Self {
        TypeRef {
            name: name.to_string(),
            argument: Some(Box::new(argument)),
        }
    }

    pub fn is_constructed(&self) -> bool {
        self.argument.is_some()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.argument {
            Some(arg) => write!(f, "{}<{}>", self.name, arg),
            None => write!(f, "{}", self.name),
        }
    }
}

// Statements

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub statements: Vec<Stmt>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Deserialize)]
pub enum StmtKind {
    Block(Block),
    Expression(Expr),
    VariableDeclaration(VariableDecl),
    /// `name:` marks the position of the statement that follows
    Label(String),
    If {
        condition: Expr,
        then: Box<Stmt>,
        #[serde(default)]
        otherwise: Option<Box<Stmt>>,
    },
    Goto(GotoTarget),
    Return(Option<Expr>),
}

#[derive(Debug, Clone, Deserialize)]
pub enum GotoTarget {
    Label(String),
    Computed(Expr),
}

// Expressions

#[derive(Debug, Clone, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default)]
    pub span: SourceSpan,
}

impl Expr {
    pub fn new(kind: ExprKind, span: SourceSpan) -> Self {
        Expr { kind, span }
    }

    /// The identifier text if this is a bare identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
    Name(String),
    Byte(u8),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::BitNot => write!(f, "~"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchCase {
    pub value: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    This,
    Base,
    /// `owner.member`, where member is an identifier or a call
    Member {
        owner: Box<Expr>,
        member: Box<Expr>,
    },
    Call {
        name: String,
        #[serde(default)]
        arguments: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    CompoundAssign {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Increment {
        operand: Box<Expr>,
        prefix: bool,
    },
    Decrement {
        operand: Box<Expr>,
        prefix: bool,
    },
    Cast {
        target: TypeRef,
        operand: Box<Expr>,
    },
    InitializerList(Vec<Expr>),
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    SwitchValue {
        index: Box<Expr>,
        cases: Vec<SwitchCase>,
        default: Box<Expr>,
    },
}
