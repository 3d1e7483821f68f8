// Syntax-tree builders shared by the compiler's unit tests

use crate::kismet_compiler::ast::*;
use crate::kismet_compiler::config::CompilerOptions;
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::package::{FormatVersion, Package, PackageIndex};
use crate::kismet_compiler::script::Script;
use crate::kismet_compiler::KismetCompiler;

pub fn at(line: usize) -> SourceSpan {
    SourceSpan::new(line, 1)
}

pub fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, at(1))
}

pub fn ident(name: &str) -> Expr {
    expr(ExprKind::Identifier(name.to_string()))
}

pub fn int(value: i32) -> Expr {
    expr(ExprKind::Literal(Literal::Int(value)))
}

pub fn float(value: f32) -> Expr {
    expr(ExprKind::Literal(Literal::Float(value)))
}

pub fn boolean(value: bool) -> Expr {
    expr(ExprKind::Literal(Literal::Bool(value)))
}

pub fn string(value: &str) -> Expr {
    expr(ExprKind::Literal(Literal::String(value.to_string())))
}

pub fn this() -> Expr {
    expr(ExprKind::This)
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn not(operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op: UnaryOp::Not,
        operand: Box::new(operand),
    })
}

pub fn call(name: &str, arguments: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        name: name.to_string(),
        arguments,
    })
}

pub fn member(owner: Expr, member: Expr) -> Expr {
    expr(ExprKind::Member {
        owner: Box::new(owner),
        member: Box::new(member),
    })
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    expr(ExprKind::Assign {
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn cast(target: TypeRef, operand: Expr) -> Expr {
    expr(ExprKind::Cast {
        target,
        operand: Box::new(operand),
    })
}

pub fn stmt(kind: StmtKind) -> Stmt {
    Stmt { kind, span: at(1) }
}

pub fn exec(e: Expr) -> Stmt {
    stmt(StmtKind::Expression(e))
}

pub fn ret(value: Option<Expr>) -> Stmt {
    stmt(StmtKind::Return(value))
}

pub fn goto(label: &str) -> Stmt {
    stmt(StmtKind::Goto(GotoTarget::Label(label.to_string())))
}

pub fn label(name: &str) -> Stmt {
    stmt(StmtKind::Label(name.to_string()))
}

pub fn if_then(condition: Expr, then: Stmt, otherwise: Option<Stmt>) -> Stmt {
    stmt(StmtKind::If {
        condition,
        then: Box::new(then),
        otherwise: otherwise.map(Box::new),
    })
}

pub fn block(statements: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(Block {
        statements,
        span: at(1),
    }))
}

pub fn var(name: &str, ty: &str) -> VariableDecl {
    VariableDecl {
        name: name.to_string(),
        ty: TypeRef::plain(ty),
        modifiers: Modifiers::default(),
        span: at(1),
    }
}

pub fn typed_var(name: &str, ty: TypeRef) -> VariableDecl {
    VariableDecl {
        name: name.to_string(),
        ty,
        modifiers: Modifiers::default(),
        span: at(1),
    }
}

pub fn local(name: &str, ty: &str) -> Stmt {
    stmt(StmtKind::VariableDeclaration(var(name, ty)))
}

pub fn param(name: &str, ty: &str) -> ParameterDecl {
    ParameterDecl {
        name: name.to_string(),
        ty: TypeRef::plain(ty),
        is_out: false,
        attributes: Vec::new(),
        span: at(1),
    }
}

pub fn procedure(name: &str, parameters: Vec<ParameterDecl>, body: Vec<Stmt>) -> ProcedureDecl {
    ProcedureDecl {
        name: name.to_string(),
        modifiers: Modifiers::default(),
        return_type: None,
        parameters,
        body: Some(Block {
            statements: body,
            span: at(1),
        }),
        span: at(1),
    }
}

pub fn external_procedure(name: &str, modifiers: Modifiers) -> ProcedureDecl {
    ProcedureDecl {
        name: name.to_string(),
        modifiers,
        return_type: None,
        parameters: Vec::new(),
        body: None,
        span: at(1),
    }
}

pub fn class(name: &str, base: Option<&str>, members: Vec<Declaration>) -> ClassDecl {
    ClassDecl {
        name: name.to_string(),
        base: base.map(str::to_string),
        kind: ClassKind::Class,
        modifiers: Modifiers::default(),
        members,
        span: at(1),
    }
}

pub fn unit(declarations: Vec<Declaration>) -> CompilationUnit {
    CompilationUnit {
        imports: Vec::new(),
        declarations,
    }
}

/// Package holding the engine's math library with a couple of functions already imported
pub fn engine_package() -> Package {
    let mut package = Package::new("/Game/Test", FormatVersion::default());
    let engine = package.import("/Script/CoreUObject", "Package", "/Script/Engine", PackageIndex::NULL);
    let math = package.import("/Script/CoreUObject", "Class", "KismetMathLibrary", engine);
    package.import("/Script/CoreUObject", "Function", "Add_IntInt", math);
    package.import("/Script/CoreUObject", "Function", "Greater_IntInt", math);
    package
}

pub fn compile(unit: &CompilationUnit, package: &mut Package) -> Result<Script, CompilerError> {
    KismetCompiler::new(CompilerOptions::default()).compile(unit, package)
}

pub fn compile_with(
    unit: &CompilationUnit,
    package: &mut Package,
    options: CompilerOptions,
) -> Result<Script, CompilerError> {
    KismetCompiler::new(options).compile(unit, package)
}
