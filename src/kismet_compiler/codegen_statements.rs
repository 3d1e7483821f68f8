// Statement compilation and control flow
//
// Statements lower to primary instructions appended to the current function.
// Structured control flow (if/else) becomes conditional and unconditional jumps to
// synthetic labels; every `return` funnels through the procedure's return label so
// the function always ends in exactly one Return followed by EndOfScript.

use crate::kismet_compiler::ast::*;
use crate::kismet_compiler::bytecode::{CodeOffset, Instruction};
use crate::kismet_compiler::codegen::ScriptCompiler;
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::scope::{Scope, ScopeKind};
use crate::kismet_compiler::symbols::{SymbolCategory, SymbolId, SymbolKind};
use crate::kismet_compiler::value_kind::ValueKind;

const EX_RETURN: &str = "EX_Return";
const EX_END_OF_SCRIPT: &str = "EX_EndOfScript";

impl<'a> ScriptCompiler<'a> {
    /// Compile a procedure body, closing it with the return epilogue
    pub(crate) fn compile_body(&mut self, body: &Block) -> Result<(), CompilerError> {
        let statements = body.statements.as_slice();

        // Bodies written against the raw instruction set carry their own epilogue
        if ends_with_epilogue(statements) {
            log::debug!("CODEGEN: body supplies its own {} / {}", EX_RETURN, EX_END_OF_SCRIPT);
            let (rest, epilogue) = statements.split_at(statements.len() - 2);
            for statement in rest {
                self.compile_statement(statement)?;
            }
            let return_label = self.state()?.return_label;
            self.resolve_label(return_label, body.span)?;
            for statement in epilogue {
                self.compile_statement(statement)?;
            }
            return Ok(());
        }

        match statements.split_last() {
            Some((
                Stmt {
                    kind: StmtKind::Return(value),
                    span,
                },
                rest,
            )) => {
                for statement in rest {
                    self.compile_statement(statement)?;
                }
                self.compile_epilogue(value.as_ref(), *span)
            }
            _ => {
                for statement in statements {
                    self.compile_statement(statement)?;
                }
                self.compile_epilogue(None, body.span)
            }
        }
    }

    fn compile_epilogue(&mut self, value: Option<&Expr>, span: SourceSpan) -> Result<(), CompilerError> {
        if let Some(value) = value {
            self.compile_return_value(value, span)?;
        }
        let return_label = self.state()?.return_label;
        self.resolve_label(return_label, span)?;

        let returned = match self.return_parameter() {
            Some(parameter) => Instruction::LocalOutVariable(self.variable_pointer(parameter)?),
            None => Instruction::Nothing,
        };
        self.emit("return", span, Instruction::Return(Box::new(returned)))?;
        self.emit("end of script", span, Instruction::EndOfScript)
    }

    fn return_parameter(&self) -> Option<SymbolId> {
        let procedure = self.current_procedure()?;
        match &self.symbols.get(procedure).kind {
            SymbolKind::Procedure { return_parameter, .. } => *return_parameter,
            _ => None,
        }
    }

    /// Store a returned value into the return parameter
    fn compile_return_value(&mut self, value: &Expr, span: SourceSpan) -> Result<(), CompilerError> {
        let parameter = self
            .return_parameter()
            .ok_or_else(|| CompilerError::unexpected("return value of a procedure without result", &value.kind, span))?;
        let pointer = self.variable_pointer(parameter)?;
        let is_bool = self
            .symbols
            .get(parameter)
            .declared_type()
            .map_or(false, |ty| ValueKind::from_type(ty) == ValueKind::Bool);

        let variable = Box::new(Instruction::LocalOutVariable(pointer.clone()));
        let expression = Box::new(self.with_rvalue(pointer.clone(), |c| c.compile_expression(value))?);
        let instruction = if is_bool {
            Instruction::LetBool { variable, expression }
        } else {
            Instruction::Let {
                value: pointer,
                variable,
                expression,
            }
        };
        self.emit("return value", span, instruction)
    }

    pub(crate) fn compile_statement(&mut self, statement: &Stmt) -> Result<(), CompilerError> {
        let span = statement.span;
        match &statement.kind {
            StmtKind::Block(block) => {
                let scope = Scope::new(ScopeKind::Block, self.current_procedure());
                self.with_scope(scope, |c| {
                    for statement in &block.statements {
                        c.compile_statement(statement)?;
                    }
                    Ok(())
                })
            }
            StmtKind::Expression(expr) => {
                let instruction = self.compile_expression(expr)?;
                self.emit("expression", span, instruction)
            }
            StmtKind::VariableDeclaration(variable) => {
                // Top-level locals were declared with the procedure
                if self.scopes.innermost().kind != ScopeKind::Procedure {
                    self.declare_block_variable(variable)?;
                }
                Ok(())
            }
            StmtKind::Label(name) => {
                let label = self.label_named(name, span)?;
                self.resolve_label(label, span)
            }
            StmtKind::If {
                condition,
                then,
                otherwise,
            } => self.compile_if(condition, then, otherwise.as_deref(), span),
            StmtKind::Goto(GotoTarget::Label(name)) => {
                let label = self.label_named(name, span)?;
                let target = self.label_offset(label);
                self.emit("goto", span, Instruction::Jump(target))
            }
            StmtKind::Goto(GotoTarget::Computed(expr)) => {
                let target = self.compile_expression(expr)?;
                self.emit("computed goto", span, Instruction::ComputedJump(Box::new(target)))
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.compile_return_value(value, span)?;
                }
                let target = self.label_offset(self.state()?.return_label);
                self.emit("return", span, Instruction::Jump(target))
            }
        }
    }

    pub(crate) fn label_named(&self, name: &str, span: SourceSpan) -> Result<SymbolId, CompilerError> {
        self.scopes
            .lookup(&self.symbols, name, Some(SymbolCategory::Label))
            .or_else(|| {
                self.current_procedure()
                    .and_then(|p| self.symbols.member_named(p, name, Some(SymbolCategory::Label)))
            })
            .ok_or_else(|| CompilerError::UnknownSymbol {
                name: name.to_string(),
                span,
            })
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
        span: SourceSpan,
    ) -> Result<(), CompilerError> {
        // `if (!x) goto L;` and `if (!x) return;` are a single conditional jump
        if otherwise.is_none() {
            if let ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } = &condition.kind
            {
                if let Some(target) = self.jump_target(then)? {
                    let condition = Box::new(self.compile_expression(operand)?);
                    return self.emit("if not goto", span, Instruction::JumpIfNot { target, condition });
                }
            }
        }

        let end = self.synthetic_label("if_end", span);
        let else_label = otherwise.map(|_| self.synthetic_label("else", span));
        let condition = Box::new(self.compile_expression(condition)?);
        self.emit(
            "if",
            span,
            Instruction::JumpIfNot {
                target: CodeOffset::Pending(else_label.unwrap_or(end)),
                condition,
            },
        )?;
        self.compile_statement(then)?;

        if let (Some(otherwise), Some(else_label)) = (otherwise, else_label) {
            self.emit("else", span, Instruction::Jump(CodeOffset::Pending(end)))?;
            self.resolve_label(else_label, span)?;
            self.compile_statement(otherwise)?;
        }
        self.resolve_label(end, span)
    }

    /// Where a branch that only jumps goes: a plain `goto` or a value-less `return`
    fn jump_target(&self, statement: &Stmt) -> Result<Option<CodeOffset>, CompilerError> {
        match &statement.kind {
            StmtKind::Block(block) if block.statements.len() == 1 => self.jump_target(&block.statements[0]),
            StmtKind::Goto(GotoTarget::Label(name)) => {
                Ok(Some(self.label_offset(self.label_named(name, statement.span)?)))
            }
            StmtKind::Return(None) => Ok(Some(self.label_offset(self.state()?.return_label))),
            _ => Ok(None),
        }
    }
}

fn is_intrinsic_statement(statement: &Stmt, name: &str) -> bool {
    matches!(
        &statement.kind,
        StmtKind::Expression(Expr { kind: ExprKind::Call { name: called, .. }, .. }) if called == name
    )
}

fn ends_with_epilogue(statements: &[Stmt]) -> bool {
    match statements {
        [.., ret, end] => is_intrinsic_statement(ret, EX_RETURN) && is_intrinsic_statement(end, EX_END_OF_SCRIPT),
        _ => false,
    }
}
