// Expression compilation
//
// Every expression compiles to exactly one instruction tree. Operators and
// conversions have no opcodes of their own and become library calls chosen by the
// static value kinds of their operands.

use crate::kismet_compiler::ast::*;
use crate::kismet_compiler::bytecode::*;
use crate::kismet_compiler::codegen::ScriptCompiler;
use crate::kismet_compiler::codegen_context::member_name;
use crate::kismet_compiler::codegen_intrinsics::{intrinsic_kind, is_intrinsic};
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::name_resolver::NameResolver;
use crate::kismet_compiler::package::PackageIndex;
use crate::kismet_compiler::scope::{ContextType, MemberContext};
use crate::kismet_compiler::symbol_builder::bind_placeholder;
use crate::kismet_compiler::symbols::{SymbolCategory, SymbolId, SymbolKind, VariableCategory};
use crate::kismet_compiler::value_kind::{
    binary_operator, conversion, unary_operator, LibraryFunction, ValueKind,
};

impl<'a> ScriptCompiler<'a> {
    pub(crate) fn compile_expression(&mut self, expr: &Expr) -> Result<Instruction, CompilerError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(compile_literal(literal)),
            ExprKind::Identifier(name) => {
                let id = self.resolve(name, None).ok_or_else(|| CompilerError::UnknownSymbol {
                    name: name.clone(),
                    span,
                })?;
                self.compile_symbol(id, span)
            }
            ExprKind::This | ExprKind::Base => Ok(Instruction::SelfObject),
            ExprKind::Member { owner, member } => self.compile_member(owner, member, span),
            ExprKind::Call { name, arguments } => self.compile_call(name, arguments, span),
            ExprKind::Binary { op, left, right } => self.compile_binary(*op, left, right, span),
            ExprKind::Unary { op, operand } => self.compile_unary(*op, operand, span),
            ExprKind::Assign { target, value } => self.compile_assignment(target, value, span),
            ExprKind::CompoundAssign { op, target, value } => {
                let combined = Expr::new(
                    ExprKind::Binary {
                        op: *op,
                        left: target.clone(),
                        right: value.clone(),
                    },
                    span,
                );
                self.compile_assignment(target, &combined, span)
            }
            ExprKind::Increment { operand, .. } => self.compile_step(BinaryOp::Add, operand, span),
            ExprKind::Decrement { operand, .. } => self.compile_step(BinaryOp::Subtract, operand, span),
            ExprKind::Cast { target, operand } => self.compile_cast(target, operand, span),
            ExprKind::InitializerList(_) => Err(CompilerError::unexpected(
                "expression (initializer lists only appear on the right of an assignment)",
                &expr.kind,
                span,
            )),
            ExprKind::Index { array, index } => Ok(Instruction::ArrayGetByRef {
                array: Box::new(self.compile_expression(array)?),
                index: Box::new(self.compile_expression(index)?),
            }),
            ExprKind::SwitchValue {
                index,
                cases,
                default,
            } => {
                let pairs: Vec<(&Expr, &Expr)> = cases.iter().map(|c| (&c.value, &c.result)).collect();
                self.compile_switch_value(index, &pairs, default, span)
            }
        }
    }

    /// Static value kind of an expression, used to pick operator library calls
    pub(crate) fn expression_kind(&mut self, expr: &Expr) -> Result<ValueKind, CompilerError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_kind(literal)),
            ExprKind::Identifier(name) => {
                let id = self.resolve(name, None).ok_or_else(|| CompilerError::UnknownSymbol {
                    name: name.clone(),
                    span,
                })?;
                Ok(self.symbol_kind(id))
            }
            ExprKind::This | ExprKind::Base => Ok(ValueKind::Object),
            ExprKind::Member { owner, member } => {
                let context = self.context_for_member_expression(owner, member_name(member))?;
                match self.with_context(context, |c| c.expression_kind(member)) {
                    // Fields of engine structs the unit never declares
                    Err(CompilerError::UnknownSymbol { .. }) if self.is_undeclared_struct(context) => {
                        Ok(ValueKind::Float)
                    }
                    other => other,
                }
            }
            ExprKind::Call { name, .. } => {
                if is_intrinsic(name) {
                    return Ok(intrinsic_kind(name));
                }
                Ok(self
                    .expression_type(expr)?
                    .map(|ty| ValueKind::from_type(&ty))
                    .unwrap_or(ValueKind::Void))
            }
            ExprKind::Binary { op, left, right } => {
                let (left_kind, right_kind) = (self.expression_kind(left)?, self.expression_kind(right)?);
                binary_operator(*op, left_kind, right_kind)
                    .map(|f| f.result)
                    .ok_or_else(|| unsupported_operator(*op, left_kind, Some(right_kind), span))
            }
            ExprKind::Unary { op, operand } => {
                let kind = self.expression_kind(operand)?;
                match unary_operator(*op, kind) {
                    Some(function) => Ok(function.result),
                    None if *op == UnaryOp::Negate && zero_of(kind).is_some() => Ok(kind),
                    None => Err(unsupported_operator_unary(*op, kind, span)),
                }
            }
            ExprKind::Assign { target, .. } | ExprKind::CompoundAssign { target, .. } => {
                self.expression_kind(target)
            }
            ExprKind::Increment { operand, .. } | ExprKind::Decrement { operand, .. } => {
                self.expression_kind(operand)
            }
            ExprKind::Cast { target, .. } => Ok(ValueKind::from_type(target)),
            ExprKind::InitializerList(_) => Ok(ValueKind::Array),
            ExprKind::Index { .. } => Ok(self
                .expression_type(expr)?
                .map(|ty| ValueKind::from_type(&ty))
                .unwrap_or(ValueKind::Object)),
            ExprKind::SwitchValue { default, .. } => self.expression_kind(default),
        }
    }

    fn symbol_kind(&self, id: SymbolId) -> ValueKind {
        let symbol = self.symbols.get(id);
        match &symbol.kind {
            SymbolKind::Variable {
                category: VariableCategory::This | VariableCategory::Base,
                ..
            } => ValueKind::Object,
            SymbolKind::Variable { declared_type, .. } => ValueKind::from_type(declared_type),
            SymbolKind::Class { .. } => ValueKind::Class,
            SymbolKind::Label { .. } => ValueKind::Int,
            _ => ValueKind::Object,
        }
    }

    fn is_undeclared_struct(&self, context: MemberContext) -> bool {
        context.context_type == ContextType::Struct
            && context.symbol.map_or(true, |s| {
                let symbol = self.symbols.get(s);
                symbol.is_external && symbol.members.is_empty()
            })
    }

    /// Reference to a symbol used as a value
    pub(crate) fn compile_symbol(&mut self, id: SymbolId, span: SourceSpan) -> Result<Instruction, CompilerError> {
        let symbol = self.symbols.get(id);
        match &symbol.kind {
            SymbolKind::Variable {
                category,
                is_out_parameter,
                ..
            } => {
                let (category, is_out, is_external) = (*category, *is_out_parameter, symbol.is_external);
                match category {
                    VariableCategory::This | VariableCategory::Base => Ok(Instruction::SelfObject),
                    VariableCategory::Local if is_out => Ok(Instruction::LocalOutVariable(self.variable_pointer(id)?)),
                    VariableCategory::Local => Ok(Instruction::LocalVariable(self.variable_pointer(id)?)),
                    _ if is_external => Ok(Instruction::ObjectConst(self.symbol_reference(id, span)?)),
                    VariableCategory::Instance => Ok(Instruction::InstanceVariable(self.variable_pointer(id)?)),
                    VariableCategory::Global => Ok(Instruction::DefaultVariable(self.variable_pointer(id)?)),
                }
            }
            SymbolKind::Class { .. } => Ok(Instruction::ObjectConst(self.symbol_reference(id, span)?)),
            SymbolKind::Procedure { .. } => Ok(Instruction::InstanceDelegate(symbol.name.clone())),
            // A label used as a value is its code offset, e.g. an ubergraph entry point
            SymbolKind::Label { .. } => Ok(match self.label_offset(id) {
                CodeOffset::Resolved(offset) => Instruction::IntConst(offset as i32),
                pending => Instruction::LabelOffset(pending),
            }),
            SymbolKind::Package => Err(CompilerError::unexpected("value expression", &symbol.name, span)),
        }
    }

    fn compile_member(&mut self, owner: &Expr, member: &Expr, span: SourceSpan) -> Result<Instruction, CompilerError> {
        let context = self.context_for_member_expression(owner, member_name(member))?;
        match context.context_type {
            ContextType::This | ContextType::Base => {
                self.with_context(context, |c| c.compile_expression(member))
            }
            ContextType::Struct => {
                let struct_expression = Box::new(self.compile_expression(owner)?);
                let field = self.struct_field(context, member, span)?;
                Ok(Instruction::StructMemberContext {
                    member: field,
                    struct_expression,
                })
            }
            ContextType::Interface => {
                let object = Instruction::InterfaceContext(Box::new(self.compile_expression(owner)?));
                let member = self.with_context(context, |c| c.compile_expression(member))?;
                Ok(Instruction::Context(self.context_node(object, member)))
            }
            ContextType::ObjectConst => {
                let object = match owner.as_identifier().and_then(|name| self.resolve(name, None)) {
                    Some(id) => Instruction::ObjectConst(self.symbol_reference(id, owner.span)?),
                    None => return Err(CompilerError::unexpected("object constant", &owner.kind, owner.span)),
                };
                let member = self.with_context(context, |c| c.compile_expression(member))?;
                Ok(Instruction::Context(self.context_node(object, member)))
            }
            ContextType::Class => {
                let class_reference = matches!(
                    self.expression_type(owner)?,
                    Some(ty) if ty.name == "Class" && ty.is_constructed()
                );
                let unresolved_owner = owner
                    .as_identifier()
                    .map_or(false, |name| self.resolve(name, None).is_none());
                let object = match context.symbol {
                    // Lenient lookup picked the class; address its object directly
                    Some(class) if unresolved_owner => Instruction::ObjectConst(self.symbol_reference(class, owner.span)?),
                    _ => self.compile_expression(owner)?,
                };
                let member = self.with_context(context, |c| c.compile_expression(member))?;
                if let Instruction::CallMath { .. } = member {
                    // static functions need no object
                    return Ok(member);
                }
                let node = self.context_node(object, member);
                Ok(if class_reference {
                    Instruction::ClassContext(node)
                } else {
                    Instruction::Context(node)
                })
            }
        }
    }

    fn struct_field(
        &mut self,
        context: MemberContext,
        member: &Expr,
        span: SourceSpan,
    ) -> Result<PropertyPointer, CompilerError> {
        let name = member
            .as_identifier()
            .ok_or_else(|| CompilerError::unexpected("struct member", &member.kind, span))?;
        let field = context
            .symbol
            .and_then(|s| self.symbols.find_member(s, name, Some(SymbolCategory::Variable)));
        match field {
            Some(id) => self.variable_pointer(id),
            // Engine structs are not declared by the unit; their fields are named directly
            None if self.is_undeclared_struct(context) => {
                let struct_symbol = context.symbol.ok_or_else(|| CompilerError::UnknownSymbol {
                    name: format!("{} (member of an unknown struct)", name),
                    span,
                })?;
                let owner = bind_placeholder(&mut self.symbols, &mut *self.table, struct_symbol)?;
                Ok(PropertyPointer::field(owner, name))
            }
            None => Err(CompilerError::UnknownSymbol {
                name: name.to_string(),
                span,
            }),
        }
    }

    /// Context node around a member; the r-value falls back to the enclosing assignment's
    pub(crate) fn context_node(&self, object: Instruction, member: Instruction) -> ContextNode {
        let r_value = member
            .property_pointer()
            .cloned()
            .or_else(|| self.rvalues.last().cloned())
            .unwrap_or_default();
        ContextNode {
            object: Box::new(object),
            skip_size: None,
            r_value,
            member: Box::new(member),
        }
    }

    pub(crate) fn compile_arguments(&mut self, arguments: &[Expr]) -> Result<Vec<Instruction>, CompilerError> {
        let context = self.implicit_this();
        self.with_context(context, |c| {
            arguments.iter().map(|a| c.compile_expression(a)).collect()
        })
    }

    fn compile_call(&mut self, name: &str, arguments: &[Expr], span: SourceSpan) -> Result<Instruction, CompilerError> {
        if is_intrinsic(name) {
            return self.compile_intrinsic(name, arguments, span);
        }
        let call_context = self.current_context();
        let function = self.resolve(name, Some(SymbolCategory::Procedure));
        let parameters = self.compile_arguments(arguments)?;

        let id = match function {
            Some(id) => id,
            None => {
                log::debug!("CODEGEN: unresolved call '{}' at {} dispatched virtually", name, span);
                return Ok(if call_context.is_self_context() {
                    Instruction::LocalVirtualFunction {
                        name: name.to_string(),
                        parameters,
                    }
                } else {
                    Instruction::VirtualFunction {
                        name: name.to_string(),
                        parameters,
                    }
                });
            }
        };

        let symbol = self.symbols.get(id);
        let (is_virtual, is_static) = (symbol.is_virtual(), symbol.is_static());
        if is_static {
            return Ok(Instruction::CallMath {
                function: self.symbol_reference(id, span)?,
                parameters,
            });
        }
        match call_context.context_type {
            ContextType::This | ContextType::Base => {
                let own_member = call_context
                    .symbol
                    .and_then(|class| self.symbols.find_member(class, name, Some(SymbolCategory::Procedure)))
                    == Some(id);
                let virtual_dispatch = own_member
                    && is_virtual
                    && !call_context.call_virtual_as_final
                    && call_context.context_type == ContextType::This;
                if virtual_dispatch {
                    Ok(Instruction::LocalVirtualFunction {
                        name: name.to_string(),
                        parameters,
                    })
                } else {
                    Ok(Instruction::LocalFinalFunction {
                        function: self.symbol_reference(id, span)?,
                        parameters,
                    })
                }
            }
            ContextType::Struct => Err(CompilerError::unexpected("struct member", name, span)),
            ContextType::ObjectConst | ContextType::Class | ContextType::Interface => {
                if is_virtual {
                    Ok(Instruction::VirtualFunction {
                        name: name.to_string(),
                        parameters,
                    })
                } else {
                    Ok(Instruction::FinalFunction {
                        function: self.symbol_reference(id, span)?,
                        parameters,
                    })
                }
            }
        }
    }

    pub(crate) fn library_call(
        &mut self,
        function: LibraryFunction,
        parameters: Vec<Instruction>,
    ) -> Result<Instruction, CompilerError> {
        Ok(Instruction::CallMath {
            function: self.library_function(function.library, function.name)?,
            parameters,
        })
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: SourceSpan,
    ) -> Result<Instruction, CompilerError> {
        let left_kind = self.expression_kind(left)?;
        let right_kind = self.expression_kind(right)?;
        let function = binary_operator(op, left_kind, right_kind)
            .ok_or_else(|| unsupported_operator(op, left_kind, Some(right_kind), span))?;
        // Both operands are always evaluated; logical operators do not short-circuit
        let parameters = vec![self.compile_expression(left)?, self.compile_expression(right)?];
        self.library_call(function, parameters)
    }

    fn compile_unary(&mut self, op: UnaryOp, operand: &Expr, span: SourceSpan) -> Result<Instruction, CompilerError> {
        let kind = self.expression_kind(operand)?;
        if let Some(function) = unary_operator(op, kind) {
            let operand = self.compile_expression(operand)?;
            return self.library_call(function, vec![operand]);
        }
        match (op, zero_of(kind), binary_operator(BinaryOp::Subtract, kind, kind)) {
            (UnaryOp::Negate, Some(zero), Some(subtract)) => {
                let operand = self.compile_expression(operand)?;
                self.library_call(subtract, vec![zero, operand])
            }
            _ => Err(unsupported_operator_unary(op, kind, span)),
        }
    }

    /// `x++` / `x--` as `x = x + 1` / `x = x - 1`
    fn compile_step(&mut self, op: BinaryOp, operand: &Expr, span: SourceSpan) -> Result<Instruction, CompilerError> {
        let one = match self.expression_kind(operand)? {
            ValueKind::Float => Literal::Float(1.0),
            ValueKind::Byte => Literal::Byte(1),
            _ => Literal::Int(1),
        };
        let value = Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(operand.clone()),
                right: Box::new(Expr::new(ExprKind::Literal(one), span)),
            },
            span,
        );
        self.compile_assignment(operand, &value, span)
    }

    pub(crate) fn compile_assignment(
        &mut self,
        target: &Expr,
        value: &Expr,
        span: SourceSpan,
    ) -> Result<Instruction, CompilerError> {
        let variable = self.compile_expression(target)?;
        let pointer = variable
            .property_pointer()
            .cloned()
            .ok_or_else(|| CompilerError::unexpected("assignment target", &target.kind, span))?;
        let target_kind = self.expression_kind(target)?;
        let persistent = self.is_persistent_frame_variable(target);

        self.with_rvalue(pointer.clone(), |c| {
            if let ExprKind::InitializerList(items) = &value.kind {
                let elements = items
                    .iter()
                    .map(|item| c.compile_expression(item))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(if c.table.format_version().set_array_takes_property_expression() {
                    Instruction::SetArray {
                        assigning_property: Some(Box::new(variable)),
                        inner_property: None,
                        elements,
                    }
                } else {
                    Instruction::SetArray {
                        assigning_property: None,
                        inner_property: Some(pointer.owner),
                        elements,
                    }
                });
            }

            let expression = Box::new(c.compile_expression(value)?);
            Ok(if persistent {
                Instruction::LetValueOnPersistentFrame {
                    destination: pointer,
                    expression,
                }
            } else if target_kind == ValueKind::Bool {
                Instruction::LetBool {
                    variable: Box::new(variable),
                    expression,
                }
            } else {
                Instruction::Let {
                    value: pointer,
                    variable: Box::new(variable),
                    expression,
                }
            })
        })
    }

    /// A hoisted local of an ubergraph written from another procedure
    fn is_persistent_frame_variable(&self, target: &Expr) -> bool {
        let Some(id) = target.as_identifier().and_then(|name| self.resolve(name, None)) else {
            return false;
        };
        let symbol = self.symbols.get(id);
        symbol.variable_category() == Some(VariableCategory::Local)
            && symbol.declaring_symbol != self.current_procedure()
            && symbol
                .declaring_symbol
                .map_or(false, |p| self.symbols.get(p).is_ubergraph())
    }

    fn compile_cast(&mut self, target: &TypeRef, operand: &Expr, span: SourceSpan) -> Result<Instruction, CompilerError> {
        use ValueKind::*;
        let from = self.expression_kind(operand)?;
        let to = ValueKind::from_type(target);
        let compiled = self.compile_expression(operand)?;
        let boxed = || Box::new(compiled.clone());

        let instruction = match (from, to) {
            (Object, Object) => Instruction::DynamicCast {
                class: self.class_reference(target, span)?,
                operand: boxed(),
            },
            (Class, Class) => Instruction::MetaCast {
                class: self.class_reference(target, span)?,
                operand: boxed(),
            },
            (Object, Interface) => Instruction::ObjToInterfaceCast {
                class: self.class_reference(target, span)?,
                operand: boxed(),
            },
            (Interface, Object) => Instruction::InterfaceToObjCast {
                class: self.class_reference(target, span)?,
                operand: boxed(),
            },
            (Interface, Interface) => Instruction::CrossInterfaceCast {
                class: self.class_reference(target, span)?,
                operand: boxed(),
            },
            (Object, Bool) => Instruction::PrimitiveCast {
                conversion: CST_OBJECT_TO_BOOL,
                operand: boxed(),
            },
            (Interface, Bool) => Instruction::PrimitiveCast {
                conversion: CST_INTERFACE_TO_BOOL,
                operand: boxed(),
            },
            _ if from == to => compiled.clone(),
            _ => match conversion(from, to) {
                Some(function) => self.library_call(function, vec![compiled.clone()])?,
                None => {
                    return Err(CompilerError::UnsupportedCast {
                        from: from.to_string(),
                        to: target.to_string(),
                        span,
                    })
                }
            },
        };
        Ok(instruction)
    }

    /// Object-table reference of the class a type names (`T` in `Class<T>` etc.)
    pub(crate) fn class_reference(&self, ty: &TypeRef, span: SourceSpan) -> Result<PackageIndex, CompilerError> {
        let name = ty.argument.as_deref().map_or(ty.name.as_str(), |arg| arg.name.as_str());
        if let Some(reference) = self
            .class_named(name)
            .and_then(|class| self.symbols.get(class).package_reference)
        {
            return Ok(reference);
        }
        NameResolver::new(&*self.table)
            .resolve(&[name.to_string()])
            .map_err(|e| match e {
                CompilerError::NameNotFound { .. } => CompilerError::UnknownSymbol {
                    name: name.to_string(),
                    span,
                },
                other => other,
            })
    }

    /// Case values and results compile in order; each case's next-offset points where
    /// the following case (or the default) starts and the end offset past the default
    pub(crate) fn compile_switch_value(
        &mut self,
        index: &Expr,
        cases: &[(&Expr, &Expr)],
        default: &Expr,
        span: SourceSpan,
    ) -> Result<Instruction, CompilerError> {
        let index = Box::new(self.compile_expression(index)?);
        let end = self.synthetic_label("switch_end", span);
        let mut nodes = Vec::with_capacity(cases.len());
        for (value, result) in cases {
            let next = self.synthetic_label("switch_case", span);
            nodes.push(SwitchCaseNode {
                value: self.compile_expression(value)?,
                next_offset: CodeOffset::Pending(next),
                result: self.compile_expression(result)?,
            });
        }
        Ok(Instruction::SwitchValue {
            end_goto_offset: CodeOffset::Pending(end),
            index,
            cases: nodes,
            default: Box::new(self.compile_expression(default)?),
        })
    }
}

fn compile_literal(literal: &Literal) -> Instruction {
    match literal {
        Literal::Int(v) => Instruction::IntConst(*v),
        Literal::Float(v) => Instruction::FloatConst(*v),
        Literal::Bool(true) => Instruction::True,
        Literal::Bool(false) => Instruction::False,
        Literal::String(s) if s.is_ascii() => Instruction::StringConst(s.clone()),
        Literal::String(s) => Instruction::UnicodeStringConst(s.clone()),
        Literal::Name(s) => Instruction::NameConst(s.clone()),
        Literal::Byte(v) => Instruction::ByteConst(*v),
        Literal::Null => Instruction::NoObject,
    }
}

fn literal_kind(literal: &Literal) -> ValueKind {
    match literal {
        Literal::Int(_) => ValueKind::Int,
        Literal::Float(_) => ValueKind::Float,
        Literal::Bool(_) => ValueKind::Bool,
        Literal::String(_) => ValueKind::String,
        Literal::Name(_) => ValueKind::Name,
        Literal::Byte(_) => ValueKind::Byte,
        Literal::Null => ValueKind::Object,
    }
}

fn zero_of(kind: ValueKind) -> Option<Instruction> {
    match kind {
        ValueKind::Int => Some(Instruction::IntConst(0)),
        ValueKind::Int64 => Some(Instruction::Int64Const(0)),
        ValueKind::Float => Some(Instruction::FloatConst(0.0)),
        ValueKind::Byte => Some(Instruction::ByteConst(0)),
        _ => None,
    }
}

fn unsupported_operator(
    op: BinaryOp,
    left: ValueKind,
    right: Option<ValueKind>,
    span: SourceSpan,
) -> CompilerError {
    CompilerError::UnsupportedOperator {
        operator: op.to_string(),
        left: left.to_string(),
        right: right.map_or_else(|| "nothing".to_string(), |k| k.to_string()),
        span,
    }
}

fn unsupported_operator_unary(op: UnaryOp, operand: ValueKind, span: SourceSpan) -> CompilerError {
    CompilerError::UnsupportedOperator {
        operator: op.to_string(),
        left: operand.to_string(),
        right: "nothing".to_string(),
        span,
    }
}
