// Intrinsic calls
//
// Every VM opcode can be written directly as a call to its `EX_` name. Arguments are
// positional and taken straight from the call:
//
//   property   identifier naming a variable, `null`, or "<null>"
//   object     identifier with an object-table entry, a dotted name string, or "<null>"
//   label      identifier naming a label, or an absolute offset literal
//   literal    int / float / bool / string literal (floats may be negated)
//   expr       any expression
//
//   EX_Assert(line: int16, debug: bool, expr)
//   EX_Context(object expr, member expr [, rvalue property])
//   EX_SetArray(target expr | inner object, elements...)   shape depends on format version
//   EX_SwitchValue(index, default, value1, result1, ...)
//   EX_TransformConst(rx, ry, rz, rw, tx, ty, tz, sx, sy, sz)

use crate::kismet_compiler::ast::*;
use crate::kismet_compiler::bytecode::*;
use crate::kismet_compiler::codegen::ScriptCompiler;
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::name_resolver::{NameResolver, NULL_REFERENCE};
use crate::kismet_compiler::package::PackageIndex;
use crate::kismet_compiler::symbols::SymbolCategory;
use crate::kismet_compiler::value_kind::ValueKind;
use indexmap::IndexMap;

lazy_static! {
    /// Every intrinsic name with the value kind its instruction produces
    static ref INTRINSICS: IndexMap<&'static str, ValueKind> = {
        use ValueKind::*;
        let table: &[(&'static str, ValueKind)] = &[
            ("EX_LocalVariable", Object),
            ("EX_InstanceVariable", Object),
            ("EX_DefaultVariable", Object),
            ("EX_LocalOutVariable", Object),
            ("EX_ClassSparseDataVariable", Object),
            ("EX_Return", Void),
            ("EX_Jump", Void),
            ("EX_JumpIfNot", Void),
            ("EX_Assert", Void),
            ("EX_Nothing", Void),
            ("EX_Let", Void),
            ("EX_ClassContext", Object),
            ("EX_MetaCast", Class),
            ("EX_LetBool", Void),
            ("EX_EndParmValue", Void),
            ("EX_EndFunctionParms", Void),
            ("EX_Self", Object),
            ("EX_Skip", Void),
            ("EX_Context", Object),
            ("EX_Context_FailSilent", Object),
            ("EX_VirtualFunction", Void),
            ("EX_FinalFunction", Void),
            ("EX_IntConst", Int),
            ("EX_FloatConst", Float),
            ("EX_StringConst", String),
            ("EX_ObjectConst", Object),
            ("EX_NameConst", Name),
            ("EX_RotationConst", Rotator),
            ("EX_VectorConst", Vector),
            ("EX_ByteConst", Byte),
            ("EX_IntZero", Int),
            ("EX_IntOne", Int),
            ("EX_True", Bool),
            ("EX_False", Bool),
            ("EX_TextConst", Text),
            ("EX_NoObject", Object),
            ("EX_TransformConst", Transform),
            ("EX_IntConstByte", Int),
            ("EX_NoInterface", Interface),
            ("EX_DynamicCast", Object),
            ("EX_StructConst", Struct),
            ("EX_EndStructConst", Void),
            ("EX_SetArray", Void),
            ("EX_EndArray", Void),
            ("EX_PropertyConst", Object),
            ("EX_UnicodeStringConst", String),
            ("EX_Int64Const", Int64),
            ("EX_UInt64Const", Int64),
            ("EX_PrimitiveCast", Bool),
            ("EX_SetSet", Void),
            ("EX_EndSet", Void),
            ("EX_SetMap", Void),
            ("EX_EndMap", Void),
            ("EX_SetConst", Array),
            ("EX_EndSetConst", Void),
            ("EX_MapConst", Array),
            ("EX_EndMapConst", Void),
            ("EX_StructMemberContext", Object),
            ("EX_LetMulticastDelegate", Void),
            ("EX_LetDelegate", Void),
            ("EX_LocalVirtualFunction", Void),
            ("EX_LocalFinalFunction", Void),
            ("EX_DeprecatedOp4A", Void),
            ("EX_InstanceDelegate", Object),
            ("EX_PushExecutionFlow", Void),
            ("EX_PopExecutionFlow", Void),
            ("EX_ComputedJump", Void),
            ("EX_PopExecutionFlowIfNot", Void),
            ("EX_Breakpoint", Void),
            ("EX_InterfaceContext", Interface),
            ("EX_ObjToInterfaceCast", Interface),
            ("EX_EndOfScript", Void),
            ("EX_CrossInterfaceCast", Interface),
            ("EX_InterfaceToObjCast", Object),
            ("EX_WireTracepoint", Void),
            ("EX_SkipOffsetConst", Int),
            ("EX_AddMulticastDelegate", Void),
            ("EX_ClearMulticastDelegate", Void),
            ("EX_Tracepoint", Void),
            ("EX_LetObj", Void),
            ("EX_LetWeakObjPtr", Void),
            ("EX_BindDelegate", Void),
            ("EX_RemoveMulticastDelegate", Void),
            ("EX_CallMulticastDelegate", Void),
            ("EX_LetValueOnPersistentFrame", Void),
            ("EX_ArrayConst", Array),
            ("EX_EndArrayConst", Void),
            ("EX_SoftObjectConst", Object),
            ("EX_CallMath", Void),
            ("EX_SwitchValue", Object),
            ("EX_InstrumentationEvent", Void),
            ("EX_ArrayGetByRef", Object),
            ("EX_FieldPathConst", Object),
        ];
        table.iter().copied().collect()
    };
}

/// Names in the reserved `EX_` namespace always go to the intrinsic table
pub fn is_intrinsic(name: &str) -> bool {
    name.starts_with("EX_")
}

pub fn intrinsic_kind(name: &str) -> ValueKind {
    INTRINSICS.get(name).copied().unwrap_or(ValueKind::Void)
}

/// Positional argument list of one intrinsic call
struct Arguments<'e> {
    intrinsic: &'e str,
    items: &'e [Expr],
    span: SourceSpan,
}

impl<'e> Arguments<'e> {
    fn error(&self, message: impl Into<String>) -> CompilerError {
        CompilerError::intrinsic(self.intrinsic, message, self.span)
    }

    fn expect(&self, count: usize) -> Result<(), CompilerError> {
        if self.items.len() == count {
            Ok(())
        } else {
            Err(self.error(format!("expected {} arguments, got {}", count, self.items.len())))
        }
    }

    fn at_least(&self, count: usize) -> Result<(), CompilerError> {
        if self.items.len() >= count {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected at least {} arguments, got {}",
                count,
                self.items.len()
            )))
        }
    }

    fn get(&self, index: usize) -> Result<&'e Expr, CompilerError> {
        self.items
            .get(index)
            .ok_or_else(|| self.error(format!("missing argument {}", index + 1)))
    }

    fn literal(&self, index: usize) -> Result<&'e Literal, CompilerError> {
        match &self.get(index)?.kind {
            ExprKind::Literal(literal) => Ok(literal),
            other => Err(self.error(format!("argument {} must be a literal, found {:?}", index + 1, other))),
        }
    }

    fn int(&self, index: usize) -> Result<i64, CompilerError> {
        match number(self.get(index)?) {
            Some(Number::Int(v)) => Ok(v),
            _ => Err(self.error(format!("argument {} must be an integer literal", index + 1))),
        }
    }

    fn float(&self, index: usize) -> Result<f32, CompilerError> {
        match number(self.get(index)?) {
            Some(Number::Int(v)) => Ok(v as f32),
            Some(Number::Float(v)) => Ok(v),
            None => Err(self.error(format!("argument {} must be a numeric literal", index + 1))),
        }
    }

    fn floats<const N: usize>(&self, first: usize) -> Result<[f32; N], CompilerError> {
        let mut values = [0.0; N];
        for (i, value) in values.iter_mut().enumerate() {
            *value = self.float(first + i)?;
        }
        Ok(values)
    }

    fn boolean(&self, index: usize) -> Result<bool, CompilerError> {
        match self.literal(index)? {
            Literal::Bool(v) => Ok(*v),
            _ => Err(self.error(format!("argument {} must be a boolean literal", index + 1))),
        }
    }

    fn text(&self, index: usize) -> Result<String, CompilerError> {
        match &self.get(index)?.kind {
            ExprKind::Literal(Literal::String(s)) | ExprKind::Literal(Literal::Name(s)) => Ok(s.clone()),
            ExprKind::Identifier(s) => Ok(s.clone()),
            _ => Err(self.error(format!("argument {} must be a string or name", index + 1))),
        }
    }

    fn byte(&self, index: usize) -> Result<u8, CompilerError> {
        let value = self.int(index)?;
        u8::try_from(value).map_err(|_| self.error(format!("{} does not fit in a byte", value)))
    }
}

enum Number {
    Int(i64),
    Float(f32),
}

fn number(expr: &Expr) -> Option<Number> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(v)) => Some(Number::Int(*v as i64)),
        ExprKind::Literal(Literal::Byte(v)) => Some(Number::Int(*v as i64)),
        ExprKind::Literal(Literal::Float(v)) => Some(Number::Float(*v)),
        ExprKind::Unary {
            op: UnaryOp::Negate,
            operand,
        } => match number(operand)? {
            Number::Int(v) => Some(Number::Int(-v)),
            Number::Float(v) => Some(Number::Float(-v)),
        },
        _ => None,
    }
}

impl<'a> ScriptCompiler<'a> {
    fn intrinsic_expression(&mut self, args: &Arguments, index: usize) -> Result<Box<Instruction>, CompilerError> {
        Ok(Box::new(self.compile_expression(args.get(index)?)?))
    }

    fn intrinsic_expressions(&mut self, args: &Arguments, from: usize) -> Result<Vec<Instruction>, CompilerError> {
        args.items
            .iter()
            .skip(from)
            .map(|item| self.compile_expression(item))
            .collect()
    }

    fn intrinsic_label(&self, args: &Arguments, index: usize) -> Result<CodeOffset, CompilerError> {
        let argument = args.get(index)?;
        if let Some(name) = argument.as_identifier() {
            return Ok(self.label_offset(self.label_named(name, argument.span)?));
        }
        match number(argument) {
            Some(Number::Int(offset)) if offset >= 0 => Ok(CodeOffset::Resolved(offset as u32)),
            _ => Err(args.error(format!("argument {} must name a label or an offset", index + 1))),
        }
    }

    fn intrinsic_object(&self, args: &Arguments, index: usize) -> Result<PackageIndex, CompilerError> {
        let argument = args.get(index)?;
        let name = match &argument.kind {
            ExprKind::Literal(Literal::Null) => return Ok(PackageIndex::NULL),
            ExprKind::Identifier(name) => {
                let bound = self
                    .resolve(name, None)
                    .and_then(|id| self.symbols.get(id).package_reference);
                if let Some(reference) = bound {
                    return Ok(reference);
                }
                name
            }
            ExprKind::Literal(Literal::String(name)) | ExprKind::Literal(Literal::Name(name)) => name,
            other => return Err(args.error(format!("argument {} must name an object, found {:?}", index + 1, other))),
        };
        NameResolver::new(&*self.table).resolve(&[name.clone()])
    }

    fn intrinsic_property(&self, args: &Arguments, index: usize) -> Result<PropertyPointer, CompilerError> {
        let argument = args.get(index)?;
        match &argument.kind {
            ExprKind::Literal(Literal::Null) => Ok(PropertyPointer::null()),
            ExprKind::Literal(Literal::String(s)) if s == NULL_REFERENCE => Ok(PropertyPointer::null()),
            ExprKind::Identifier(name) => {
                let variable = self
                    .resolve(name, Some(SymbolCategory::Variable))
                    .ok_or_else(|| CompilerError::UnknownSymbol {
                        name: name.clone(),
                        span: argument.span,
                    })?;
                self.variable_pointer(variable)
            }
            // "Owner.Field" addresses a field of an object-table entry
            ExprKind::Literal(Literal::String(path)) => match path.rsplit_once('.') {
                Some((owner, field)) => {
                    let owner = NameResolver::new(&*self.table).resolve(&[owner.to_string()])?;
                    Ok(PropertyPointer::field(owner, field))
                }
                None => Err(args.error(format!("'{}' is not an Owner.Field path", path))),
            },
            other => Err(args.error(format!("argument {} must name a property, found {:?}", index + 1, other))),
        }
    }

    pub(crate) fn compile_intrinsic(
        &mut self,
        name: &str,
        arguments: &[Expr],
        span: SourceSpan,
    ) -> Result<Instruction, CompilerError> {
        use Instruction as I;
        log::debug!("CODEGEN: intrinsic {} with {} arguments at {}", name, arguments.len(), span);
        let args = Arguments {
            intrinsic: name,
            items: arguments,
            span,
        };

        let instruction = match name {
            // Variables
            "EX_LocalVariable" | "EX_InstanceVariable" | "EX_DefaultVariable" | "EX_LocalOutVariable"
            | "EX_ClassSparseDataVariable" | "EX_PropertyConst" => {
                args.expect(1)?;
                let pointer = self.intrinsic_property(&args, 0)?;
                match name {
                    "EX_LocalVariable" => I::LocalVariable(pointer),
                    "EX_InstanceVariable" => I::InstanceVariable(pointer),
                    "EX_DefaultVariable" => I::DefaultVariable(pointer),
                    "EX_LocalOutVariable" => I::LocalOutVariable(pointer),
                    "EX_ClassSparseDataVariable" => I::ClassSparseDataVariable(pointer),
                    _ => I::PropertyConst(pointer),
                }
            }

            // Single expression operand
            "EX_Return" | "EX_ComputedJump" | "EX_PopExecutionFlowIfNot" | "EX_InterfaceContext"
            | "EX_SoftObjectConst" | "EX_FieldPathConst" | "EX_ClearMulticastDelegate" => {
                args.expect(1)?;
                let operand = self.intrinsic_expression(&args, 0)?;
                match name {
                    "EX_Return" => I::Return(operand),
                    "EX_ComputedJump" => I::ComputedJump(operand),
                    "EX_PopExecutionFlowIfNot" => I::PopExecutionFlowIfNot(operand),
                    "EX_InterfaceContext" => I::InterfaceContext(operand),
                    "EX_SoftObjectConst" => I::SoftObjectConst(operand),
                    "EX_FieldPathConst" => I::FieldPathConst(operand),
                    _ => I::ClearMulticastDelegate(operand),
                }
            }

            // Jumps
            "EX_Jump" | "EX_PushExecutionFlow" | "EX_SkipOffsetConst" => {
                args.expect(1)?;
                let target = self.intrinsic_label(&args, 0)?;
                match name {
                    "EX_Jump" => I::Jump(target),
                    "EX_PushExecutionFlow" => I::PushExecutionFlow(target),
                    _ => I::SkipOffsetConst(target),
                }
            }
            "EX_JumpIfNot" => {
                args.expect(2)?;
                I::JumpIfNot {
                    target: self.intrinsic_label(&args, 0)?,
                    condition: self.intrinsic_expression(&args, 1)?,
                }
            }
            "EX_Skip" => {
                args.expect(2)?;
                I::Skip {
                    target: self.intrinsic_label(&args, 0)?,
                    expression: self.intrinsic_expression(&args, 1)?,
                }
            }
            "EX_Assert" => {
                args.expect(3)?;
                let line = args.int(0)?;
                I::Assert {
                    line: u16::try_from(line).map_err(|_| args.error(format!("line {} does not fit in 16 bits", line)))?,
                    debug_only: args.boolean(1)?,
                    condition: self.intrinsic_expression(&args, 2)?,
                }
            }

            // Assignment
            "EX_Let" => {
                args.expect(3)?;
                I::Let {
                    value: self.intrinsic_property(&args, 0)?,
                    variable: self.intrinsic_expression(&args, 1)?,
                    expression: self.intrinsic_expression(&args, 2)?,
                }
            }
            "EX_LetBool" | "EX_LetObj" | "EX_LetWeakObjPtr" | "EX_LetDelegate" | "EX_LetMulticastDelegate" => {
                args.expect(2)?;
                let variable = self.intrinsic_expression(&args, 0)?;
                let expression = self.intrinsic_expression(&args, 1)?;
                match name {
                    "EX_LetBool" => I::LetBool { variable, expression },
                    "EX_LetObj" => I::LetObj { variable, expression },
                    "EX_LetWeakObjPtr" => I::LetWeakObjPtr { variable, expression },
                    "EX_LetDelegate" => I::LetDelegate { variable, expression },
                    _ => I::LetMulticastDelegate { variable, expression },
                }
            }
            "EX_LetValueOnPersistentFrame" => {
                args.expect(2)?;
                I::LetValueOnPersistentFrame {
                    destination: self.intrinsic_property(&args, 0)?,
                    expression: self.intrinsic_expression(&args, 1)?,
                }
            }

            // Contexts
            "EX_Context" | "EX_Context_FailSilent" | "EX_ClassContext" => {
                if args.items.len() != 3 {
                    args.expect(2)?;
                }
                let object = self.compile_expression(args.get(0)?)?;
                let member = self.compile_expression(args.get(1)?)?;
                let mut node = self.context_node(object, member);
                if args.items.len() == 3 {
                    node.r_value = self.intrinsic_property(&args, 2)?;
                }
                match name {
                    "EX_Context" => I::Context(node),
                    "EX_Context_FailSilent" => I::ContextFailSilent(node),
                    _ => I::ClassContext(node),
                }
            }
            "EX_StructMemberContext" => {
                args.expect(2)?;
                I::StructMemberContext {
                    member: self.intrinsic_property(&args, 0)?,
                    struct_expression: self.intrinsic_expression(&args, 1)?,
                }
            }

            // Casts
            "EX_MetaCast" | "EX_DynamicCast" | "EX_ObjToInterfaceCast" | "EX_CrossInterfaceCast"
            | "EX_InterfaceToObjCast" => {
                args.expect(2)?;
                let class = self.intrinsic_object(&args, 0)?;
                let operand = self.intrinsic_expression(&args, 1)?;
                match name {
                    "EX_MetaCast" => I::MetaCast { class, operand },
                    "EX_DynamicCast" => I::DynamicCast { class, operand },
                    "EX_ObjToInterfaceCast" => I::ObjToInterfaceCast { class, operand },
                    "EX_CrossInterfaceCast" => I::CrossInterfaceCast { class, operand },
                    _ => I::InterfaceToObjCast { class, operand },
                }
            }
            "EX_PrimitiveCast" => {
                args.expect(2)?;
                I::PrimitiveCast {
                    conversion: args.byte(0)?,
                    operand: self.intrinsic_expression(&args, 1)?,
                }
            }

            // Calls
            "EX_VirtualFunction" | "EX_LocalVirtualFunction" => {
                args.at_least(1)?;
                let function = args.text(0)?;
                let parameters = self.intrinsic_expressions(&args, 1)?;
                if name == "EX_VirtualFunction" {
                    I::VirtualFunction {
                        name: function,
                        parameters,
                    }
                } else {
                    I::LocalVirtualFunction {
                        name: function,
                        parameters,
                    }
                }
            }
            "EX_FinalFunction" | "EX_LocalFinalFunction" | "EX_CallMath" => {
                args.at_least(1)?;
                let function = self.intrinsic_function(&args)?;
                let parameters = self.intrinsic_expressions(&args, 1)?;
                match name {
                    "EX_FinalFunction" => I::FinalFunction { function, parameters },
                    "EX_LocalFinalFunction" => I::LocalFinalFunction { function, parameters },
                    _ => I::CallMath { function, parameters },
                }
            }
            "EX_CallMulticastDelegate" => {
                args.at_least(2)?;
                I::CallMulticastDelegate {
                    signature: self.intrinsic_object(&args, 0)?,
                    delegate: self.intrinsic_expression(&args, 1)?,
                    parameters: self.intrinsic_expressions(&args, 2)?,
                }
            }

            // Delegates
            "EX_InstanceDelegate" => {
                args.expect(1)?;
                I::InstanceDelegate(args.text(0)?)
            }
            "EX_BindDelegate" => {
                args.expect(3)?;
                I::BindDelegate {
                    function_name: args.text(0)?,
                    delegate: self.intrinsic_expression(&args, 1)?,
                    object: self.intrinsic_expression(&args, 2)?,
                }
            }
            "EX_AddMulticastDelegate" | "EX_RemoveMulticastDelegate" => {
                args.expect(2)?;
                let delegate = self.intrinsic_expression(&args, 0)?;
                let other = self.intrinsic_expression(&args, 1)?;
                if name == "EX_AddMulticastDelegate" {
                    I::AddMulticastDelegate {
                        delegate,
                        delegate_to_add: other,
                    }
                } else {
                    I::RemoveMulticastDelegate {
                        delegate,
                        delegate_to_remove: other,
                    }
                }
            }

            // Constants
            "EX_IntConst" => {
                args.expect(1)?;
                let value = args.int(0)?;
                I::IntConst(i32::try_from(value).map_err(|_| args.error(format!("{} does not fit in 32 bits", value)))?)
            }
            "EX_Int64Const" => {
                args.expect(1)?;
                I::Int64Const(args.int(0)?)
            }
            "EX_UInt64Const" => {
                args.expect(1)?;
                let value = args.int(0)?;
                I::UInt64Const(u64::try_from(value).map_err(|_| args.error(format!("{} is negative", value)))?)
            }
            "EX_ByteConst" | "EX_IntConstByte" | "EX_InstrumentationEvent" => {
                args.expect(1)?;
                let value = args.byte(0)?;
                match name {
                    "EX_ByteConst" => I::ByteConst(value),
                    "EX_IntConstByte" => I::IntConstByte(value),
                    _ => I::InstrumentationEvent(value),
                }
            }
            "EX_FloatConst" => {
                args.expect(1)?;
                I::FloatConst(args.float(0)?)
            }
            "EX_StringConst" | "EX_UnicodeStringConst" | "EX_TextConst" | "EX_NameConst" => {
                args.expect(1)?;
                let text = args.text(0)?;
                match name {
                    "EX_StringConst" => I::StringConst(text),
                    "EX_UnicodeStringConst" => I::UnicodeStringConst(text),
                    "EX_TextConst" => I::TextConst(text),
                    _ => I::NameConst(text),
                }
            }
            "EX_ObjectConst" => {
                args.expect(1)?;
                I::ObjectConst(self.intrinsic_object(&args, 0)?)
            }
            "EX_VectorConst" => {
                args.expect(3)?;
                let [x, y, z] = args.floats::<3>(0)?;
                I::VectorConst { x, y, z }
            }
            "EX_RotationConst" => {
                args.expect(3)?;
                let [pitch, yaw, roll] = args.floats::<3>(0)?;
                I::RotationConst { pitch, yaw, roll }
            }
            "EX_TransformConst" => {
                args.expect(10)?;
                I::TransformConst {
                    rotation: args.floats::<4>(0)?,
                    translation: args.floats::<3>(4)?,
                    scale: args.floats::<3>(7)?,
                }
            }
            "EX_StructConst" => {
                args.at_least(2)?;
                let size = args.int(1)?;
                I::StructConst {
                    struct_ref: self.intrinsic_object(&args, 0)?,
                    struct_size: i32::try_from(size).map_err(|_| args.error(format!("struct size {} out of range", size)))?,
                    values: self.intrinsic_expressions(&args, 2)?,
                }
            }

            // Containers
            "EX_SetArray" => {
                args.at_least(1)?;
                if self.table.format_version().set_array_takes_property_expression() {
                    I::SetArray {
                        assigning_property: Some(self.intrinsic_expression(&args, 0)?),
                        inner_property: None,
                        elements: self.intrinsic_expressions(&args, 1)?,
                    }
                } else {
                    I::SetArray {
                        assigning_property: None,
                        inner_property: Some(self.intrinsic_object(&args, 0)?),
                        elements: self.intrinsic_expressions(&args, 1)?,
                    }
                }
            }
            "EX_SetSet" | "EX_SetMap" => {
                args.at_least(1)?;
                let target = self.intrinsic_expression(&args, 0)?;
                let elements = self.intrinsic_expressions(&args, 1)?;
                if name == "EX_SetSet" {
                    I::SetSet {
                        set_property: target,
                        elements,
                    }
                } else {
                    I::SetMap {
                        map_property: target,
                        elements,
                    }
                }
            }
            "EX_SetConst" | "EX_ArrayConst" => {
                args.at_least(1)?;
                let inner_property = self.intrinsic_property(&args, 0)?;
                let elements = self.intrinsic_expressions(&args, 1)?;
                if name == "EX_SetConst" {
                    I::SetConst { inner_property, elements }
                } else {
                    I::ArrayConst { inner_property, elements }
                }
            }
            "EX_MapConst" => {
                args.at_least(2)?;
                I::MapConst {
                    key_property: self.intrinsic_property(&args, 0)?,
                    value_property: self.intrinsic_property(&args, 1)?,
                    elements: self.intrinsic_expressions(&args, 2)?,
                }
            }
            "EX_ArrayGetByRef" => {
                args.expect(2)?;
                I::ArrayGetByRef {
                    array: self.intrinsic_expression(&args, 0)?,
                    index: self.intrinsic_expression(&args, 1)?,
                }
            }
            "EX_SwitchValue" => {
                args.at_least(2)?;
                if args.items.len() % 2 != 0 {
                    return Err(args.error("cases must come in value/result pairs"));
                }
                let cases: Vec<(&Expr, &Expr)> = args.items[2..]
                    .chunks(2)
                    .map(|pair| (&pair[0], &pair[1]))
                    .collect();
                self.compile_switch_value(&args.items[0], &cases, &args.items[1], span)?
            }

            // Operand-less opcodes
            _ => {
                let instruction = match name {
                    "EX_Nothing" => I::Nothing,
                    "EX_EndParmValue" => I::EndParmValue,
                    "EX_EndFunctionParms" => I::EndFunctionParms,
                    "EX_Self" => I::SelfObject,
                    "EX_IntZero" => I::IntZero,
                    "EX_IntOne" => I::IntOne,
                    "EX_True" => I::True,
                    "EX_False" => I::False,
                    "EX_NoObject" => I::NoObject,
                    "EX_NoInterface" => I::NoInterface,
                    "EX_EndStructConst" => I::EndStructConst,
                    "EX_EndArray" => I::EndArray,
                    "EX_EndSet" => I::EndSet,
                    "EX_EndMap" => I::EndMap,
                    "EX_EndSetConst" => I::EndSetConst,
                    "EX_EndMapConst" => I::EndMapConst,
                    "EX_EndArrayConst" => I::EndArrayConst,
                    "EX_DeprecatedOp4A" => I::DeprecatedOp4A,
                    "EX_PopExecutionFlow" => I::PopExecutionFlow,
                    "EX_Breakpoint" => I::Breakpoint,
                    "EX_EndOfScript" => I::EndOfScript,
                    "EX_WireTracepoint" => I::WireTracepoint,
                    "EX_Tracepoint" => I::Tracepoint,
                    _ => return Err(args.error("unknown intrinsic")),
                };
                args.expect(0)?;
                instruction
            }
        };
        Ok(instruction)
    }

    /// Function operand of the final/math call intrinsics: a procedure in scope or an
    /// object-table name
    fn intrinsic_function(&self, args: &Arguments) -> Result<PackageIndex, CompilerError> {
        let argument = args.get(0)?;
        if let Some(name) = argument.as_identifier() {
            if let Some(id) = self.resolve(name, Some(SymbolCategory::Procedure)) {
                return self.symbol_reference(id, argument.span);
            }
        }
        self.intrinsic_object(args, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_opcode_has_an_intrinsic() {
        // One name per instruction variant
        assert_eq!(INTRINSICS.len(), 93);
        assert!(INTRINSICS.contains_key("EX_Context_FailSilent"));
        assert!(INTRINSICS.contains_key("EX_ClassSparseDataVariable"));
    }

    #[test]
    fn test_intrinsic_kinds() {
        assert_eq!(intrinsic_kind("EX_IntConst"), ValueKind::Int);
        assert_eq!(intrinsic_kind("EX_VectorConst"), ValueKind::Vector);
        assert_eq!(intrinsic_kind("EX_NoSuchThing"), ValueKind::Void);
        assert!(is_intrinsic("EX_NoSuchThing"));
        assert!(!is_intrinsic("Add_IntInt"));
    }
}
