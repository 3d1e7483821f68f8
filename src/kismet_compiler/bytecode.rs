// Kismet bytecode instruction nodes
//
// Every node is one tagged, variable-length VM expression. Nodes nest: operands that
// are themselves expressions are boxed children serialized inline after the opcode.

use crate::kismet_compiler::package::PackageIndex;
use crate::kismet_compiler::symbols::SymbolId;
use std::fmt;

/// A jump target inside the instruction stream.
///
/// Emitted as `Pending(label)` when the label's offset is not yet known and rewritten
/// to `Resolved` by the fixup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOffset {
    Pending(SymbolId),
    Resolved(u32),
}

impl CodeOffset {
    pub fn value(&self) -> Option<u32> {
        match self {
            CodeOffset::Resolved(offset) => Some(*offset),
            CodeOffset::Pending(_) => None,
        }
    }
}

impl fmt::Display for CodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodeOffset::Resolved(offset) => write!(f, "0x{:04x}", offset),
            CodeOffset::Pending(label) => write!(f, "<label #{}>", label),
        }
    }
}

/// Storage location named by an instruction: an owning object plus an optional
/// field path below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyPointer {
    pub owner: PackageIndex,
    pub path: Vec<String>,
}

impl PropertyPointer {
    pub fn null() -> Self {
        PropertyPointer::default()
    }

    pub fn export(index: PackageIndex) -> Self {
        PropertyPointer {
            owner: index,
            path: Vec::new(),
        }
    }

    pub fn field(owner: PackageIndex, name: &str) -> Self {
        PropertyPointer {
            owner,
            path: vec![name.to_string()],
        }
    }

    pub fn is_null(&self) -> bool {
        self.owner.is_null() && self.path.is_empty()
    }
}

impl fmt::Display for PropertyPointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}]", self.owner)
        } else {
            write!(f, "[{}:{}]", self.owner, self.path.join("."))
        }
    }
}

/// Primitive conversion kinds carried by PrimitiveCast
pub const CST_OBJECT_TO_INTERFACE: u8 = 0x46;
pub const CST_OBJECT_TO_BOOL: u8 = 0x47;
pub const CST_INTERFACE_TO_BOOL: u8 = 0x49;

/// Shared shape of Context, Context_FailSilent and ClassContext
#[derive(Debug, Clone, PartialEq)]
pub struct ContextNode {
    pub object: Box<Instruction>,
    /// Byte length of `member`, filled in by the fixup pass
    pub skip_size: Option<u32>,
    pub r_value: PropertyPointer,
    pub member: Box<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCaseNode {
    pub value: Instruction,
    pub next_offset: CodeOffset,
    pub result: Instruction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    LocalVariable(PropertyPointer),
    InstanceVariable(PropertyPointer),
    DefaultVariable(PropertyPointer),
    LocalOutVariable(PropertyPointer),
    ClassSparseDataVariable(PropertyPointer),
    Return(Box<Instruction>),
    Jump(CodeOffset),
    JumpIfNot {
        target: CodeOffset,
        condition: Box<Instruction>,
    },
    Assert {
        line: u16,
        debug_only: bool,
        condition: Box<Instruction>,
    },
    Nothing,
    Let {
        value: PropertyPointer,
        variable: Box<Instruction>,
        expression: Box<Instruction>,
    },
    ClassContext(ContextNode),
    MetaCast {
        class: PackageIndex,
        operand: Box<Instruction>,
    },
    LetBool {
        variable: Box<Instruction>,
        expression: Box<Instruction>,
    },
    EndParmValue,
    EndFunctionParms,
    SelfObject,
    Skip {
        target: CodeOffset,
        expression: Box<Instruction>,
    },
    Context(ContextNode),
    ContextFailSilent(ContextNode),
    VirtualFunction {
        name: String,
        parameters: Vec<Instruction>,
    },
    FinalFunction {
        function: PackageIndex,
        parameters: Vec<Instruction>,
    },
    IntConst(i32),
    /// Code offset of a label pushed as an integer; serialized as `EX_IntConst` and
    /// rewritten to `IntConst` by the fixup pass
    LabelOffset(CodeOffset),
    FloatConst(f32),
    StringConst(String),
    ObjectConst(PackageIndex),
    NameConst(String),
    RotationConst {
        pitch: f32,
        yaw: f32,
        roll: f32,
    },
    VectorConst {
        x: f32,
        y: f32,
        z: f32,
    },
    ByteConst(u8),
    IntZero,
    IntOne,
    True,
    False,
    TextConst(String),
    NoObject,
    TransformConst {
        rotation: [f32; 4],
        translation: [f32; 3],
        scale: [f32; 3],
    },
    IntConstByte(u8),
    NoInterface,
    DynamicCast {
        class: PackageIndex,
        operand: Box<Instruction>,
    },
    StructConst {
        struct_ref: PackageIndex,
        struct_size: i32,
        values: Vec<Instruction>,
    },
    EndStructConst,
    SetArray {
        /// Format revisions at or after the SetArray change carry the target expression
        assigning_property: Option<Box<Instruction>>,
        /// Earlier revisions carry a raw reference to the array's inner property
        inner_property: Option<PackageIndex>,
        elements: Vec<Instruction>,
    },
    EndArray,
    PropertyConst(PropertyPointer),
    UnicodeStringConst(String),
    Int64Const(i64),
    UInt64Const(u64),
    PrimitiveCast {
        conversion: u8,
        operand: Box<Instruction>,
    },
    SetSet {
        set_property: Box<Instruction>,
        elements: Vec<Instruction>,
    },
    EndSet,
    SetMap {
        map_property: Box<Instruction>,
        elements: Vec<Instruction>,
    },
    EndMap,
    SetConst {
        inner_property: PropertyPointer,
        elements: Vec<Instruction>,
    },
    EndSetConst,
    MapConst {
        key_property: PropertyPointer,
        value_property: PropertyPointer,
        elements: Vec<Instruction>,
    },
    EndMapConst,
    StructMemberContext {
        member: PropertyPointer,
        struct_expression: Box<Instruction>,
    },
    LetMulticastDelegate {
        variable: Box<Instruction>,
        expression: Box<Instruction>,
    },
    LetDelegate {
        variable: Box<Instruction>,
        expression: Box<Instruction>,
    },
    LocalVirtualFunction {
        name: String,
        parameters: Vec<Instruction>,
    },
    LocalFinalFunction {
        function: PackageIndex,
        parameters: Vec<Instruction>,
    },
    DeprecatedOp4A,
    InstanceDelegate(String),
    PushExecutionFlow(CodeOffset),
    PopExecutionFlow,
    ComputedJump(Box<Instruction>),
    PopExecutionFlowIfNot(Box<Instruction>),
    Breakpoint,
    InterfaceContext(Box<Instruction>),
    ObjToInterfaceCast {
        class: PackageIndex,
        operand: Box<Instruction>,
    },
    EndOfScript,
    CrossInterfaceCast {
        class: PackageIndex,
        operand: Box<Instruction>,
    },
    InterfaceToObjCast {
        class: PackageIndex,
        operand: Box<Instruction>,
    },
    WireTracepoint,
    SkipOffsetConst(CodeOffset),
    AddMulticastDelegate {
        delegate: Box<Instruction>,
        delegate_to_add: Box<Instruction>,
    },
    ClearMulticastDelegate(Box<Instruction>),
    Tracepoint,
    LetObj {
        variable: Box<Instruction>,
        expression: Box<Instruction>,
    },
    LetWeakObjPtr {
        variable: Box<Instruction>,
        expression: Box<Instruction>,
    },
    BindDelegate {
        function_name: String,
        delegate: Box<Instruction>,
        object: Box<Instruction>,
    },
    RemoveMulticastDelegate {
        delegate: Box<Instruction>,
        delegate_to_remove: Box<Instruction>,
    },
    CallMulticastDelegate {
        signature: PackageIndex,
        delegate: Box<Instruction>,
        parameters: Vec<Instruction>,
    },
    LetValueOnPersistentFrame {
        destination: PropertyPointer,
        expression: Box<Instruction>,
    },
    ArrayConst {
        inner_property: PropertyPointer,
        elements: Vec<Instruction>,
    },
    EndArrayConst,
    SoftObjectConst(Box<Instruction>),
    CallMath {
        function: PackageIndex,
        parameters: Vec<Instruction>,
    },
    SwitchValue {
        end_goto_offset: CodeOffset,
        index: Box<Instruction>,
        cases: Vec<SwitchCaseNode>,
        default: Box<Instruction>,
    },
    InstrumentationEvent(u8),
    ArrayGetByRef {
        array: Box<Instruction>,
        index: Box<Instruction>,
    },
    FieldPathConst(Box<Instruction>),
}

impl Instruction {
    /// Opcode byte and mnemonic
    pub fn opcode(&self) -> (u8, &'static str) {
        use Instruction::*;
        match self {
            LocalVariable(_) => (0x00, "EX_LocalVariable"),
            InstanceVariable(_) => (0x01, "EX_InstanceVariable"),
            DefaultVariable(_) => (0x02, "EX_DefaultVariable"),
            Return(_) => (0x04, "EX_Return"),
            Jump(_) => (0x06, "EX_Jump"),
            JumpIfNot { .. } => (0x07, "EX_JumpIfNot"),
            Assert { .. } => (0x09, "EX_Assert"),
            Nothing => (0x0B, "EX_Nothing"),
            Let { .. } => (0x0F, "EX_Let"),
            ClassContext(_) => (0x12, "EX_ClassContext"),
            MetaCast { .. } => (0x13, "EX_MetaCast"),
            LetBool { .. } => (0x14, "EX_LetBool"),
            EndParmValue => (0x15, "EX_EndParmValue"),
            EndFunctionParms => (0x16, "EX_EndFunctionParms"),
            SelfObject => (0x17, "EX_Self"),
            Skip { .. } => (0x18, "EX_Skip"),
            Context(_) => (0x19, "EX_Context"),
            ContextFailSilent(_) => (0x1A, "EX_Context_FailSilent"),
            VirtualFunction { .. } => (0x1B, "EX_VirtualFunction"),
            FinalFunction { .. } => (0x1C, "EX_FinalFunction"),
            IntConst(_) | LabelOffset(_) => (0x1D, "EX_IntConst"),
            FloatConst(_) => (0x1E, "EX_FloatConst"),
            StringConst(_) => (0x1F, "EX_StringConst"),
            ObjectConst(_) => (0x20, "EX_ObjectConst"),
            NameConst(_) => (0x21, "EX_NameConst"),
            RotationConst { .. } => (0x22, "EX_RotationConst"),
            VectorConst { .. } => (0x23, "EX_VectorConst"),
            ByteConst(_) => (0x24, "EX_ByteConst"),
            IntZero => (0x25, "EX_IntZero"),
            IntOne => (0x26, "EX_IntOne"),
            True => (0x27, "EX_True"),
            False => (0x28, "EX_False"),
            TextConst(_) => (0x29, "EX_TextConst"),
            NoObject => (0x2A, "EX_NoObject"),
            TransformConst { .. } => (0x2B, "EX_TransformConst"),
            IntConstByte(_) => (0x2C, "EX_IntConstByte"),
            NoInterface => (0x2D, "EX_NoInterface"),
            DynamicCast { .. } => (0x2E, "EX_DynamicCast"),
            StructConst { .. } => (0x2F, "EX_StructConst"),
            EndStructConst => (0x30, "EX_EndStructConst"),
            SetArray { .. } => (0x31, "EX_SetArray"),
            EndArray => (0x32, "EX_EndArray"),
            PropertyConst(_) => (0x33, "EX_PropertyConst"),
            UnicodeStringConst(_) => (0x34, "EX_UnicodeStringConst"),
            Int64Const(_) => (0x35, "EX_Int64Const"),
            UInt64Const(_) => (0x36, "EX_UInt64Const"),
            PrimitiveCast { .. } => (0x38, "EX_PrimitiveCast"),
            SetSet { .. } => (0x39, "EX_SetSet"),
            EndSet => (0x3A, "EX_EndSet"),
            SetMap { .. } => (0x3B, "EX_SetMap"),
            EndMap => (0x3C, "EX_EndMap"),
            SetConst { .. } => (0x3D, "EX_SetConst"),
            EndSetConst => (0x3E, "EX_EndSetConst"),
            MapConst { .. } => (0x3F, "EX_MapConst"),
            EndMapConst => (0x40, "EX_EndMapConst"),
            StructMemberContext { .. } => (0x42, "EX_StructMemberContext"),
            LetMulticastDelegate { .. } => (0x43, "EX_LetMulticastDelegate"),
            LetDelegate { .. } => (0x44, "EX_LetDelegate"),
            LocalVirtualFunction { .. } => (0x45, "EX_LocalVirtualFunction"),
            LocalFinalFunction { .. } => (0x46, "EX_LocalFinalFunction"),
            LocalOutVariable(_) => (0x48, "EX_LocalOutVariable"),
            DeprecatedOp4A => (0x4A, "EX_DeprecatedOp4A"),
            InstanceDelegate(_) => (0x4B, "EX_InstanceDelegate"),
            PushExecutionFlow(_) => (0x4C, "EX_PushExecutionFlow"),
            PopExecutionFlow => (0x4D, "EX_PopExecutionFlow"),
            ComputedJump(_) => (0x4E, "EX_ComputedJump"),
            PopExecutionFlowIfNot(_) => (0x4F, "EX_PopExecutionFlowIfNot"),
            Breakpoint => (0x50, "EX_Breakpoint"),
            InterfaceContext(_) => (0x51, "EX_InterfaceContext"),
            ObjToInterfaceCast { .. } => (0x52, "EX_ObjToInterfaceCast"),
            EndOfScript => (0x53, "EX_EndOfScript"),
            CrossInterfaceCast { .. } => (0x54, "EX_CrossInterfaceCast"),
            InterfaceToObjCast { .. } => (0x55, "EX_InterfaceToObjCast"),
            WireTracepoint => (0x5A, "EX_WireTracepoint"),
            SkipOffsetConst(_) => (0x5B, "EX_SkipOffsetConst"),
            AddMulticastDelegate { .. } => (0x5C, "EX_AddMulticastDelegate"),
            ClearMulticastDelegate(_) => (0x5D, "EX_ClearMulticastDelegate"),
            Tracepoint => (0x5E, "EX_Tracepoint"),
            LetObj { .. } => (0x5F, "EX_LetObj"),
            LetWeakObjPtr { .. } => (0x60, "EX_LetWeakObjPtr"),
            BindDelegate { .. } => (0x61, "EX_BindDelegate"),
            RemoveMulticastDelegate { .. } => (0x62, "EX_RemoveMulticastDelegate"),
            CallMulticastDelegate { .. } => (0x63, "EX_CallMulticastDelegate"),
            LetValueOnPersistentFrame { .. } => (0x64, "EX_LetValueOnPersistentFrame"),
            ArrayConst { .. } => (0x65, "EX_ArrayConst"),
            EndArrayConst => (0x66, "EX_EndArrayConst"),
            SoftObjectConst(_) => (0x67, "EX_SoftObjectConst"),
            CallMath { .. } => (0x68, "EX_CallMath"),
            SwitchValue { .. } => (0x69, "EX_SwitchValue"),
            InstrumentationEvent(_) => (0x6A, "EX_InstrumentationEvent"),
            ArrayGetByRef { .. } => (0x6B, "EX_ArrayGetByRef"),
            ClassSparseDataVariable(_) => (0x6C, "EX_ClassSparseDataVariable"),
            FieldPathConst(_) => (0x6D, "EX_FieldPathConst"),
        }
    }

    pub fn name(&self) -> &'static str {
        self.opcode().1
    }

    /// The storage location this expression reads or writes, if it names one
    pub fn property_pointer(&self) -> Option<&PropertyPointer> {
        match self {
            Instruction::LocalVariable(p)
            | Instruction::InstanceVariable(p)
            | Instruction::DefaultVariable(p)
            | Instruction::LocalOutVariable(p)
            | Instruction::ClassSparseDataVariable(p) => Some(p),
            Instruction::StructMemberContext { member, .. } => Some(member),
            Instruction::Context(node)
            | Instruction::ContextFailSilent(node)
            | Instruction::ClassContext(node) => {
                if node.r_value.is_null() {
                    None
                } else {
                    Some(&node.r_value)
                }
            }
            _ => None,
        }
    }
}

fn write_list(f: &mut fmt::Formatter, items: &[Instruction]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Instruction::*;
        let name = self.name();
        match self {
            LocalVariable(p)
            | InstanceVariable(p)
            | DefaultVariable(p)
            | LocalOutVariable(p)
            | ClassSparseDataVariable(p)
            | PropertyConst(p) => write!(f, "{}{}", name, p),
            Return(e) | ComputedJump(e) | PopExecutionFlowIfNot(e) | InterfaceContext(e)
            | SoftObjectConst(e) | FieldPathConst(e) | ClearMulticastDelegate(e) => {
                write!(f, "{}({})", name, e)
            }
            Jump(t) | PushExecutionFlow(t) | SkipOffsetConst(t) => write!(f, "{} {}", name, t),
            JumpIfNot { target, condition } => write!(f, "{} {} ({})", name, target, condition),
            Assert {
                line,
                debug_only,
                condition,
            } => write!(f, "{}(line {}, debug {}, {})", name, line, debug_only, condition),
            Let {
                value,
                variable,
                expression,
            } => write!(f, "{}{} {} = {}", name, value, variable, expression),
            LetBool {
                variable,
                expression,
            }
            | LetObj {
                variable,
                expression,
            }
            | LetWeakObjPtr {
                variable,
                expression,
            }
            | LetDelegate {
                variable,
                expression,
            }
            | LetMulticastDelegate {
                variable,
                expression,
            } => write!(f, "{} {} = {}", name, variable, expression),
            LetValueOnPersistentFrame {
                destination,
                expression,
            } => write!(f, "{}{} = {}", name, destination, expression),
            Context(node) | ContextFailSilent(node) | ClassContext(node) => {
                let skip = node
                    .skip_size
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "?".to_string());
                write!(
                    f,
                    "{}({} -> {}, skip {}, rvalue {})",
                    name, node.object, node.member, skip, node.r_value
                )
            }
            MetaCast { class, operand }
            | DynamicCast { class, operand }
            | ObjToInterfaceCast { class, operand }
            | CrossInterfaceCast { class, operand }
            | InterfaceToObjCast { class, operand } => {
                write!(f, "{}<{}>({})", name, class, operand)
            }
            PrimitiveCast {
                conversion,
                operand,
            } => write!(f, "{}<0x{:02x}>({})", name, conversion, operand),
            Skip { target, expression } => write!(f, "{} {} ({})", name, target, expression),
            VirtualFunction { name: func, parameters }
            | LocalVirtualFunction { name: func, parameters } => {
                write!(f, "{} {}(", name, func)?;
                write_list(f, parameters)?;
                write!(f, ")")
            }
            FinalFunction {
                function,
                parameters,
            }
            | LocalFinalFunction {
                function,
                parameters,
            }
            | CallMath {
                function,
                parameters,
            } => {
                write!(f, "{} [{}](", name, function)?;
                write_list(f, parameters)?;
                write!(f, ")")
            }
            IntConst(v) => write!(f, "{}({})", name, v),
            LabelOffset(t) => write!(f, "{}({})", name, t),
            FloatConst(v) => write!(f, "{}({})", name, v),
            StringConst(s) | UnicodeStringConst(s) | TextConst(s) => {
                write!(f, "{}({:?})", name, s)
            }
            NameConst(s) | InstanceDelegate(s) => write!(f, "{}({})", name, s),
            ObjectConst(i) => write!(f, "{}[{}]", name, i),
            RotationConst { pitch, yaw, roll } => {
                write!(f, "{}({}, {}, {})", name, pitch, yaw, roll)
            }
            VectorConst { x, y, z } => write!(f, "{}({}, {}, {})", name, x, y, z),
            TransformConst {
                rotation,
                translation,
                scale,
            } => write!(
                f,
                "{}({:?}, {:?}, {:?})",
                name, rotation, translation, scale
            ),
            ByteConst(v) | IntConstByte(v) | InstrumentationEvent(v) => {
                write!(f, "{}({})", name, v)
            }
            Int64Const(v) => write!(f, "{}({})", name, v),
            UInt64Const(v) => write!(f, "{}({})", name, v),
            StructConst {
                struct_ref,
                struct_size,
                values,
            } => {
                write!(f, "{}[{}; {}](", name, struct_ref, struct_size)?;
                write_list(f, values)?;
                write!(f, ")")
            }
            SetArray {
                assigning_property,
                inner_property,
                elements,
            } => {
                match (assigning_property, inner_property) {
                    (Some(target), _) => write!(f, "{} {} = [", name, target)?,
                    (None, Some(inner)) => write!(f, "{} [{}] = [", name, inner)?,
                    (None, None) => write!(f, "{} ? = [", name)?,
                }
                write_list(f, elements)?;
                write!(f, "]")
            }
            SetSet {
                set_property: target,
                elements,
            }
            | SetMap {
                map_property: target,
                elements,
            } => {
                write!(f, "{} {} = [", name, target)?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            SetConst {
                inner_property,
                elements,
            }
            | ArrayConst {
                inner_property,
                elements,
            } => {
                write!(f, "{}{}[", name, inner_property)?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            MapConst {
                key_property,
                value_property,
                elements,
            } => {
                write!(f, "{}{}{}[", name, key_property, value_property)?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            StructMemberContext {
                member,
                struct_expression,
            } => write!(f, "{}{}({})", name, member, struct_expression),
            BindDelegate {
                function_name,
                delegate,
                object,
            } => write!(f, "{} {}({}, {})", name, function_name, delegate, object),
            AddMulticastDelegate {
                delegate,
                delegate_to_add: other,
            }
            | RemoveMulticastDelegate {
                delegate,
                delegate_to_remove: other,
            } => write!(f, "{}({}, {})", name, delegate, other),
            CallMulticastDelegate {
                signature,
                delegate,
                parameters,
            } => {
                write!(f, "{} [{}] {}(", name, signature, delegate)?;
                write_list(f, parameters)?;
                write!(f, ")")
            }
            SwitchValue {
                end_goto_offset,
                index,
                cases,
                default,
            } => {
                write!(f, "{}({}, end {}", name, index, end_goto_offset)?;
                for case in cases {
                    write!(f, ", {} => {} next {}", case.value, case.result, case.next_offset)?;
                }
                write!(f, ", default => {})", default)
            }
            ArrayGetByRef { array, index } => write!(f, "{}({}[{}])", name, array, index),
            Nothing | EndParmValue | EndFunctionParms | SelfObject | IntZero | IntOne | True
            | False | NoObject | NoInterface | EndStructConst | EndArray | EndSet | EndMap
            | EndSetConst | EndMapConst | DeprecatedOp4A | PopExecutionFlow | Breakpoint
            | EndOfScript | WireTracepoint | Tracepoint | EndArrayConst => write!(f, "{}", name),
        }
    }
}
