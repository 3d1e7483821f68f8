// Serialized byte sizes of instruction nodes
//
// Sizes follow the in-memory script layout the VM executes: object references and
// property pointers take pointer width, names take index + number + padding.
// `layout` is the single description of field order; `serialized_size` and the
// absolute-offset walk used by the fixup pass are both derived from it.

use crate::kismet_compiler::bytecode::Instruction;

const U8: usize = 1;
const U16: usize = 2;
const I32: usize = 4;
const F32: usize = 4;
const I64: usize = 8;
const CODE_OFFSET: usize = 4;
const VECTOR: usize = 12;
const ROTATOR: usize = 12;
const TRANSFORM: usize = 40;
const END_MARKER: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeModel {
    pub opcode: usize,
    pub object_ref: usize,
    pub property_ref: usize,
    pub name: usize,
}

impl Default for SizeModel {
    fn default() -> Self {
        SizeModel {
            opcode: 1,
            object_ref: 8,
            property_ref: 8,
            name: 12,
        }
    }
}

/// Total size of a node plus the offsets (relative to the node's first byte) at
/// which each child expression starts, in the order of `Instruction::children_mut`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub child_starts: Vec<usize>,
}

struct LayoutBuilder<'m> {
    model: &'m SizeModel,
    offset: usize,
    child_starts: Vec<usize>,
}

impl<'m> LayoutBuilder<'m> {
    fn new(model: &'m SizeModel) -> Self {
        LayoutBuilder {
            model,
            offset: model.opcode,
            child_starts: Vec::new(),
        }
    }

    fn skip(&mut self, bytes: usize) -> &mut Self {
        self.offset += bytes;
        self
    }

    fn child(&mut self, instruction: &Instruction) -> &mut Self {
        self.child_starts.push(self.offset);
        self.offset += self.model.serialized_size(instruction);
        self
    }

    fn children(&mut self, instructions: &[Instruction]) -> &mut Self {
        for instruction in instructions {
            self.child(instruction);
        }
        self
    }

    fn finish(&mut self) -> Layout {
        Layout {
            size: self.offset,
            child_starts: std::mem::take(&mut self.child_starts),
        }
    }
}

fn ansi_string_size(s: &str) -> usize {
    s.len() + 1
}

fn unicode_string_size(s: &str) -> usize {
    (s.encode_utf16().count() + 1) * 2
}

impl SizeModel {
    pub fn serialized_size(&self, instruction: &Instruction) -> usize {
        self.layout(instruction).size
    }

    pub fn layout(&self, instruction: &Instruction) -> Layout {
        use Instruction::*;
        let mut b = LayoutBuilder::new(self);
        match instruction {
            LocalVariable(_)
            | InstanceVariable(_)
            | DefaultVariable(_)
            | LocalOutVariable(_)
            | ClassSparseDataVariable(_)
            | PropertyConst(_) => {
                b.skip(self.property_ref);
            }
            Return(e) | ComputedJump(e) | PopExecutionFlowIfNot(e) | InterfaceContext(e)
            | SoftObjectConst(e) | FieldPathConst(e) | ClearMulticastDelegate(e) => {
                b.child(e);
            }
            Jump(_) | PushExecutionFlow(_) | SkipOffsetConst(_) => {
                b.skip(CODE_OFFSET);
            }
            JumpIfNot { condition, .. } => {
                b.skip(CODE_OFFSET).child(condition);
            }
            Assert { condition, .. } => {
                b.skip(U16).skip(U8).child(condition);
            }
            Let {
                variable,
                expression,
                ..
            } => {
                b.skip(self.property_ref).child(variable).child(expression);
            }
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
            } => {
                b.child(variable).child(expression);
            }
            LetValueOnPersistentFrame { expression, .. } => {
                b.skip(self.property_ref).child(expression);
            }
            Context(node) | ContextFailSilent(node) | ClassContext(node) => {
                b.child(&node.object)
                    .skip(CODE_OFFSET)
                    .skip(self.property_ref)
                    .child(&node.member);
            }
            MetaCast { operand, .. }
            | DynamicCast { operand, .. }
            | ObjToInterfaceCast { operand, .. }
            | CrossInterfaceCast { operand, .. }
            | InterfaceToObjCast { operand, .. } => {
                b.skip(self.object_ref).child(operand);
            }
            PrimitiveCast { operand, .. } => {
                b.skip(U8).child(operand);
            }
            Skip { expression, .. } => {
                b.skip(CODE_OFFSET).child(expression);
            }
            VirtualFunction { parameters, .. } | LocalVirtualFunction { parameters, .. } => {
                b.skip(self.name).children(parameters).skip(END_MARKER);
            }
            FinalFunction { parameters, .. }
            | LocalFinalFunction { parameters, .. }
            | CallMath { parameters, .. } => {
                b.skip(self.object_ref).children(parameters).skip(END_MARKER);
            }
            IntConst(_) | LabelOffset(_) => {
                b.skip(I32);
            }
            FloatConst(_) => {
                b.skip(F32);
            }
            StringConst(s) => {
                b.skip(ansi_string_size(s));
            }
            UnicodeStringConst(s) => {
                b.skip(unicode_string_size(s));
            }
            TextConst(s) => {
                // literal-string text: history type byte + string
                b.skip(U8).skip(ansi_string_size(s));
            }
            ObjectConst(_) => {
                b.skip(self.object_ref);
            }
            NameConst(_) | InstanceDelegate(_) => {
                b.skip(self.name);
            }
            RotationConst { .. } => {
                b.skip(ROTATOR);
            }
            VectorConst { .. } => {
                b.skip(VECTOR);
            }
            TransformConst { .. } => {
                b.skip(TRANSFORM);
            }
            ByteConst(_) | IntConstByte(_) | InstrumentationEvent(_) => {
                b.skip(U8);
            }
            Int64Const(_) | UInt64Const(_) => {
                b.skip(I64);
            }
            StructConst { values, .. } => {
                b.skip(self.object_ref)
                    .skip(I32)
                    .children(values)
                    .skip(END_MARKER);
            }
            SetArray {
                assigning_property,
                elements,
                ..
            } => {
                match assigning_property {
                    Some(target) => b.child(target),
                    None => b.skip(self.object_ref),
                };
                b.children(elements).skip(END_MARKER);
            }
            SetSet {
                set_property: target,
                elements,
            }
            | SetMap {
                map_property: target,
                elements,
            } => {
                b.child(target).skip(I32).children(elements).skip(END_MARKER);
            }
            SetConst { elements, .. } | ArrayConst { elements, .. } => {
                b.skip(self.property_ref)
                    .skip(I32)
                    .children(elements)
                    .skip(END_MARKER);
            }
            MapConst { elements, .. } => {
                b.skip(self.property_ref)
                    .skip(self.property_ref)
                    .skip(I32)
                    .children(elements)
                    .skip(END_MARKER);
            }
            StructMemberContext {
                struct_expression, ..
            } => {
                b.skip(self.property_ref).child(struct_expression);
            }
            BindDelegate {
                delegate, object, ..
            } => {
                b.skip(self.name).child(delegate).child(object);
            }
            AddMulticastDelegate {
                delegate,
                delegate_to_add: other,
            }
            | RemoveMulticastDelegate {
                delegate,
                delegate_to_remove: other,
            } => {
                b.child(delegate).child(other);
            }
            CallMulticastDelegate {
                delegate,
                parameters,
                ..
            } => {
                b.skip(self.object_ref)
                    .child(delegate)
                    .children(parameters)
                    .skip(END_MARKER);
            }
            SwitchValue {
                index,
                cases,
                default,
                ..
            } => {
                b.skip(U16).skip(CODE_OFFSET).child(index);
                for case in cases {
                    b.child(&case.value).skip(CODE_OFFSET).child(&case.result);
                }
                b.child(default);
            }
            ArrayGetByRef { array, index } => {
                b.child(array).child(index);
            }
            Nothing | EndParmValue | EndFunctionParms | SelfObject | IntZero | IntOne | True
            | False | NoObject | NoInterface | EndStructConst | EndArray | EndSet | EndMap
            | EndSetConst | EndMapConst | DeprecatedOp4A | PopExecutionFlow | Breakpoint
            | EndOfScript | WireTracepoint | Tracepoint | EndArrayConst => {}
        }
        b.finish()
    }

    /// Absolute offsets of a switch-value's case boundaries, given the node's own
    /// absolute start: index 0 is the end of the whole expression, index i+1 is the
    /// end of case i (where the next case, or the default term, begins).
    pub fn switch_boundaries(&self, instruction: &Instruction, start: usize) -> Vec<usize> {
        let mut boundaries = Vec::new();
        if let Instruction::SwitchValue { index, cases, .. } = instruction {
            boundaries.push(start + self.serialized_size(instruction));
            let mut cursor = start + self.opcode + U16 + CODE_OFFSET + self.serialized_size(index);
            for case in cases {
                cursor += self.serialized_size(&case.value)
                    + CODE_OFFSET
                    + self.serialized_size(&case.result);
                boundaries.push(cursor);
            }
        }
        boundaries
    }
}

impl Instruction {
    /// Child expressions in serialization order, matching `Layout::child_starts`
    pub fn children_mut(&mut self) -> Vec<&mut Instruction> {
        use Instruction::*;
        match self {
            Return(e) | ComputedJump(e) | PopExecutionFlowIfNot(e) | InterfaceContext(e)
            | SoftObjectConst(e) | FieldPathConst(e) | ClearMulticastDelegate(e) => {
                vec![e.as_mut()]
            }
            JumpIfNot { condition, .. } | Assert { condition, .. } => vec![condition.as_mut()],
            Let {
                variable,
                expression,
                ..
            }
            | LetBool {
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
            } => vec![variable.as_mut(), expression.as_mut()],
            LetValueOnPersistentFrame { expression, .. } | Skip { expression, .. } => {
                vec![expression.as_mut()]
            }
            Context(node) | ContextFailSilent(node) | ClassContext(node) => {
                vec![node.object.as_mut(), node.member.as_mut()]
            }
            MetaCast { operand, .. }
            | DynamicCast { operand, .. }
            | ObjToInterfaceCast { operand, .. }
            | CrossInterfaceCast { operand, .. }
            | InterfaceToObjCast { operand, .. }
            | PrimitiveCast { operand, .. } => vec![operand.as_mut()],
            VirtualFunction { parameters, .. }
            | LocalVirtualFunction { parameters, .. }
            | FinalFunction { parameters, .. }
            | LocalFinalFunction { parameters, .. }
            | CallMath { parameters, .. } => parameters.iter_mut().collect(),
            StructConst { values, .. } => values.iter_mut().collect(),
            SetArray {
                assigning_property,
                elements,
                ..
            } => {
                let mut children: Vec<&mut Instruction> = Vec::new();
                if let Some(target) = assigning_property {
                    children.push(target.as_mut());
                }
                children.extend(elements.iter_mut());
                children
            }
            SetSet {
                set_property: target,
                elements,
            }
            | SetMap {
                map_property: target,
                elements,
            } => {
                let mut children: Vec<&mut Instruction> = vec![target.as_mut()];
                children.extend(elements.iter_mut());
                children
            }
            SetConst { elements, .. } | ArrayConst { elements, .. } | MapConst { elements, .. } => {
                elements.iter_mut().collect()
            }
            StructMemberContext {
                struct_expression, ..
            } => vec![struct_expression.as_mut()],
            BindDelegate {
                delegate, object, ..
            } => vec![delegate.as_mut(), object.as_mut()],
            AddMulticastDelegate {
                delegate,
                delegate_to_add: other,
            }
            | RemoveMulticastDelegate {
                delegate,
                delegate_to_remove: other,
            } => vec![delegate.as_mut(), other.as_mut()],
            CallMulticastDelegate {
                delegate,
                parameters,
                ..
            } => {
                let mut children: Vec<&mut Instruction> = vec![delegate.as_mut()];
                children.extend(parameters.iter_mut());
                children
            }
            SwitchValue {
                index,
                cases,
                default,
                ..
            } => {
                let mut children: Vec<&mut Instruction> = vec![index.as_mut()];
                for case in cases.iter_mut() {
                    children.push(&mut case.value);
                    children.push(&mut case.result);
                }
                children.push(default.as_mut());
                children
            }
            ArrayGetByRef { array, index } => vec![array.as_mut(), index.as_mut()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kismet_compiler::bytecode::{CodeOffset, PropertyPointer, SwitchCaseNode};
    use crate::kismet_compiler::package::PackageIndex;

    #[test]
    fn test_fixed_sizes() {
        let model = SizeModel::default();
        assert_eq!(model.serialized_size(&Instruction::EndOfScript), 1);
        assert_eq!(model.serialized_size(&Instruction::IntConst(7)), 5);
        assert_eq!(
            model.serialized_size(&Instruction::LocalVariable(PropertyPointer::null())),
            9
        );
        assert_eq!(model.serialized_size(&Instruction::Jump(CodeOffset::Resolved(0))), 5);
        assert_eq!(
            model.serialized_size(&Instruction::StringConst("abc".to_string())),
            5
        );
        assert_eq!(
            model.serialized_size(&Instruction::UnicodeStringConst("é".to_string())),
            5
        );
    }

    #[test]
    fn test_call_counts_end_of_parameters() {
        let model = SizeModel::default();
        let call = Instruction::CallMath {
            function: PackageIndex(-4),
            parameters: vec![Instruction::IntConst(1), Instruction::IntConst(2)],
        };
        // opcode + stack node + 2 * IntConst + EX_EndFunctionParms
        assert_eq!(model.serialized_size(&call), 1 + 8 + 5 + 5 + 1);
        assert_eq!(model.layout(&call).child_starts, vec![9, 14]);
    }

    #[test]
    fn test_switch_boundaries() {
        let model = SizeModel::default();
        let switch = Instruction::SwitchValue {
            end_goto_offset: CodeOffset::Resolved(0),
            index: Box::new(Instruction::IntConst(0)),
            cases: vec![
                SwitchCaseNode {
                    value: Instruction::IntConst(0),
                    next_offset: CodeOffset::Resolved(0),
                    result: Instruction::True,
                },
                SwitchCaseNode {
                    value: Instruction::IntConst(1),
                    next_offset: CodeOffset::Resolved(0),
                    result: Instruction::False,
                },
            ],
            default: Box::new(Instruction::False),
        };
        // 1 + 2 + 4 + 5 = 12 header, cases are 5 + 4 + 1 = 10 each, default 1
        assert_eq!(model.serialized_size(&switch), 33);
        assert_eq!(model.switch_boundaries(&switch, 100), vec![133, 122, 132]);
    }

    #[test]
    fn test_children_match_layout() {
        let model = SizeModel::default();
        let mut let_node = Instruction::Let {
            value: PropertyPointer::null(),
            variable: Box::new(Instruction::LocalVariable(PropertyPointer::null())),
            expression: Box::new(Instruction::IntConst(3)),
        };
        let layout = model.layout(&let_node);
        assert_eq!(layout.child_starts.len(), let_node.children_mut().len());
        assert_eq!(layout.child_starts, vec![9, 18]);
        assert_eq!(layout.size, 23);
    }
}
