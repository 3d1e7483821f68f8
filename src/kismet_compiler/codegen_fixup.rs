// Fixup pass
//
// Runs once after every procedure of the unit has been compiled, so labels placed
// in one procedure (ubergraph entry points) can be referenced from any other.
// Pending jump targets and label values are replaced by their label's offset,
// switch-value labels are placed on the case boundaries they stand for, and context
// nodes get the byte length of their member expression.

use crate::kismet_compiler::bytecode::{CodeOffset, Instruction};
use crate::kismet_compiler::bytecode_size::SizeModel;
use crate::kismet_compiler::codegen::ScriptCompiler;
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::script::Script;

impl<'a> ScriptCompiler<'a> {
    pub(crate) fn fixup_script(&mut self, script: &mut Script) -> Result<(), CompilerError> {
        let functions = script
            .functions
            .iter_mut()
            .chain(script.classes.iter_mut().flat_map(|class| class.functions.iter_mut()));
        for function in functions {
            log::debug!("CODEGEN: fixup of '{}'", function.name);
            self.fixup_function(&mut function.instructions)?;
        }
        Ok(())
    }

    /// Patch one function's linear bytecode, which starts at offset zero
    pub(crate) fn fixup_function(&mut self, instructions: &mut [Instruction]) -> Result<(), CompilerError> {
        let model = self.size_model();
        let mut offset = 0;
        for instruction in instructions {
            self.fixup_instruction(&model, instruction, offset)?;
            offset += model.serialized_size(instruction);
        }
        Ok(())
    }

    /// Patch one node whose first byte sits at absolute offset `start`, then its children
    fn fixup_instruction(
        &mut self,
        model: &SizeModel,
        instruction: &mut Instruction,
        start: usize,
    ) -> Result<(), CompilerError> {
        if let Instruction::SwitchValue { .. } = instruction {
            let boundaries = model.switch_boundaries(instruction, start);
            if let Instruction::SwitchValue {
                end_goto_offset,
                cases,
                ..
            } = instruction
            {
                // Labels are placed positionally: end first, then one per case
                let offsets = std::iter::once(end_goto_offset).chain(cases.iter_mut().map(|c| &mut c.next_offset));
                for (offset, boundary) in offsets.zip(boundaries) {
                    if let CodeOffset::Pending(label) = *offset {
                        self.symbols.set_label_offset(label, boundary);
                    }
                    *offset = self.resolved(*offset)?;
                }
            }
        }

        if let Instruction::LabelOffset(target) = *instruction {
            if let CodeOffset::Resolved(value) = self.resolved(target)? {
                *instruction = Instruction::IntConst(value as i32);
            }
        }

        match instruction {
            Instruction::Jump(target)
            | Instruction::PushExecutionFlow(target)
            | Instruction::SkipOffsetConst(target)
            | Instruction::JumpIfNot { target, .. }
            | Instruction::Skip { target, .. } => {
                *target = self.resolved(*target)?;
            }
            Instruction::Context(node) | Instruction::ContextFailSilent(node) | Instruction::ClassContext(node) => {
                node.skip_size = Some(model.serialized_size(&node.member) as u32);
            }
            _ => {}
        }

        let child_starts = model.layout(instruction).child_starts;
        for (child, relative) in instruction.children_mut().into_iter().zip(child_starts) {
            self.fixup_instruction(model, child, start + relative)?;
        }
        Ok(())
    }

    fn resolved(&self, offset: CodeOffset) -> Result<CodeOffset, CompilerError> {
        match offset {
            CodeOffset::Resolved(_) => Ok(offset),
            CodeOffset::Pending(label) => match self.symbols.get(label).code_offset() {
                Some(value) => {
                    log::debug!("CODEGEN: fixup '{}' -> {:04x}", self.symbols.name(label), value);
                    Ok(CodeOffset::Resolved(value as u32))
                }
                None => Err(CompilerError::bug(format!(
                    "label '{}' was never resolved",
                    self.symbols.name(label)
                ))),
            },
        }
    }
}
