// Kismet script code generator
//
// Walks the syntax tree of one compilation unit and emits bytecode instruction nodes
// per procedure. All mutable compilation state (scope stack, member contexts, the
// r-value slot, the current function) lives on one ScriptCompiler value; nothing is
// global, so independent compilations never observe each other.
//
// The implementation is split across files:
//   codegen_context.rs     identifier resolution and member-access contexts
//   codegen_expressions.rs expressions, operators, casts, calls, assignment
//   codegen_statements.rs  statements and control flow
//   codegen_intrinsics.rs  EX_* intrinsic dispatch
//   codegen_fixup.rs       jump target, label value and skip-size patching

use crate::kismet_compiler::ast::*;
use crate::kismet_compiler::bytecode::{CodeOffset, Instruction, PropertyPointer};
use crate::kismet_compiler::bytecode_size::SizeModel;
use crate::kismet_compiler::config::{CompilerOptions, DEFAULT_OBJECT_PREFIX};
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::name_resolver::NameResolver;
use crate::kismet_compiler::package::{ImportEntry, ObjectTable, PackageIndex};
use crate::kismet_compiler::scope::{MemberContext, Scope, ScopeKind, ScopeStack};
use crate::kismet_compiler::script::*;
use crate::kismet_compiler::symbol_builder::{bind_package_reference, type_class_name, SymbolTree};
use crate::kismet_compiler::symbols::{
    SymbolCategory, SymbolId, SymbolKind, SymbolTable, VariableCategory,
};
use indexmap::IndexMap;

/// One emitted statement-level unit: the node it came from, the instructions it
/// produced and the labels those instructions still need patched.
///
/// Sub-expressions are folded into their parent's instruction tree, so only primary
/// contexts are recorded; their pending labels are gathered from the whole tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpressionContext {
    pub site: &'static str,
    pub span: SourceSpan,
    pub instructions: Vec<Instruction>,
    pub referenced_labels: Vec<SymbolId>,
    /// Absolute offset of the first instruction
    pub code_offset: usize,
}

#[derive(Debug, Clone)]
pub struct FunctionCompilationState {
    pub procedure: SymbolId,
    /// Serialized size of every primary instruction emitted so far
    pub code_offset: usize,
    pub contexts: Vec<CompiledExpressionContext>,
    pub return_label: SymbolId,
}

impl FunctionCompilationState {
    /// The linear bytecode of the function, in emission order
    pub fn instructions(&self) -> Vec<Instruction> {
        self.contexts
            .iter()
            .flat_map(|c| c.instructions.iter().cloned())
            .collect()
    }
}

pub struct ScriptCompiler<'a> {
    pub(crate) table: &'a mut dyn ObjectTable,
    pub(crate) options: &'a CompilerOptions,
    pub(crate) symbols: SymbolTable,
    pub(crate) scopes: ScopeStack,
    pub(crate) contexts: Vec<MemberContext>,
    pub(crate) rvalues: Vec<PropertyPointer>,
    pub(crate) current_class: Option<SymbolId>,
    pub(crate) function: Option<FunctionCompilationState>,
    pub(crate) package: SymbolId,
    library_functions: IndexMap<String, PackageIndex>,
}

impl<'a> ScriptCompiler<'a> {
    pub fn new(
        table: &'a mut dyn ObjectTable,
        options: &'a CompilerOptions,
        tree: SymbolTree,
    ) -> Self {
        ScriptCompiler {
            table,
            options,
            symbols: tree.symbols,
            scopes: ScopeStack::new(tree.globals),
            contexts: Vec::new(),
            rvalues: Vec::new(),
            current_class: None,
            function: None,
            package: tree.package,
            library_functions: IndexMap::new(),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn compile_unit(&mut self, unit: &CompilationUnit) -> Result<Script, CompilerError> {
        let mut script = Script::default();
        for declaration in &unit.declarations {
            match declaration {
                Declaration::Variable(variable) => {
                    script.properties.push(PropertyRecord {
                        name: variable.name.clone(),
                        type_name: variable.ty.to_string(),
                    });
                }
                Declaration::Procedure(procedure) => {
                    let id = self.declared(self.package, &procedure.name, SymbolCategory::Procedure, procedure.span)?;
                    if let Some(record) = self.compile_procedure(procedure, id)? {
                        script.functions.push(record);
                    }
                }
                Declaration::Class(class) => {
                    let id = self.declared(self.package, &class.name, SymbolCategory::Class, class.span)?;
                    script.classes.push(self.compile_class(class, id)?);
                }
            }
        }
        self.fixup_script(&mut script)?;
        log::debug!(
            "CODEGEN: compiled {} functions in {} classes",
            script.all_functions().count(),
            script.classes.len()
        );
        Ok(script)
    }

    /// Symbol created by the builder for a declaration under `parent`
    fn declared(
        &self,
        parent: SymbolId,
        name: &str,
        category: SymbolCategory,
        span: SourceSpan,
    ) -> Result<SymbolId, CompilerError> {
        if let Some(id) = self.symbols.member_named(parent, name, Some(category)) {
            return Ok(id);
        }
        // Members of a default object may have been moved onto its base
        let parent_symbol = self.symbols.get(parent);
        if self.options.default_object_reparenting && parent_symbol.name.starts_with(DEFAULT_OBJECT_PREFIX) {
            if let Some(id) = parent_symbol
                .base_class()
                .and_then(|base| self.symbols.member_named(base, name, Some(category)))
            {
                return Ok(id);
            }
        }
        Err(CompilerError::UnknownSymbol {
            name: name.to_string(),
            span,
        })
    }

    fn compile_class(&mut self, class: &ClassDecl, id: SymbolId) -> Result<ClassRecord, CompilerError> {
        let mut record = ClassRecord {
            name: class.name.clone(),
            base: class.base.clone(),
            flags: match class.kind {
                ClassKind::Class => 0,
                ClassKind::Struct => CLASS_STRUCT,
                ClassKind::Interface => CLASS_INTERFACE,
            },
            functions: Vec::new(),
            properties: Vec::new(),
        };

        let mut scope = Scope::new(ScopeKind::Class, Some(id));
        for &member in &self.symbols.get(id).members {
            scope.declare(self.symbols.name(member), member);
        }

        let outer_class = self.current_class.replace(id);
        let result = self.with_scope(scope, |c| {
            for member in &class.members {
                match member {
                    Declaration::Variable(variable) => record.properties.push(PropertyRecord {
                        name: variable.name.clone(),
                        type_name: variable.ty.to_string(),
                    }),
                    Declaration::Procedure(procedure) => {
                        let procedure_id =
                            c.declared(id, &procedure.name, SymbolCategory::Procedure, procedure.span)?;
                        if let Some(function) = c.compile_procedure(procedure, procedure_id)? {
                            record.functions.push(function);
                        }
                    }
                    Declaration::Class(nested) => {
                        return Err(CompilerError::unexpected("class member", &nested.name, nested.span));
                    }
                }
            }
            Ok(())
        });
        self.current_class = outer_class;
        result?;
        Ok(record)
    }

    fn function_flags(&self, id: SymbolId, modifiers: &Modifiers) -> u32 {
        let symbol = self.symbols.get(id);
        let mut flags = 0;
        if !symbol.is_virtual() {
            flags |= FUNC_FINAL;
        }
        if symbol.is_static() {
            flags |= FUNC_STATIC;
        }
        if modifiers.is_public {
            flags |= FUNC_PUBLIC;
        }
        if symbol.is_ubergraph() {
            flags |= FUNC_UBERGRAPH;
        }
        flags
    }

    /// Compile one procedure body; declarations without a body produce no function
    pub(crate) fn compile_procedure(
        &mut self,
        procedure: &ProcedureDecl,
        id: SymbolId,
    ) -> Result<Option<FunctionRecord>, CompilerError> {
        let body = match &procedure.body {
            Some(body) if !self.symbols.get(id).is_external => body,
            _ => return Ok(None),
        };

        let return_label = self.symbols.create(
            &format!("{}$return", procedure.name),
            SymbolKind::Label { code_offset: None },
            Some(id),
            false,
            procedure.span,
        );
        self.function = Some(FunctionCompilationState {
            procedure: id,
            code_offset: 0,
            contexts: Vec::new(),
            return_label,
        });

        let mut scope = Scope::new(ScopeKind::Procedure, Some(id));
        for &member in &self.symbols.get(id).members {
            scope.declare(self.symbols.name(member), member);
        }
        let saved_contexts = std::mem::take(&mut self.contexts);
        let saved_rvalues = std::mem::take(&mut self.rvalues);

        let compiled = self.with_scope(scope, |c| c.compile_body(body));
        let state = self.function.take();
        self.contexts = saved_contexts;
        self.rvalues = saved_rvalues;
        compiled?;

        let state = state.ok_or_else(|| CompilerError::bug("function state lost during compilation"))?;

        log::debug!(
            "CODEGEN: '{}' compiled to {} instructions, {} bytes",
            procedure.name,
            state.contexts.len(),
            state.code_offset
        );
        Ok(Some(FunctionRecord {
            name: procedure.name.clone(),
            export: self.symbols.get(id).package_reference.unwrap_or(PackageIndex::NULL),
            instructions: state.instructions(),
            flags: self.function_flags(id, &procedure.modifiers),
        }))
    }

    // Stack discipline: every push is paired with a pop that runs whether the
    // closure succeeded or failed.

    pub(crate) fn with_scope<T, F>(&mut self, scope: Scope, f: F) -> Result<T, CompilerError>
    where
        F: FnOnce(&mut Self) -> Result<T, CompilerError>,
    {
        self.scopes.push(scope);
        let result = f(self);
        self.scopes.pop();
        result
    }

    pub(crate) fn with_context<T, F>(&mut self, context: MemberContext, f: F) -> Result<T, CompilerError>
    where
        F: FnOnce(&mut Self) -> Result<T, CompilerError>,
    {
        self.contexts.push(context);
        let result = f(self);
        self.contexts.pop();
        result
    }

    pub(crate) fn with_rvalue<T, F>(&mut self, pointer: PropertyPointer, f: F) -> Result<T, CompilerError>
    where
        F: FnOnce(&mut Self) -> Result<T, CompilerError>,
    {
        self.rvalues.push(pointer);
        let result = f(self);
        self.rvalues.pop();
        result
    }

    /// Byte sizes used for code offsets, both while emitting and during fixup
    pub(crate) fn size_model(&self) -> SizeModel {
        self.table.size_model()
    }

    pub(crate) fn state(&self) -> Result<&FunctionCompilationState, CompilerError> {
        self.function
            .as_ref()
            .ok_or_else(|| CompilerError::bug("no procedure is being compiled"))
    }

    pub(crate) fn current_procedure(&self) -> Option<SymbolId> {
        self.function.as_ref().map(|f| f.procedure)
    }

    /// Append a primary instruction at the current code offset
    pub(crate) fn emit(
        &mut self,
        site: &'static str,
        span: SourceSpan,
        mut instruction: Instruction,
    ) -> Result<(), CompilerError> {
        let size = self.size_model().serialized_size(&instruction);
        let referenced_labels = pending_labels(&mut instruction);
        let state = self
            .function
            .as_mut()
            .ok_or_else(|| CompilerError::bug("instruction emitted outside a procedure"))?;
        log::debug!("CODEGEN: {:04x}: {}", state.code_offset, instruction);
        state.contexts.push(CompiledExpressionContext {
            site,
            span,
            instructions: vec![instruction],
            referenced_labels,
            code_offset: state.code_offset,
        });
        state.code_offset += size;
        Ok(())
    }

    /// Mark a label as pointing at the next primary instruction
    pub(crate) fn resolve_label(&mut self, label: SymbolId, span: SourceSpan) -> Result<(), CompilerError> {
        let offset = self.state()?.code_offset;
        if self.symbols.get(label).is_resolved() {
            return Err(CompilerError::DuplicateLabel {
                name: self.symbols.name(label).to_string(),
                span,
            });
        }
        self.symbols.set_label_offset(label, offset);
        log::debug!("CODEGEN: label '{}' = {:04x}", self.symbols.name(label), offset);
        Ok(())
    }

    /// Jump target for a label: already known for backward jumps, patched later otherwise
    pub(crate) fn label_offset(&self, label: SymbolId) -> CodeOffset {
        match self.symbols.get(label).code_offset() {
            Some(offset) => CodeOffset::Resolved(offset as u32),
            None => CodeOffset::Pending(label),
        }
    }

    /// A fresh label that is not visible to source code
    pub(crate) fn synthetic_label(&mut self, hint: &str, span: SourceSpan) -> SymbolId {
        let owner = self.current_procedure();
        let id = self.symbols.len();
        self.symbols.create(
            &format!("{}${}", hint, id),
            SymbolKind::Label { code_offset: None },
            owner,
            false,
            span,
        )
    }

    /// Storage location of a variable symbol
    pub(crate) fn variable_pointer(&self, variable: SymbolId) -> Result<PropertyPointer, CompilerError> {
        let symbol = self.symbols.get(variable);
        if let Some(index) = symbol.package_reference {
            return Ok(PropertyPointer::export(index));
        }
        if self.table.format_version().field_path_properties {
            let owner = symbol
                .declaring_symbol
                .and_then(|o| self.symbols.get(o).package_reference)
                .unwrap_or(PackageIndex::NULL);
            return Ok(PropertyPointer::field(owner, &symbol.name));
        }
        Err(CompilerError::bug(format!(
            "variable '{}' has no package reference",
            symbol.name
        )))
    }

    pub(crate) fn symbol_reference(&self, id: SymbolId, span: SourceSpan) -> Result<PackageIndex, CompilerError> {
        let symbol = self.symbols.get(id);
        symbol.package_reference.ok_or_else(|| CompilerError::UnknownSymbol {
            name: format!("{} (not present in the object table)", symbol.name),
            span,
        })
    }

    /// Reference to a library function, importing it when the table lacks it
    pub(crate) fn library_function(&mut self, library: &str, function: &str) -> Result<PackageIndex, CompilerError> {
        let key = format!("{}.{}", library, function);
        if let Some(&index) = self.library_functions.get(&key) {
            return Ok(index);
        }
        let package = self.options.default_library_package.clone();
        let candidates = vec![format!("{}.{}", package, key), key.clone(), function.to_string()];
        let found = NameResolver::new(&*self.table)
            .try_resolve(&candidates)?;
        let index = match found {
            Some(index) => index,
            None => {
                let package_index = match self.table.find_import(&package, PackageIndex::NULL) {
                    Some(index) => index,
                    None => self.table.add_import(import_entry("Package", &package, PackageIndex::NULL)),
                };
                let class_index = match self.table.find_import(library, package_index) {
                    Some(index) => index,
                    None => self.table.add_import(import_entry("Class", library, package_index)),
                };
                self.table.add_import(import_entry("Function", function, class_index))
            }
        };
        self.library_functions.insert(key, index);
        Ok(index)
    }

    /// Declare a variable met in a nested block of the current procedure.
    ///
    /// Names only need to be unique within their own block. Every local is a
    /// property of the function though, so a name the procedure already uses is
    /// emitted as `name$<symbol id>`; source code still sees the declared name.
    pub(crate) fn declare_block_variable(&mut self, variable: &VariableDecl) -> Result<SymbolId, CompilerError> {
        let procedure = self
            .current_procedure()
            .ok_or_else(|| CompilerError::bug("block variable outside a procedure"))?;
        let in_block = self
            .scopes
            .innermost()
            .lookup(&self.symbols, &variable.name, Some(SymbolCategory::Variable));
        if in_block.is_some() {
            return Err(CompilerError::DuplicateSymbol {
                name: variable.name.clone(),
                span: variable.span,
            });
        }
        let taken = self
            .symbols
            .member_named(procedure, &variable.name, Some(SymbolCategory::Variable))
            .is_some();
        let emitted_name = if taken {
            format!("{}${}", variable.name, self.symbols.len())
        } else {
            variable.name.clone()
        };
        let type_symbol = type_class_name(&variable.ty)
            .and_then(|(name, _)| self.scopes.lookup(&self.symbols, &name, Some(SymbolCategory::Class)));
        let id = self.symbols.declare(
            &emitted_name,
            SymbolKind::Variable {
                category: VariableCategory::Local,
                is_out_parameter: false,
                declared_type: variable.ty.clone(),
                type_symbol,
            },
            Some(procedure),
            false,
            variable.span,
        );
        bind_package_reference(&mut self.symbols, &mut *self.table, id)?;
        self.scopes.declare(&variable.name, id);
        Ok(id)
    }
}

fn import_entry(class_name: &str, object_name: &str, outer: PackageIndex) -> ImportEntry {
    ImportEntry {
        class_package: "/Script/CoreUObject".to_string(),
        class_name: class_name.to_string(),
        object_name: object_name.to_string(),
        outer,
    }
}

/// Labels still pending anywhere in an instruction tree, in serialization order
pub fn pending_labels(instruction: &mut Instruction) -> Vec<SymbolId> {
    let mut labels = Vec::new();
    collect_pending(instruction, &mut labels);
    labels
}

fn collect_pending(instruction: &mut Instruction, labels: &mut Vec<SymbolId>) {
    match instruction {
        Instruction::Jump(target)
        | Instruction::PushExecutionFlow(target)
        | Instruction::SkipOffsetConst(target)
        | Instruction::LabelOffset(target)
        | Instruction::JumpIfNot { target, .. }
        | Instruction::Skip { target, .. } => {
            if let CodeOffset::Pending(label) = target {
                labels.push(*label);
            }
        }
        Instruction::SwitchValue {
            end_goto_offset,
            cases,
            ..
        } => {
            let offsets = std::iter::once(&*end_goto_offset).chain(cases.iter().map(|c| &c.next_offset));
            for offset in offsets {
                if let CodeOffset::Pending(label) = offset {
                    labels.push(*label);
                }
            }
        }
        _ => {}
    }
    for child in instruction.children_mut() {
        collect_pending(child, labels);
    }
}

#[cfg(test)]
#[path = "codegen_tests.rs"]
mod tests;
