// Symbol-tree builder
//
// One pass over the compilation unit before any code is generated. Declares every
// class, procedure, variable and label, links base classes, resolves declared types,
// applies the ubergraph hoisting rule and binds each declaration to an entry in the
// object table (creating one when the table has none).

use crate::kismet_compiler::ast::*;
use crate::kismet_compiler::config::{CompilerOptions, DEFAULT_OBJECT_PREFIX};
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::name_resolver::{qualified_candidates, NameResolver};
use crate::kismet_compiler::package::{
    ExportEntry, ExportKind, ImportEntry, ObjectTable, PackageIndex, RF_CLASS_DEFAULT_OBJECT,
    RF_PUBLIC, RF_STANDALONE,
};
use crate::kismet_compiler::scope::{Scope, ScopeKind};
use crate::kismet_compiler::symbols::{
    SymbolCategory, SymbolId, SymbolKind, SymbolTable, VariableCategory,
};
use crate::kismet_compiler::value_kind::ValueKind;

pub const THIS_VARIABLE: &str = "this";
pub const BASE_VARIABLE: &str = "base";
pub const RETURN_VALUE: &str = "ReturnValue";

const CORE_PACKAGE: &str = "/Script/CoreUObject";

/// Result of the declaration pass
#[derive(Debug)]
pub struct SymbolTree {
    pub symbols: SymbolTable,
    /// Top-level declarations, import aliases and hoisted ubergraph symbols
    pub globals: Scope,
    /// The package being compiled
    pub package: SymbolId,
}

pub struct SymbolTreeBuilder<'a> {
    table: &'a mut dyn ObjectTable,
    options: &'a CompilerOptions,
    symbols: SymbolTable,
    globals: Scope,
    pending_bases: Vec<(SymbolId, String)>,
}

impl<'a> SymbolTreeBuilder<'a> {
    pub fn new(table: &'a mut dyn ObjectTable, options: &'a CompilerOptions) -> Self {
        SymbolTreeBuilder {
            table,
            options,
            symbols: SymbolTable::new(),
            globals: Scope::new(ScopeKind::Global, None),
            pending_bases: Vec::new(),
        }
    }

    pub fn build(mut self, unit: &CompilationUnit) -> Result<SymbolTree, CompilerError> {
        let package_name = self.table.package_name().to_string();
        let package = self.symbols.create(
            &package_name,
            SymbolKind::Package,
            None,
            false,
            SourceSpan::default(),
        );

        let mut imported = Vec::new();
        for import in &unit.imports {
            let import_package = self.symbols.declare(
                &import.package,
                SymbolKind::Package,
                None,
                true,
                import.span,
            );
            for declaration in &import.declarations {
                let id = self.declare_declaration(declaration, import_package, true)?;
                imported.push(id);
            }
        }

        for declaration in &unit.declarations {
            let is_external = match declaration {
                Declaration::Class(c) => c.modifiers.is_external,
                Declaration::Procedure(p) => p.modifiers.is_external,
                Declaration::Variable(v) => v.modifiers.is_external,
            };
            let id = self.declare_declaration(declaration, package, is_external)?;
            self.globals.declare(declaration.name(), id);
        }

        // Local declarations shadow imports; clashing import names are skipped
        for id in imported {
            let name = self.symbols.name(id).to_string();
            if self.globals.contains(&name) {
                log::debug!("SYMBOLS: import alias '{}' already declared, skipped", name);
            } else {
                self.globals.declare(&name, id);
            }
        }

        self.link_base_classes();
        self.resolve_variable_types();
        if self.options.default_object_reparenting {
            self.reparent_default_objects();
        }
        self.hoist_ubergraph_symbols();

        for id in 0..self.symbols.len() as SymbolId {
            if id != package {
                bind_package_reference(&mut self.symbols, &mut *self.table, id)?;
            }
        }

        log::debug!(
            "SYMBOLS: built {} symbols for package '{}'",
            self.symbols.len(),
            package_name
        );
        Ok(SymbolTree {
            symbols: self.symbols,
            globals: self.globals,
            package,
        })
    }

    fn check_unique(
        &self,
        parent: SymbolId,
        name: &str,
        category: SymbolCategory,
        span: SourceSpan,
    ) -> Result<(), CompilerError> {
        if self.symbols.member_named(parent, name, Some(category)).is_some() {
            return Err(match category {
                SymbolCategory::Label => CompilerError::DuplicateLabel {
                    name: name.to_string(),
                    span,
                },
                _ => CompilerError::DuplicateSymbol {
                    name: name.to_string(),
                    span,
                },
            });
        }
        Ok(())
    }

    fn declare_declaration(
        &mut self,
        declaration: &Declaration,
        parent: SymbolId,
        is_external: bool,
    ) -> Result<SymbolId, CompilerError> {
        match declaration {
            Declaration::Class(class) => self.declare_class(class, parent, is_external),
            Declaration::Procedure(procedure) => {
                self.declare_procedure(procedure, parent, is_external)
            }
            Declaration::Variable(variable) => {
                let category = match self.symbols.get(parent).category() {
                    SymbolCategory::Package => VariableCategory::Global,
                    _ => VariableCategory::Instance,
                };
                self.declare_variable(variable, parent, category, is_external)
            }
        }
    }

    fn declare_class(
        &mut self,
        class: &ClassDecl,
        parent: SymbolId,
        is_external: bool,
    ) -> Result<SymbolId, CompilerError> {
        self.check_unique(parent, &class.name, SymbolCategory::Class, class.span)?;
        let id = self.symbols.declare(
            &class.name,
            SymbolKind::Class {
                base: None,
                class_kind: class.kind,
            },
            Some(parent),
            is_external,
            class.span,
        );
        log::debug!("SYMBOLS: class '{}' -> #{}", class.name, id);
        if let Some(base) = &class.base {
            self.pending_bases.push((id, base.clone()));
        }

        self.declare_self_variable(id, THIS_VARIABLE, VariableCategory::This, &class.name, class.span);
        let base_type = class.base.clone().unwrap_or_else(|| class.name.clone());
        self.declare_self_variable(id, BASE_VARIABLE, VariableCategory::Base, &base_type, class.span);

        for member in &class.members {
            let member_external = is_external || declaration_is_external(member);
            self.declare_declaration(member, id, member_external)?;
        }
        Ok(id)
    }

    fn declare_self_variable(
        &mut self,
        class: SymbolId,
        name: &str,
        category: VariableCategory,
        type_name: &str,
        span: SourceSpan,
    ) {
        let type_symbol = match category {
            VariableCategory::This => Some(class),
            _ => None,
        };
        self.symbols.declare(
            name,
            SymbolKind::Variable {
                category,
                is_out_parameter: false,
                declared_type: TypeRef::plain(type_name),
                type_symbol,
            },
            Some(class),
            false,
            span,
        );
    }

    fn declare_variable(
        &mut self,
        variable: &VariableDecl,
        parent: SymbolId,
        category: VariableCategory,
        is_external: bool,
    ) -> Result<SymbolId, CompilerError> {
        self.check_unique(parent, &variable.name, SymbolCategory::Variable, variable.span)?;
        let id = self.symbols.declare(
            &variable.name,
            SymbolKind::Variable {
                category,
                is_out_parameter: false,
                declared_type: variable.ty.clone(),
                type_symbol: None,
            },
            Some(parent),
            is_external,
            variable.span,
        );
        log::debug!(
            "SYMBOLS: {:?} variable '{}: {}' -> #{}",
            category,
            variable.name,
            variable.ty,
            id
        );
        Ok(id)
    }

    fn declare_procedure(
        &mut self,
        procedure: &ProcedureDecl,
        parent: SymbolId,
        is_external: bool,
    ) -> Result<SymbolId, CompilerError> {
        self.check_unique(parent, &procedure.name, SymbolCategory::Procedure, procedure.span)?;
        let is_ubergraph = self.options.is_ubergraph(&procedure.name);
        let id = self.symbols.declare(
            &procedure.name,
            SymbolKind::Procedure {
                is_virtual: procedure.modifiers.is_virtual,
                is_static: procedure.modifiers.is_static,
                is_ubergraph,
                return_type: procedure.return_type.clone(),
                return_parameter: None,
            },
            Some(parent),
            is_external,
            procedure.span,
        );
        log::debug!(
            "SYMBOLS: procedure '{}' -> #{} (virtual={}, static={}, ubergraph={})",
            procedure.name,
            id,
            procedure.modifiers.is_virtual,
            procedure.modifiers.is_static,
            is_ubergraph
        );

        let mut return_parameter = None;
        for parameter in &procedure.parameters {
            self.check_unique(id, &parameter.name, SymbolCategory::Variable, parameter.span)?;
            let param = self.symbols.declare(
                &parameter.name,
                SymbolKind::Variable {
                    category: VariableCategory::Local,
                    is_out_parameter: parameter.is_out,
                    declared_type: parameter.ty.clone(),
                    type_symbol: None,
                },
                Some(id),
                is_external,
                parameter.span,
            );
            if parameter.is_return() {
                return_parameter = Some(param);
            }
        }

        if return_parameter.is_none() {
            if let Some(return_type) = procedure.return_type.as_ref().filter(|t| t.name != "void") {
                self.check_unique(id, RETURN_VALUE, SymbolCategory::Variable, procedure.span)?;
                return_parameter = Some(self.symbols.declare(
                    RETURN_VALUE,
                    SymbolKind::Variable {
                        category: VariableCategory::Local,
                        is_out_parameter: true,
                        declared_type: return_type.clone(),
                        type_symbol: None,
                    },
                    Some(id),
                    is_external,
                    procedure.span,
                ));
            }
        }
        if let SymbolKind::Procedure {
            return_parameter: slot,
            ..
        } = &mut self.symbols.get_mut(id).kind
        {
            *slot = return_parameter;
        }

        if let Some(body) = procedure.body.as_ref().filter(|_| !is_external) {
            for statement in &body.statements {
                if let StmtKind::VariableDeclaration(variable) = &statement.kind {
                    self.declare_variable(variable, id, VariableCategory::Local, false)?;
                }
            }
            self.declare_labels(&body.statements, id)?;
        }
        Ok(id)
    }

    /// Labels anywhere in the body, including nested blocks and if branches
    fn declare_labels(&mut self, statements: &[Stmt], procedure: SymbolId) -> Result<(), CompilerError> {
        for statement in statements {
            self.declare_labels_in(statement, procedure)?;
        }
        Ok(())
    }

    fn declare_labels_in(&mut self, statement: &Stmt, procedure: SymbolId) -> Result<(), CompilerError> {
        match &statement.kind {
            StmtKind::Label(name) => {
                self.check_unique(procedure, name, SymbolCategory::Label, statement.span)?;
                self.symbols.declare(
                    name,
                    SymbolKind::Label { code_offset: None },
                    Some(procedure),
                    false,
                    statement.span,
                );
            }
            StmtKind::Block(block) => self.declare_labels(&block.statements, procedure)?,
            StmtKind::If {
                then, otherwise, ..
            } => {
                self.declare_labels_in(then, procedure)?;
                if let Some(otherwise) = otherwise {
                    self.declare_labels_in(otherwise, procedure)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn global_class(&self, name: &str) -> Option<SymbolId> {
        self.globals
            .lookup(&self.symbols, name, Some(SymbolCategory::Class))
    }

    /// Known class with this name, or an external placeholder standing in for it
    fn class_or_placeholder(&mut self, name: &str, class_kind: ClassKind) -> SymbolId {
        if let Some(id) = self.global_class(name) {
            return id;
        }
        let id = self.symbols.create(
            name,
            SymbolKind::Class {
                base: None,
                class_kind,
            },
            None,
            true,
            SourceSpan::default(),
        );
        self.globals.declare(name, id);
        log::debug!("SYMBOLS: placeholder class '{}' -> #{}", name, id);
        id
    }

    fn link_base_classes(&mut self) {
        for (class, base_name) in std::mem::take(&mut self.pending_bases) {
            let base = self.class_or_placeholder(&base_name, ClassKind::Class);
            if let SymbolKind::Class { base: slot, .. } = &mut self.symbols.get_mut(class).kind {
                *slot = Some(base);
            }
            if let Some(base_variable) =
                self.symbols
                    .member_named(class, BASE_VARIABLE, Some(SymbolCategory::Variable))
            {
                if let SymbolKind::Variable { type_symbol, .. } =
                    &mut self.symbols.get_mut(base_variable).kind
                {
                    *type_symbol = Some(base);
                }
            }
            log::debug!(
                "SYMBOLS: '{}' extends '{}'",
                self.symbols.name(class),
                base_name
            );
        }
    }

    fn resolve_variable_types(&mut self) {
        let variables: Vec<(SymbolId, TypeRef)> = self
            .symbols
            .iter()
            .filter(|s| s.type_symbol().is_none())
            .filter_map(|s| s.declared_type().map(|t| (s.id, t.clone())))
            .collect();
        for (id, declared_type) in variables {
            if let Some((name, kind)) = type_class_name(&declared_type) {
                let class = self.class_or_placeholder(&name, kind);
                if let SymbolKind::Variable { type_symbol, .. } = &mut self.symbols.get_mut(id).kind {
                    *type_symbol = Some(class);
                }
            }
        }
    }

    /// Compatibility mode: members of `Default__X` live on `X`
    fn reparent_default_objects(&mut self) {
        let defaults: Vec<(SymbolId, SymbolId)> = self
            .symbols
            .classes()
            .filter(|c| c.name.starts_with(DEFAULT_OBJECT_PREFIX))
            .filter_map(|c| c.base_class().map(|base| (c.id, base)))
            .collect();
        for (default_class, base) in defaults {
            let members: Vec<SymbolId> = self
                .symbols
                .get(default_class)
                .members
                .iter()
                .copied()
                .filter(|&m| {
                    !matches!(
                        self.symbols.get(m).variable_category(),
                        Some(VariableCategory::This | VariableCategory::Base)
                    )
                })
                .collect();
            log::warn!(
                "SYMBOLS: reparenting {} members of '{}' onto '{}'",
                members.len(),
                self.symbols.name(default_class),
                self.symbols.name(base)
            );
            for member in members {
                self.symbols.reparent(member, base);
            }
        }
    }

    fn hoist_ubergraph_symbols(&mut self) {
        let ubergraphs: Vec<SymbolId> = self
            .symbols
            .iter()
            .filter(|s| s.is_ubergraph() && !s.is_external)
            .map(|s| s.id)
            .collect();
        for procedure in ubergraphs {
            let members = self.symbols.get(procedure).members.clone();
            for member in members {
                let symbol = self.symbols.get(member);
                let hoist = match symbol.category() {
                    SymbolCategory::Label => true,
                    SymbolCategory::Variable => self.options.is_hoisted_variable(&symbol.name),
                    _ => false,
                };
                if !hoist {
                    continue;
                }
                let name = symbol.name.clone();
                if self.globals.contains(&name) {
                    log::debug!("SYMBOLS: ubergraph symbol '{}' already global, skipped", name);
                } else {
                    log::debug!("SYMBOLS: hoisting ubergraph symbol '{}'", name);
                    self.globals.declare(&name, member);
                }
            }
        }
    }
}

fn declaration_is_external(declaration: &Declaration) -> bool {
    match declaration {
        Declaration::Class(c) => c.modifiers.is_external,
        Declaration::Procedure(p) => p.modifiers.is_external,
        Declaration::Variable(v) => v.modifiers.is_external,
    }
}

/// Class named by a declared type, for types that denote objects or structs
pub fn type_class_name(ty: &TypeRef) -> Option<(String, ClassKind)> {
    match (ty.name.as_str(), ty.argument.as_deref()) {
        ("Struct", Some(arg)) => Some((arg.name.clone(), ClassKind::Struct)),
        ("Interface", Some(arg)) => Some((arg.name.clone(), ClassKind::Interface)),
        ("Class" | "Object", Some(arg)) => Some((arg.name.clone(), ClassKind::Class)),
        (_, Some(_)) => None,
        (_, None) => match ValueKind::from_type(ty) {
            ValueKind::Object => Some((ty.name.clone(), ClassKind::Class)),
            ValueKind::Vector | ValueKind::Rotator | ValueKind::Transform => {
                Some((ty.name.clone(), ClassKind::Struct))
            }
            _ => None,
        },
    }
}

fn property_class_name(ty: &TypeRef) -> &'static str {
    match ValueKind::from_type(ty) {
        ValueKind::Bool => "BoolProperty",
        ValueKind::Byte => "ByteProperty",
        ValueKind::Int => "IntProperty",
        ValueKind::Int64 => "Int64Property",
        ValueKind::Float => "FloatProperty",
        ValueKind::String => "StrProperty",
        ValueKind::Name => "NameProperty",
        ValueKind::Text => "TextProperty",
        ValueKind::Vector | ValueKind::Rotator | ValueKind::Transform | ValueKind::Struct => {
            "StructProperty"
        }
        ValueKind::Class => "ClassProperty",
        ValueKind::Interface => "InterfaceProperty",
        ValueKind::Array => "ArrayProperty",
        ValueKind::Object | ValueKind::Void => "ObjectProperty",
    }
}

/// Locate or create the object-table entry for a symbol.
///
/// Parents (and base classes) are bound first so new entries can name their outer.
/// Variables are addressed by field path when the format supports it and get no
/// entry of their own, unless they are external objects referenced by name.
pub fn bind_package_reference(
    symbols: &mut SymbolTable,
    table: &mut dyn ObjectTable,
    id: SymbolId,
) -> Result<(), CompilerError> {
    let symbol = symbols.get(id);
    if symbol.package_reference.is_some() {
        return Ok(());
    }
    match symbol.kind {
        SymbolKind::Label { .. } => return Ok(()),
        SymbolKind::Package if !symbol.is_external => return Ok(()),
        SymbolKind::Variable {
            category: VariableCategory::This | VariableCategory::Base,
            ..
        } => return Ok(()),
        SymbolKind::Variable { .. }
            if table.format_version().field_path_properties && !symbol.is_external =>
        {
            return Ok(())
        }
        _ => {}
    }

    let parent = symbol.declaring_symbol;
    let base = symbol.base_class();
    if let Some(parent) = parent {
        bind_package_reference(symbols, table, parent)?;
    }
    if let Some(base) = base {
        bind_package_reference(symbols, table, base)?;
    }

    let symbol = symbols.get(id);
    let candidates = qualified_candidates(&symbols.qualified_parts(id));
    let placeholder = symbol.is_external && parent.is_none() && symbol.category() != SymbolCategory::Package;
    let found = NameResolver::new(&*table).try_resolve(&candidates)?;
    let index = match found {
        Some(index) => index,
        // Placeholders stand in for types the unit never declares; they stay unbound
        // until something needs their reference
        None if placeholder => return Ok(()),
        None => create_entry(symbols, table, id),
    };
    log::debug!(
        "SYMBOLS: '{}' bound to {}",
        candidates.first().map(String::as_str).unwrap_or(""),
        index
    );
    symbols.get_mut(id).package_reference = Some(index);
    Ok(())
}

/// Reference to a placeholder type, importing it under the core package when the
/// object table does not know it yet
pub fn bind_placeholder(
    symbols: &mut SymbolTable,
    table: &mut dyn ObjectTable,
    id: SymbolId,
) -> Result<PackageIndex, CompilerError> {
    bind_package_reference(symbols, table, id)?;
    let symbol = symbols.get(id);
    if let Some(index) = symbol.package_reference {
        return Ok(index);
    }
    let class_name = match &symbol.kind {
        SymbolKind::Class {
            class_kind: ClassKind::Struct,
            ..
        } => "ScriptStruct",
        SymbolKind::Class { .. } => "Class",
        _ => {
            return Err(CompilerError::bug(format!(
                "'{}' has no object-table entry and is not a type",
                symbol.name
            )))
        }
    };
    let name = symbol.name.clone();

    let core = match table.find_import(CORE_PACKAGE, PackageIndex::NULL) {
        Some(index) => index,
        None => table.add_import(ImportEntry {
            class_package: CORE_PACKAGE.to_string(),
            class_name: "Package".to_string(),
            object_name: CORE_PACKAGE.to_string(),
            outer: PackageIndex::NULL,
        }),
    };
    let index = match table.find_import(&name, core) {
        Some(index) => index,
        None => table.add_import(ImportEntry {
            class_package: CORE_PACKAGE.to_string(),
            class_name: class_name.to_string(),
            object_name: name.clone(),
            outer: core,
        }),
    };
    log::debug!("SYMBOLS: placeholder '{}' imported as {}", name, index);
    symbols.get_mut(id).package_reference = Some(index);
    Ok(index)
}

fn create_entry(symbols: &SymbolTable, table: &mut dyn ObjectTable, id: SymbolId) -> PackageIndex {
    let symbol = symbols.get(id);
    let outer = symbol
        .declaring_symbol
        .and_then(|p| symbols.get(p).package_reference)
        .unwrap_or(PackageIndex::NULL);
    let (class_name, kind) = match &symbol.kind {
        SymbolKind::Package => ("Package", ExportKind::Object),
        SymbolKind::Class { class_kind, .. } => match class_kind {
            ClassKind::Struct => ("ScriptStruct", ExportKind::Class),
            _ => ("Class", ExportKind::Class),
        },
        SymbolKind::Procedure { .. } => ("Function", ExportKind::Function),
        SymbolKind::Variable { declared_type, .. } => {
            (property_class_name(declared_type), ExportKind::Property)
        }
        SymbolKind::Label { .. } => ("Label", ExportKind::Object),
    };

    if symbol.is_external {
        return table.add_import(ImportEntry {
            class_package: CORE_PACKAGE.to_string(),
            class_name: class_name.to_string(),
            object_name: symbol.name.clone(),
            outer,
        });
    }

    let super_index = symbol
        .base_class()
        .and_then(|b| symbols.get(b).package_reference)
        .unwrap_or(PackageIndex::NULL);
    let mut object_flags = RF_PUBLIC;
    if kind == ExportKind::Class {
        object_flags |= RF_STANDALONE;
    }
    if symbol.name.starts_with(DEFAULT_OBJECT_PREFIX) {
        object_flags |= RF_CLASS_DEFAULT_OBJECT;
    }
    let dependencies = [outer, super_index]
        .into_iter()
        .filter(|d| !d.is_null())
        .collect();
    table.add_export(ExportEntry {
        object_name: symbol.name.clone(),
        kind,
        class_name: class_name.to_string(),
        outer,
        super_index,
        object_flags,
        dependencies,
    })
}

#[cfg(test)]
#[path = "symbol_builder_tests.rs"]
mod tests;
