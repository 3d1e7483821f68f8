// Symbol model for the Kismet script compiler
//
// Symbols live in one arena per compilation unit and refer to each other by id:
// parent links, member lists, base classes and resolved variable types are all
// SymbolIds into the same table.

use crate::kismet_compiler::ast::{ClassKind, SourceSpan, TypeRef};
use crate::kismet_compiler::package::PackageIndex;

pub type SymbolId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableCategory {
    This,
    Base,
    Local,
    Instance,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolCategory {
    Package,
    Class,
    Procedure,
    Variable,
    Label,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Package,
    Class {
        base: Option<SymbolId>,
        class_kind: ClassKind,
    },
    Procedure {
        is_virtual: bool,
        is_static: bool,
        is_ubergraph: bool,
        return_type: Option<TypeRef>,
        /// Out-parameter carrying the return value (`Return` attribute)
        return_parameter: Option<SymbolId>,
    },
    Variable {
        category: VariableCategory,
        is_out_parameter: bool,
        declared_type: TypeRef,
        type_symbol: Option<SymbolId>,
    },
    Label {
        code_offset: Option<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub declaring_symbol: Option<SymbolId>,
    /// Declared outside this compilation unit
    pub is_external: bool,
    /// Children in declaration order; earlier members win lookups
    pub members: Vec<SymbolId>,
    pub package_reference: Option<PackageIndex>,
    pub span: SourceSpan,
}

impl Symbol {
    pub fn category(&self) -> SymbolCategory {
        match self.kind {
            SymbolKind::Package => SymbolCategory::Package,
            SymbolKind::Class { .. } => SymbolCategory::Class,
            SymbolKind::Procedure { .. } => SymbolCategory::Procedure,
            SymbolKind::Variable { .. } => SymbolCategory::Variable,
            SymbolKind::Label { .. } => SymbolCategory::Label,
        }
    }

    pub fn matches(&self, filter: Option<SymbolCategory>) -> bool {
        filter.map_or(true, |c| c == self.category())
    }

    pub fn base_class(&self) -> Option<SymbolId> {
        match self.kind {
            SymbolKind::Class { base, .. } => base,
            _ => None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, SymbolKind::Procedure { is_virtual: true, .. })
    }

    pub fn is_static(&self) -> bool {
        matches!(self.kind, SymbolKind::Procedure { is_static: true, .. })
    }

    pub fn is_ubergraph(&self) -> bool {
        matches!(self.kind, SymbolKind::Procedure { is_ubergraph: true, .. })
    }

    pub fn variable_category(&self) -> Option<VariableCategory> {
        match self.kind {
            SymbolKind::Variable { category, .. } => Some(category),
            _ => None,
        }
    }

    pub fn is_out_parameter(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Variable {
                is_out_parameter: true,
                ..
            }
        )
    }

    pub fn declared_type(&self) -> Option<&TypeRef> {
        match &self.kind {
            SymbolKind::Variable { declared_type, .. } => Some(declared_type),
            _ => None,
        }
    }

    pub fn type_symbol(&self) -> Option<SymbolId> {
        match self.kind {
            SymbolKind::Variable { type_symbol, .. } => type_symbol,
            _ => None,
        }
    }

    pub fn code_offset(&self) -> Option<usize> {
        match self.kind {
            SymbolKind::Label { code_offset } => code_offset,
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.code_offset().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Create a symbol without attaching it to its parent's member list
    pub fn create(
        &mut self,
        name: &str,
        kind: SymbolKind,
        declaring_symbol: Option<SymbolId>,
        is_external: bool,
        span: SourceSpan,
    ) -> SymbolId {
        let id = self.symbols.len() as SymbolId;
        self.symbols.push(Symbol {
            id,
            name: name.to_string(),
            kind,
            declaring_symbol,
            is_external,
            members: Vec::new(),
            package_reference: None,
            span,
        });
        id
    }

    /// Create a symbol and append it to its parent's members
    pub fn declare(
        &mut self,
        name: &str,
        kind: SymbolKind,
        declaring_symbol: Option<SymbolId>,
        is_external: bool,
        span: SourceSpan,
    ) -> SymbolId {
        let id = self.create(name, kind, declaring_symbol, is_external, span);
        if let Some(parent) = declaring_symbol {
            self.get_mut(parent).members.push(id);
        }
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.get(id).name
    }

    /// Direct member of `owner` with the given name
    pub fn member_named(
        &self,
        owner: SymbolId,
        name: &str,
        filter: Option<SymbolCategory>,
    ) -> Option<SymbolId> {
        self.get(owner)
            .members
            .iter()
            .copied()
            .find(|&m| {
                let member = self.get(m);
                member.name == name && member.matches(filter)
            })
    }

    /// Member lookup through the base-class chain, nearest class first
    pub fn find_member(
        &self,
        class: SymbolId,
        name: &str,
        filter: Option<SymbolCategory>,
    ) -> Option<SymbolId> {
        let mut current = Some(class);
        let mut depth = 0;
        while let Some(id) = current {
            if let Some(found) = self.member_named(id, name, filter) {
                return Some(found);
            }
            current = self.get(id).base_class();
            depth += 1;
            if depth > self.symbols.len() {
                break;
            }
        }
        None
    }

    pub fn is_same_or_base_of(&self, ancestor: SymbolId, class: SymbolId) -> bool {
        let mut current = Some(class);
        let mut depth = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).base_class();
            depth += 1;
            if depth > self.symbols.len() {
                break;
            }
        }
        false
    }

    /// Nearest enclosing symbol of the given category (including `id` itself)
    pub fn enclosing(&self, id: SymbolId, category: SymbolCategory) -> Option<SymbolId> {
        let mut current = Some(id);
        while let Some(cur) = current {
            if self.get(cur).category() == category {
                return Some(cur);
            }
            current = self.get(cur).declaring_symbol;
        }
        None
    }

    pub fn classes(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(|s| s.category() == SymbolCategory::Class)
    }

    /// Move a symbol under a new parent, keeping its relative order at the end
    pub fn reparent(&mut self, id: SymbolId, new_parent: SymbolId) {
        if let Some(old_parent) = self.get(id).declaring_symbol {
            self.get_mut(old_parent).members.retain(|&m| m != id);
        }
        self.get_mut(id).declaring_symbol = Some(new_parent);
        self.get_mut(new_parent).members.push(id);
    }

    pub fn set_label_offset(&mut self, label: SymbolId, offset: usize) {
        if let SymbolKind::Label { code_offset } = &mut self.get_mut(label).kind {
            *code_offset = Some(offset);
        }
    }

    /// Names along the declaring chain, outermost first
    pub fn qualified_parts(&self, id: SymbolId) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let symbol = self.get(cur);
            parts.push(symbol.name.clone());
            current = symbol.declaring_symbol;
        }
        parts.reverse();
        parts
    }
}
