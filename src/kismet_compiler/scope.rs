// Lexical scopes and member-access contexts
//
// Scopes form a stack of declaration maps searched innermost first. Member
// contexts are a separate stack recording how the next bare identifier or call
// should bind (local, field of `this`, member of some other object...).

use crate::kismet_compiler::symbols::{SymbolCategory, SymbolId, SymbolTable};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Class,
    Procedure,
    Block,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub owner: Option<SymbolId>,
    symbols: IndexMap<String, Vec<SymbolId>>,
}

impl Scope {
    pub fn new(kind: ScopeKind, owner: Option<SymbolId>) -> Self {
        Scope {
            kind,
            owner,
            symbols: IndexMap::new(),
        }
    }

    pub fn declare(&mut self, name: &str, id: SymbolId) {
        self.symbols.entry(name.to_string()).or_default().push(id);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn lookup(
        &self,
        table: &SymbolTable,
        name: &str,
        filter: Option<SymbolCategory>,
    ) -> Option<SymbolId> {
        self.symbols
            .get(name)?
            .iter()
            .copied()
            .find(|&id| table.get(id).matches(filter))
    }
}

#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<Scope>,
}

impl ScopeStack {
    /// A stack holding only the given root scope
    pub fn new(root: Scope) -> Self {
        ScopeStack { frames: vec![root] }
    }

    pub fn push(&mut self, scope: Scope) {
        self.frames.push(scope);
    }

    /// Pop the innermost scope; the root is never popped
    pub fn pop(&mut self) -> Option<Scope> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn root(&self) -> &Scope {
        &self.frames[0]
    }

    pub fn innermost(&self) -> &Scope {
        &self.frames[self.frames.len() - 1]
    }

    pub fn innermost_mut(&mut self) -> &mut Scope {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn declare(&mut self, name: &str, id: SymbolId) {
        self.innermost_mut().declare(name, id);
    }

    /// Declare in the root scope unless the name is already taken there
    pub fn declare_global(&mut self, name: &str, id: SymbolId) -> bool {
        let root = &mut self.frames[0];
        if root.contains(name) {
            false
        } else {
            root.declare(name, id);
            true
        }
    }

    pub fn lookup(
        &self,
        table: &SymbolTable,
        name: &str,
        filter: Option<SymbolCategory>,
    ) -> Option<SymbolId> {
        self.frames
            .iter()
            .rev()
            .find_map(|scope| scope.lookup(table, name, filter))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextType {
    This,
    Base,
    Class,
    Struct,
    Interface,
    ObjectConst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberContext {
    pub symbol: Option<SymbolId>,
    pub context_type: ContextType,
    /// No member-access prefix was written in the source
    pub is_implicit: bool,
    pub call_virtual_as_final: bool,
}

impl MemberContext {
    pub fn implicit_this(class: Option<SymbolId>) -> Self {
        MemberContext {
            symbol: class,
            context_type: ContextType::This,
            is_implicit: true,
            call_virtual_as_final: false,
        }
    }

    pub fn explicit(symbol: Option<SymbolId>, context_type: ContextType) -> Self {
        MemberContext {
            symbol,
            context_type,
            is_implicit: false,
            call_virtual_as_final: false,
        }
    }

    pub fn is_self_context(&self) -> bool {
        matches!(self.context_type, ContextType::This | ContextType::Base)
    }
}
