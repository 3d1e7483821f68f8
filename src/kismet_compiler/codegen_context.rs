// Identifier resolution and member-access contexts
//
// A bare identifier resolves against two sources: the lexical scope stack and the
// members of the current member context. Under the implicit `this` context locals
// shadow fields; once a context was written out (`obj.x`, `this.x`, `base.x`) the
// context's member wins.

use crate::kismet_compiler::ast::*;
use crate::kismet_compiler::codegen::ScriptCompiler;
use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::scope::{ContextType, MemberContext};
use crate::kismet_compiler::symbols::{SymbolCategory, SymbolId, SymbolKind, VariableCategory};
use crate::kismet_compiler::value_kind::ValueKind;

impl<'a> ScriptCompiler<'a> {
    pub(crate) fn current_context(&self) -> MemberContext {
        self.contexts
            .last()
            .copied()
            .unwrap_or_else(|| MemberContext::implicit_this(self.current_class))
    }

    pub(crate) fn implicit_this(&self) -> MemberContext {
        MemberContext::implicit_this(self.current_class)
    }

    pub(crate) fn base_of_current_class(&self) -> Option<SymbolId> {
        self.current_class
            .and_then(|class| self.symbols.get(class).base_class())
    }

    /// Resolve a name in the current member context
    pub(crate) fn resolve(&self, name: &str, filter: Option<SymbolCategory>) -> Option<SymbolId> {
        let context = self.current_context();
        let member = || {
            context
                .symbol
                .and_then(|class| self.symbols.find_member(class, name, filter))
        };
        let lexical = || self.scopes.lookup(&self.symbols, name, filter);
        if context.is_implicit {
            lexical().or_else(member)
        } else {
            member().or_else(lexical)
        }
    }

    pub(crate) fn class_named(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .lookup(&self.symbols, name, Some(SymbolCategory::Class))
    }

    /// Classify the left-hand side of `owner.member`
    pub(crate) fn context_for_member_expression(
        &mut self,
        owner: &Expr,
        member_name: &str,
    ) -> Result<MemberContext, CompilerError> {
        match &owner.kind {
            ExprKind::This => Ok(MemberContext::explicit(self.current_class, ContextType::This)),
            ExprKind::Base => Ok(MemberContext::explicit(
                self.base_of_current_class(),
                ContextType::Base,
            )),
            ExprKind::Identifier(name) => {
                let enclosing = self.current_class.filter(|&c| self.symbols.name(c) == name);
                if let Some(class) = enclosing {
                    let mut context = MemberContext::explicit(Some(class), ContextType::This);
                    context.call_virtual_as_final = true;
                    return Ok(context);
                }
                match self.resolve(name, None) {
                    Some(symbol) => self.context_for_symbol(symbol, owner.span),
                    None => self.fuzzy_member_context(name, member_name, owner.span),
                }
            }
            _ => match self.expression_type(owner)? {
                Some(ty) => self.context_for_type(&ty, owner.span),
                None => Err(CompilerError::unexpected("member access owner", &owner.kind, owner.span)),
            },
        }
    }

    fn context_for_symbol(&self, id: SymbolId, span: SourceSpan) -> Result<MemberContext, CompilerError> {
        let symbol = self.symbols.get(id);
        match &symbol.kind {
            SymbolKind::Variable {
                category: VariableCategory::This,
                ..
            } => Ok(MemberContext::explicit(symbol.declaring_symbol, ContextType::This)),
            SymbolKind::Variable {
                category: VariableCategory::Base,
                ..
            } => Ok(MemberContext::explicit(
                symbol.declaring_symbol.and_then(|c| self.symbols.get(c).base_class()),
                ContextType::Base,
            )),
            SymbolKind::Variable {
                declared_type,
                type_symbol,
                ..
            } => {
                if !declared_type.is_constructed() && symbol.is_external {
                    Ok(MemberContext::explicit(*type_symbol, ContextType::ObjectConst))
                } else {
                    let mut context = self.context_for_type(declared_type, span)?;
                    if type_symbol.is_some() {
                        context.symbol = *type_symbol;
                    }
                    Ok(context)
                }
            }
            SymbolKind::Class { .. } => {
                let context_type = if Some(id) == self.current_class {
                    ContextType::This
                } else if Some(id) == self.base_of_current_class() {
                    ContextType::Base
                } else {
                    ContextType::Class
                };
                Ok(MemberContext::explicit(Some(id), context_type))
            }
            _ => Err(CompilerError::unexpected("member access owner", &symbol.name, span)),
        }
    }

    /// Context implied by the static type of an owner expression
    pub(crate) fn context_for_type(&self, ty: &TypeRef, span: SourceSpan) -> Result<MemberContext, CompilerError> {
        let context_type = match (ty.name.as_str(), ty.argument.as_deref()) {
            ("Struct", Some(_)) => ContextType::Struct,
            ("Interface", Some(_)) => ContextType::Interface,
            ("Class" | "Object", Some(_)) => ContextType::Class,
            (_, None) => match ValueKind::from_type(ty) {
                ValueKind::Object => ContextType::Class,
                ValueKind::Vector | ValueKind::Rotator | ValueKind::Transform => ContextType::Struct,
                _ => return Err(CompilerError::unexpected("member access owner", ty.to_string(), span)),
            },
            _ => return Err(CompilerError::unexpected("member access owner", ty.to_string(), span)),
        };
        let class_name = ty.argument.as_deref().map_or(ty.name.as_str(), |arg| arg.name.as_str());
        Ok(MemberContext::explicit(self.class_named(class_name), context_type))
    }

    /// Lenient fallback for owners that resolve to nothing: the single class that
    /// declares a member with the accessed name
    fn fuzzy_member_context(
        &self,
        owner_name: &str,
        member_name: &str,
        span: SourceSpan,
    ) -> Result<MemberContext, CompilerError> {
        if self.options.strict {
            return Err(CompilerError::UnknownSymbol {
                name: owner_name.to_string(),
                span,
            });
        }
        let declaring: Vec<SymbolId> = self
            .symbols
            .classes()
            .filter(|class| self.symbols.member_named(class.id, member_name, None).is_some())
            .map(|class| class.id)
            .collect();
        match declaring.as_slice() {
            [class] => {
                log::warn!(
                    "CODEGEN: unresolved '{}' at {} treated as '{}' (lenient member lookup)",
                    owner_name,
                    span,
                    self.symbols.name(*class)
                );
                Ok(MemberContext::explicit(Some(*class), ContextType::Class))
            }
            [] => Err(CompilerError::UnknownSymbol {
                name: owner_name.to_string(),
                span,
            }),
            _ => Err(CompilerError::AmbiguousMemberContext {
                member: member_name.to_string(),
                classes: declaring
                    .iter()
                    .map(|&c| self.symbols.name(c).to_string())
                    .collect(),
                span,
            }),
        }
    }

    /// Declared static type of an expression, where one is known
    pub(crate) fn expression_type(&mut self, expr: &Expr) -> Result<Option<TypeRef>, CompilerError> {
        match &expr.kind {
            ExprKind::Identifier(name) => Ok(self.resolve(name, None).and_then(|id| {
                let symbol = self.symbols.get(id);
                match &symbol.kind {
                    SymbolKind::Variable { declared_type, .. } => Some(declared_type.clone()),
                    SymbolKind::Class { .. } => {
                        Some(TypeRef::generic("Class", TypeRef::plain(&symbol.name)))
                    }
                    _ => None,
                }
            })),
            ExprKind::This => Ok(self
                .current_class
                .map(|c| TypeRef::plain(self.symbols.name(c)))),
            ExprKind::Member { owner, member } => {
                let context = self.context_for_member_expression(owner, member_name(member))?;
                self.with_context(context, |c| c.expression_type(member))
            }
            ExprKind::Call { name, .. } => Ok(self
                .resolve(name, Some(SymbolCategory::Procedure))
                .and_then(|id| match &self.symbols.get(id).kind {
                    SymbolKind::Procedure { return_type, .. } => return_type.clone(),
                    _ => None,
                })),
            ExprKind::Cast { target, .. } => Ok(Some(target.clone())),
            ExprKind::Index { array, .. } => Ok(self
                .expression_type(array)?
                .and_then(|ty| ty.argument.map(|arg| *arg))),
            ExprKind::Assign { target, .. } => self.expression_type(target),
            _ => Ok(None),
        }
    }
}

/// Name on the right of a member access, used for lenient owner lookup
pub(crate) fn member_name(member: &Expr) -> &str {
    match &member.kind {
        ExprKind::Identifier(name) | ExprKind::Call { name, .. } => name,
        _ => "",
    }
}
