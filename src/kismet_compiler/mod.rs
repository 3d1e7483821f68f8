// Kismet Compiler Module
// Turns a parsed compilation unit into Kismet bytecode against a package's object table

pub mod ast;
pub mod bytecode;
pub mod bytecode_size;
pub mod codegen;
pub mod codegen_context;
pub mod codegen_expressions;
pub mod codegen_fixup;
pub mod codegen_intrinsics;
pub mod codegen_statements;
pub mod config;
pub mod error;
pub mod name_resolver;
pub mod package;
pub mod scope;
pub mod script;
pub mod symbol_builder;
pub mod symbols;
pub mod value_kind;

#[cfg(test)]
mod test_support;

pub use config::CompilerOptions;
pub use error::CompilerError;
pub use package::{ObjectTable, Package};
pub use script::Script;

use codegen::ScriptCompiler;
use symbol_builder::SymbolTreeBuilder;

/// Main compiler structure
pub struct KismetCompiler {
    options: CompilerOptions,
}

impl Default for KismetCompiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl KismetCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        KismetCompiler { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile one unit. Imports and exports the unit needs are added to `table`.
    pub fn compile(
        &self,
        unit: &ast::CompilationUnit,
        table: &mut dyn ObjectTable,
    ) -> Result<Script, CompilerError> {
        // Phase 1: Symbols, bound to object-table entries
        let tree = SymbolTreeBuilder::new(&mut *table, &self.options).build(unit)?;
        log::debug!(
            "SYMBOLS: {} symbols for package '{}'",
            tree.symbols.len(),
            table.package_name()
        );

        // Phase 2: Code generation and fixup
        let mut compiler = ScriptCompiler::new(table, &self.options, tree);
        compiler.compile_unit(unit)
    }
}
