// Compiled script model handed to the container serializer

use crate::kismet_compiler::bytecode::Instruction;
use crate::kismet_compiler::bytecode_size::SizeModel;
use crate::kismet_compiler::package::PackageIndex;
use std::fmt;

pub const FUNC_FINAL: u32 = 0x0000_0001;
pub const FUNC_STATIC: u32 = 0x0000_2000;
pub const FUNC_PUBLIC: u32 = 0x0002_0000;
pub const FUNC_UBERGRAPH: u32 = 0x0040_0000;

pub const CLASS_ABSTRACT: u32 = 0x0000_0001;
pub const CLASS_INTERFACE: u32 = 0x0000_4000;
pub const CLASS_STRUCT: u32 = 0x0001_0000;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    pub name: String,
    pub export: PackageIndex,
    pub instructions: Vec<Instruction>,
    pub flags: u32,
}

impl FunctionRecord {
    /// Serialized size of the whole bytecode stream
    pub fn bytecode_size(&self, model: &SizeModel) -> usize {
        self.instructions
            .iter()
            .map(|i| model.serialized_size(i))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub name: String,
    pub base: Option<String>,
    pub flags: u32,
    pub functions: Vec<FunctionRecord>,
    pub properties: Vec<PropertyRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    /// Free functions not owned by any class
    pub functions: Vec<FunctionRecord>,
    pub properties: Vec<PropertyRecord>,
    pub classes: Vec<ClassRecord>,
}

impl Script {
    /// Every compiled function, free ones first then class members in class order
    pub fn all_functions(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.functions.iter()))
    }

    pub fn function(&self, name: &str) -> Option<&FunctionRecord> {
        self.all_functions().find(|f| f.name == name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassRecord> {
        self.classes.iter().find(|c| c.name == name)
    }
}

fn write_function(f: &mut fmt::Formatter, function: &FunctionRecord, indent: &str) -> fmt::Result {
    let model = SizeModel::default();
    writeln!(
        f,
        "{}function {} [{}] flags=0x{:08x}",
        indent, function.name, function.export, function.flags
    )?;
    let mut offset = 0;
    for instruction in &function.instructions {
        writeln!(f, "{}  {:04x}: {}", indent, offset, instruction)?;
        offset += model.serialized_size(instruction);
    }
    Ok(())
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for property in &self.properties {
            writeln!(f, "property {}: {}", property.name, property.type_name)?;
        }
        for function in &self.functions {
            write_function(f, function, "")?;
        }
        for class in &self.classes {
            match &class.base {
                Some(base) => writeln!(f, "class {} : {} flags=0x{:08x}", class.name, base, class.flags)?,
                None => writeln!(f, "class {} flags=0x{:08x}", class.name, class.flags)?,
            }
            for property in &class.properties {
                writeln!(f, "  property {}: {}", property.name, property.type_name)?;
            }
            for function in &class.functions {
                write_function(f, function, "  ")?;
            }
        }
        Ok(())
    }
}
