// Object table of the asset container
//
// The compiler never serializes the container itself. It reads the import/export
// tables to resolve names and appends entries for declarations that have none yet.

use crate::kismet_compiler::bytecode_size::SizeModel;
use crate::kismet_compiler::error::CompilerError;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Object version at which SetArray stopped carrying a raw inner property reference
pub const VER_UE4_CHANGE_SETARRAY_BYTECODE: i32 = 218;

/// Signed index into the import (negative) or export (positive) table. Zero is null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct PackageIndex(pub i32);

impl PackageIndex {
    pub const NULL: PackageIndex = PackageIndex(0);

    pub fn from_import(position: usize) -> Self {
        PackageIndex(-(position as i32) - 1)
    }

    pub fn from_export(position: usize) -> Self {
        PackageIndex(position as i32 + 1)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn is_import(&self) -> bool {
        self.0 < 0
    }

    pub fn is_export(&self) -> bool {
        self.0 > 0
    }

    pub fn import_position(&self) -> Option<usize> {
        if self.is_import() {
            Some((-self.0 - 1) as usize)
        } else {
            None
        }
    }

    pub fn export_position(&self) -> Option<usize> {
        if self.is_export() {
            Some((self.0 - 1) as usize)
        } else {
            None
        }
    }
}

impl fmt::Display for PackageIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FormatVersion {
    pub object_version: i32,
    /// Properties are addressed as (owner, field path) instead of per-property exports
    #[serde(default)]
    pub field_path_properties: bool,
}

impl FormatVersion {
    pub fn set_array_takes_property_expression(&self) -> bool {
        self.object_version >= VER_UE4_CHANGE_SETARRAY_BYTECODE
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        FormatVersion {
            object_version: 522,
            field_path_properties: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportEntry {
    pub class_package: String,
    pub class_name: String,
    pub object_name: String,
    #[serde(default)]
    pub outer: PackageIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ExportKind {
    Class,
    Function,
    Property,
    Object,
}

pub const RF_PUBLIC: u32 = 0x0000_0001;
pub const RF_STANDALONE: u32 = 0x0000_0002;
pub const RF_TRANSACTIONAL: u32 = 0x0000_0008;
pub const RF_CLASS_DEFAULT_OBJECT: u32 = 0x0000_0010;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExportEntry {
    pub object_name: String,
    pub kind: ExportKind,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub outer: PackageIndex,
    #[serde(default)]
    pub super_index: PackageIndex,
    #[serde(default)]
    pub object_flags: u32,
    /// Entries that must be created before this one is serialized
    #[serde(default)]
    pub dependencies: Vec<PackageIndex>,
}

/// Handle onto the container's object table
pub trait ObjectTable {
    fn imports(&self) -> &[ImportEntry];
    fn exports(&self) -> &[ExportEntry];
    fn add_import(&mut self, import: ImportEntry) -> PackageIndex;
    fn add_export(&mut self, export: ExportEntry) -> PackageIndex;
    fn format_version(&self) -> FormatVersion;
    /// Name of the package being compiled
    fn package_name(&self) -> &str;

    fn size_model(&self) -> SizeModel {
        SizeModel::default()
    }

    /// Existing import with this object name directly under `outer`
    fn find_import(&self, object_name: &str, outer: PackageIndex) -> Option<PackageIndex> {
        self.imports()
            .iter()
            .position(|i| i.object_name == object_name && i.outer == outer)
            .map(PackageIndex::from_import)
    }

    fn object_name(&self, index: PackageIndex) -> Option<&str> {
        if let Some(pos) = index.import_position() {
            return self.imports().get(pos).map(|i| i.object_name.as_str());
        }
        if let Some(pos) = index.export_position() {
            return self.exports().get(pos).map(|e| e.object_name.as_str());
        }
        None
    }

    fn outer_of(&self, index: PackageIndex) -> PackageIndex {
        if let Some(pos) = index.import_position() {
            return self
                .imports()
                .get(pos)
                .map(|i| i.outer)
                .unwrap_or(PackageIndex::NULL);
        }
        if let Some(pos) = index.export_position() {
            return self
                .exports()
                .get(pos)
                .map(|e| e.outer)
                .unwrap_or(PackageIndex::NULL);
        }
        PackageIndex::NULL
    }

    /// Dotted name built by walking the outer chain, outermost first
    fn full_name(&self, index: PackageIndex) -> String {
        let mut parts = Vec::new();
        let mut current = index;
        // Outer chains are acyclic in well-formed containers; the bound guards bad input
        let limit = self.imports().len() + self.exports().len() + 1;
        while !current.is_null() && parts.len() < limit {
            match self.object_name(current) {
                Some(name) => parts.push(name.to_string()),
                None => break,
            }
            current = self.outer_of(current);
        }
        parts.reverse();
        parts.join(".")
    }
}

/// In-memory object table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: FormatVersion,
    #[serde(default)]
    pub imports: Vec<ImportEntry>,
    #[serde(default)]
    pub exports: Vec<ExportEntry>,
}

impl Package {
    pub fn new(name: &str, version: FormatVersion) -> Self {
        Package {
            name: name.to_string(),
            version,
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CompilerError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CompilerError> {
        let package = Self::from_toml_str(&fs::read_to_string(path)?)?;
        log::debug!(
            "PACKAGE: loaded '{}' with {} imports, {} exports",
            package.name,
            package.imports.len(),
            package.exports.len()
        );
        Ok(package)
    }

    /// Import a package, class or object by name under an outer entry
    pub fn import(
        &mut self,
        class_package: &str,
        class_name: &str,
        object_name: &str,
        outer: PackageIndex,
    ) -> PackageIndex {
        self.add_import(ImportEntry {
            class_package: class_package.to_string(),
            class_name: class_name.to_string(),
            object_name: object_name.to_string(),
            outer,
        })
    }

    pub fn export(&mut self, object_name: &str, kind: ExportKind, outer: PackageIndex) -> PackageIndex {
        self.add_export(ExportEntry {
            object_name: object_name.to_string(),
            kind,
            class_name: String::new(),
            outer,
            super_index: PackageIndex::NULL,
            object_flags: RF_PUBLIC,
            dependencies: Vec::new(),
        })
    }
}

impl ObjectTable for Package {
    fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    fn add_import(&mut self, import: ImportEntry) -> PackageIndex {
        log::debug!(
            "PACKAGE: add import '{}' ({}) outer={}",
            import.object_name,
            import.class_name,
            import.outer
        );
        self.imports.push(import);
        PackageIndex::from_import(self.imports.len() - 1)
    }

    fn add_export(&mut self, export: ExportEntry) -> PackageIndex {
        log::debug!(
            "PACKAGE: add export '{}' ({:?}) outer={}",
            export.object_name,
            export.kind,
            export.outer
        );
        self.exports.push(export);
        PackageIndex::from_export(self.exports.len() - 1)
    }

    fn format_version(&self) -> FormatVersion {
        self.version
    }

    fn package_name(&self) -> &str {
        &self.name
    }
}
