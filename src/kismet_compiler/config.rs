// Compiler options
//
// Loaded from TOML by the driver; every field has a default so an empty file is valid.

use crate::kismet_compiler::error::CompilerError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Reject member accesses whose owner cannot be classified instead of guessing
    pub strict: bool,
    /// Move members of `Default__` classes onto their base class
    pub default_object_reparenting: bool,
    /// Procedures whose name starts with this are ubergraphs
    pub ubergraph_prefix: String,
    /// Locals of an ubergraph with these prefixes are also declared globally
    pub hoisted_variable_prefixes: Vec<String>,
    /// Package that owns the math/string library classes
    pub default_library_package: String,
}

/// Name prefix of class default objects
pub const DEFAULT_OBJECT_PREFIX: &str = "Default__";

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            strict: true,
            default_object_reparenting: false,
            ubergraph_prefix: "ExecuteUbergraph".to_string(),
            hoisted_variable_prefixes: vec![
                "K2Node_".to_string(),
                "CallFunc_".to_string(),
                "Temp_".to_string(),
            ],
            default_library_package: "/Script/Engine".to_string(),
        }
    }
}

impl CompilerOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, CompilerError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CompilerError> {
        let text = fs::read_to_string(path.as_ref())?;
        let options = Self::from_toml_str(&text)?;
        log::debug!("CONFIG: loaded {:?} from {}", options, path.as_ref().display());
        Ok(options)
    }

    pub fn is_ubergraph(&self, procedure_name: &str) -> bool {
        !self.ubergraph_prefix.is_empty() && procedure_name.starts_with(&self.ubergraph_prefix)
    }

    pub fn is_hoisted_variable(&self, name: &str) -> bool {
        self.hoisted_variable_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    pub fn lenient() -> Self {
        CompilerOptions {
            strict: false,
            ..CompilerOptions::default()
        }
    }
}
