use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Recipe for one language: how to build a source file and how to run it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Display name (e.g., "C++ (GCC)")
    pub name: String,

    pub extension: FileExtension,

    /// Build step; absent for interpreted languages
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    pub run: RunConfig,
}

impl Language {
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// File the submitted code is written to
    pub fn source_name(&self) -> String {
        if let Some(ref compile) = self.compile {
            compile.source_name.clone()
        } else if let Some(ref name) = self.run.source_name {
            name.clone()
        } else {
            format!("main.{}", self.extension)
        }
    }

    /// Name of the build artifact; the source itself for interpreted languages
    pub fn binary_name(&self) -> String {
        match self.compile {
            Some(ref compile) => compile.output_name.clone(),
            None => self.source_name(),
        }
    }

    /// Expanded compiler argv, if the language is compiled
    pub fn compile_command(&self) -> Option<Vec<String>> {
        self.compile.as_ref().map(|compile| {
            Self::expand_command(&compile.command, &compile.source_name, &compile.output_name)
        })
    }

    /// Expanded run argv
    pub fn run_command(&self) -> Vec<String> {
        Self::expand_command(&self.run.command, &self.source_name(), &self.binary_name())
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str, binary: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
            })
            .collect()
    }
}

/// Source file extension, stored without the leading dot
///
/// Rejects `/` and `.` so a recipe can never name a file outside the
/// workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        if extension.contains(INVALID_FILE_EXT_CHARS) {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for FileExtension {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<FileExtension> for String {
    fn from(extension: FileExtension) -> Self {
        extension.0
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compiler invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Argv template; `{source}` and `{output}` are expanded
    pub command: Vec<String>,

    /// Source file name in the workspace (e.g., "main.cpp")
    pub source_name: String,

    /// Build artifact name (e.g., "main")
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Program invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Argv template; `{source}` and `{binary}` are expanded
    pub command: Vec<String>,

    /// Source file name for interpreted languages (default: "main.<extension>")
    #[serde(default)]
    pub source_name: Option<String>,

    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
}
