use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_SOURCE_NAME_CHARS: [char; 3] = ['/', '\\', '\0'];

/// Closed set of supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageId {
    C,
    Cpp,
    Java,
    Python,
}

impl LanguageId {
    pub const ALL: [LanguageId; 4] = [
        LanguageId::C,
        LanguageId::Cpp,
        LanguageId::Java,
        LanguageId::Python,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageId::C => "c",
            LanguageId::Cpp => "cpp",
            LanguageId::Java => "java",
            LanguageId::Python => "python",
        }
    }

    /// Diagnostic family used to pick the error classification rules
    pub fn family(&self) -> LanguageFamily {
        match self {
            LanguageId::C | LanguageId::Cpp => LanguageFamily::Native,
            LanguageId::Java => LanguageFamily::Jvm,
            LanguageId::Python => LanguageFamily::Interpreted,
        }
    }
}

impl FromStr for LanguageId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LanguageId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownLanguage(s.to_owned()))
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    /// C and C++ toolchains (gcc-style diagnostics, signal crashes)
    Native,
    /// javac diagnostics and JVM exception traces
    Jvm,
    /// Python-style tracebacks
    Interpreted,
}

/// Immutable description of how to build and run one language
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageProfile {
    pub id: LanguageId,

    /// Human-readable name (e.g., "C++ 17 (GCC)")
    pub name: String,

    /// Container image providing the toolchain
    pub image: String,

    /// File name the source is written to inside the scratch directory
    pub source_name: SourceName,

    /// Compilation configuration (None for interpreted languages)
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

impl LanguageProfile {
    /// Check if the language has a separate compile step
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Expand placeholders in the given command
    ///
    /// `{source}` becomes the source file name and `{dir}` the scratch directory.
    pub fn expand_command(command: &[String], source: &str, dir: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| arg.replace("{source}", source).replace("{dir}", dir))
            .collect()
    }

    /// Compile argv with placeholders expanded, if the language is compiled
    pub fn compile_argv(&self, dir: &str) -> Option<Vec<String>> {
        self.compile
            .as_ref()
            .map(|c| Self::expand_command(&c.command, self.source_name.as_str(), dir))
    }

    /// Run argv with placeholders expanded
    pub fn run_argv(&self, dir: &str) -> Vec<String> {
        Self::expand_command(&self.run.command, self.source_name.as_str(), dir)
    }
}

/// Bare file name without path separators (e.g., "Main.java")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceName(String);

impl SourceName {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        let contains_invalid = name
            .chars()
            .any(|c| INVALID_SOURCE_NAME_CHARS.contains(&c));
        if contains_invalid || name == "." || name == ".." {
            return Err(ConfigError::InvalidSourceName(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for SourceName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SourceName::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a bare file name without path separators",
            )
        })
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {dir}
    pub command: Vec<String>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {dir}
    pub command: Vec<String>,

    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Profile fields as written in a `[languages.<id>]` table
#[derive(Deserialize)]
struct ProfileTable {
    name: String,
    image: String,
    source_name: SourceName,
    #[serde(default)]
    compile: Option<CompileConfig>,
    run: RunConfig,
}

/// Deserialize the language table, stamping each profile with its key
pub(crate) fn deserialize_table<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<LanguageId, LanguageProfile>, D::Error>
where
    D: Deserializer<'de>,
{
    let tables = BTreeMap::<LanguageId, ProfileTable>::deserialize(deserializer)?;
    Ok(tables
        .into_iter()
        .map(|(id, t)| {
            let profile = LanguageProfile {
                id,
                name: t.name,
                image: t.image,
                source_name: t.source_name,
                compile: t.compile,
                run: t.run,
            };
            (id, profile)
        })
        .collect())
}
