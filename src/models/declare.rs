//! Language and compiler declaration documents
//!
//! The declaration documents are sent verbatim to every judge worker during
//! the connection handshake, and consulted locally when a submission is
//! taken in (accepted language, compiler, source file name).

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One declared programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageDecl {
    pub name: String,
    pub versions: Vec<String>,
    /// Source file name template, e.g. `{id}.py`
    pub file_name: String,
}

impl LanguageDecl {
    /// Source file name for a submission id
    pub fn file_name_for(&self, id: &str) -> String {
        self.file_name.replace("{id}", id)
    }
}

/// One declared compiler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerDecl {
    pub name: String,
    pub versions: Vec<String>,
}

/// Declaration loading errors
#[derive(Debug, thiserror::Error)]
pub enum DeclareError {
    #[error("failed to read declaration {0}: {1}")]
    Read(String, #[source] std::io::Error),

    #[error("failed to parse declaration {0}: {1}")]
    Parse(String, #[source] serde_json::Error),
}

/// Parsed declaration documents plus their raw JSON payloads
#[derive(Debug, Clone)]
pub struct Declarations {
    languages: Vec<LanguageDecl>,
    compilers: Vec<CompilerDecl>,
    language_json: String,
    compiler_json: String,
}

impl Declarations {
    /// Load `language.json` and `compiler.json` from the declare directory
    pub async fn load(dir: &Path) -> Result<Self, DeclareError> {
        let language_json = read(dir, "language.json").await?;
        let compiler_json = read(dir, "compiler.json").await?;

        let languages = serde_json::from_str(&language_json)
            .map_err(|e| DeclareError::Parse("language.json".to_string(), e))?;
        let compilers = serde_json::from_str(&compiler_json)
            .map_err(|e| DeclareError::Parse("compiler.json".to_string(), e))?;

        Ok(Self {
            languages,
            compilers,
            language_json,
            compiler_json,
        })
    }

    /// Build declarations from already-parsed documents
    pub fn from_parts(languages: Vec<LanguageDecl>, compilers: Vec<CompilerDecl>) -> Self {
        let language_json = serde_json::to_string(&languages).unwrap_or_default();
        let compiler_json = serde_json::to_string(&compilers).unwrap_or_default();
        Self {
            languages,
            compilers,
            language_json,
            compiler_json,
        }
    }

    pub fn language(&self, name: &str) -> Option<&LanguageDecl> {
        self.languages.iter().find(|lang| lang.name == name)
    }

    pub fn compiler(&self, name: &str) -> Option<&CompilerDecl> {
        self.compilers.iter().find(|compiler| compiler.name == name)
    }

    /// Raw `language.json` payload for the connection handshake
    pub fn language_payload(&self) -> &str {
        &self.language_json
    }

    /// Raw `compiler.json` payload for the connection handshake
    pub fn compiler_payload(&self) -> &str {
        &self.compiler_json
    }
}

async fn read(dir: &Path, file: &str) -> Result<String, DeclareError> {
    tokio::fs::read_to_string(dir.join(file))
        .await
        .map_err(|e| DeclareError::Read(file.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_template_substitutes_id() {
        let lang = LanguageDecl {
            name: "python".to_string(),
            versions: vec!["3.12".to_string()],
            file_name: "{id}.py".to_string(),
        };
        assert_eq!(lang.file_name_for("abc"), "abc.py");
    }
}
