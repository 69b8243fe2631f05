// Source language detection from file extensions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    Go,
    Python,
    Java,
    JavaScript,
    TypeScript,
    Jsx,
    Tsx,
    Html,
    Css,
    Php,
    Rust,
    Swift,
    Kotlin,
    C,
    Cpp,
}

impl CodeLanguage {
    pub fn from_extension(extension: &str) -> Option<Self> {
        let language = match extension {
            "go" => Self::Go,
            "py" => Self::Python,
            "java" => Self::Java,
            "js" => Self::JavaScript,
            "ts" => Self::TypeScript,
            "jsx" => Self::Jsx,
            "tsx" => Self::Tsx,
            "html" => Self::Html,
            "css" => Self::Css,
            "php" => Self::Php,
            "rs" => Self::Rust,
            "swift" => Self::Swift,
            "kt" => Self::Kotlin,
            "c" => Self::C,
            "cpp" | "cc" | "cxx" => Self::Cpp,
            _ => return None,
        };
        Some(language)
    }

    /// Detect by the text after the last `.` in `path`.
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, extension) = path.rsplit_once('.')?;
        Self::from_extension(extension)
    }
}
