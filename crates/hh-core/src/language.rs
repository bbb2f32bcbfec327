//! Language detection from file extensions.

use std::path::Path;

/// Tag used for files whose extension is not recognized.
pub const OTHER_LANGUAGE: &str = "Other";

/// Returns the language tag for a file path, matching the extension
/// case-insensitively.
pub fn detect_language(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return OTHER_LANGUAGE;
    };
    match ext.to_ascii_lowercase().as_str() {
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "py" => "Python",
        "go" => "Go",
        "rs" => "Rust",
        "java" => "Java",
        "kt" => "Kotlin",
        "c" | "h" => "C",
        "cpp" | "hpp" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "dart" => "Dart",
        "lua" => "Lua",
        "sh" | "bash" | "zsh" => "Shell",
        "ps1" => "PowerShell",
        "json" => "JSON",
        "yml" | "yaml" => "YAML",
        "toml" => "TOML",
        "md" => "Markdown",
        "html" => "HTML",
        "css" => "CSS",
        "scss" => "SCSS",
        "less" => "LESS",
        "sql" => "SQL",
        _ => OTHER_LANGUAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_languages() {
        assert_eq!(detect_language(Path::new("/src/app.tsx")), "TypeScript");
        assert_eq!(detect_language(Path::new("/src/index.mjs")), "JavaScript");
        assert_eq!(detect_language(Path::new("main.rs")), "Rust");
        assert_eq!(detect_language(Path::new("lib/util.hpp")), "C++");
        assert_eq!(detect_language(Path::new("deploy.zsh")), "Shell");
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(detect_language(Path::new("README.MD")), "Markdown");
        assert_eq!(detect_language(Path::new("Component.TS")), "TypeScript");
    }

    #[test]
    fn unknown_or_missing_extension_is_other() {
        assert_eq!(detect_language(Path::new("Makefile")), OTHER_LANGUAGE);
        assert_eq!(detect_language(Path::new("image.png")), OTHER_LANGUAGE);
        assert_eq!(detect_language(Path::new(".bashrc")), OTHER_LANGUAGE);
    }
}
