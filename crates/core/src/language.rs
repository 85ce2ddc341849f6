use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  TypeScript,
  JavaScript,
  Tsx,
  Jsx,
  Html,
  Css,
  Scss,
  Sass,
  Less,
  Rust,
  Python,
  Go,
  Java,
  Kotlin,
  Scala,
  CSharp,
  Cpp,
  C,
  Swift,
  Ruby,
  Php,
  Lua,
  Elixir,
  Haskell,
  Zig,
  Json,
  Yaml,
  Toml,
  Xml,
  Markdown,
  Shell,
  Sql,
  Dockerfile,
  GraphQL,
  Proto,
  Text,
}

impl Language {
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.to_lowercase().as_str() {
      "ts" | "mts" => Some(Language::TypeScript),
      "js" | "mjs" | "cjs" => Some(Language::JavaScript),
      "tsx" => Some(Language::Tsx),
      "jsx" => Some(Language::Jsx),
      "html" | "htm" => Some(Language::Html),
      "css" => Some(Language::Css),
      "scss" => Some(Language::Scss),
      "sass" => Some(Language::Sass),
      "less" => Some(Language::Less),
      "rs" => Some(Language::Rust),
      "py" | "pyi" | "pyw" => Some(Language::Python),
      "go" => Some(Language::Go),
      "java" => Some(Language::Java),
      "kt" | "kts" => Some(Language::Kotlin),
      "scala" | "sc" => Some(Language::Scala),
      "cs" => Some(Language::CSharp),
      "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "h" => Some(Language::Cpp),
      "c" => Some(Language::C),
      "swift" => Some(Language::Swift),
      "rb" | "rake" => Some(Language::Ruby),
      "php" => Some(Language::Php),
      "lua" => Some(Language::Lua),
      "ex" | "exs" => Some(Language::Elixir),
      "hs" => Some(Language::Haskell),
      "zig" => Some(Language::Zig),
      "json" | "jsonc" => Some(Language::Json),
      "yaml" | "yml" => Some(Language::Yaml),
      "toml" => Some(Language::Toml),
      "xml" | "xsd" | "xsl" | "svg" => Some(Language::Xml),
      "md" | "markdown" => Some(Language::Markdown),
      "sh" | "bash" | "zsh" | "fish" => Some(Language::Shell),
      "sql" => Some(Language::Sql),
      "dockerfile" => Some(Language::Dockerfile),
      "graphql" | "gql" => Some(Language::GraphQL),
      "proto" => Some(Language::Proto),
      "txt" | "text" => Some(Language::Text),
      _ => None,
    }
  }

  /// The file type this language maps to. The chunker picks its track from this.
  pub fn file_type(&self) -> FileType {
    match self {
      Language::Markdown | Language::Text => FileType::Docs,
      Language::Yaml | Language::Toml | Language::Dockerfile => FileType::Config,
      Language::Css | Language::Scss | Language::Sass | Language::Less => FileType::Style,
      Language::Json | Language::Xml => FileType::Data,
      _ => FileType::Code,
    }
  }

  /// Stable lowercase name used in storage and filters.
  pub fn as_str(&self) -> &'static str {
    match self {
      Language::TypeScript => "typescript",
      Language::JavaScript => "javascript",
      Language::Tsx => "tsx",
      Language::Jsx => "jsx",
      Language::Html => "html",
      Language::Css => "css",
      Language::Scss => "scss",
      Language::Sass => "sass",
      Language::Less => "less",
      Language::Rust => "rust",
      Language::Python => "python",
      Language::Go => "go",
      Language::Java => "java",
      Language::Kotlin => "kotlin",
      Language::Scala => "scala",
      Language::CSharp => "csharp",
      Language::Cpp => "cpp",
      Language::C => "c",
      Language::Swift => "swift",
      Language::Ruby => "ruby",
      Language::Php => "php",
      Language::Lua => "lua",
      Language::Elixir => "elixir",
      Language::Haskell => "haskell",
      Language::Zig => "zig",
      Language::Json => "json",
      Language::Yaml => "yaml",
      Language::Toml => "toml",
      Language::Xml => "xml",
      Language::Markdown => "markdown",
      Language::Shell => "shell",
      Language::Sql => "sql",
      Language::Dockerfile => "dockerfile",
      Language::GraphQL => "graphql",
      Language::Proto => "proto",
      Language::Text => "text",
    }
  }

  pub fn from_str_loose(s: &str) -> Option<Self> {
    let lower = s.to_lowercase();
    match lower.as_str() {
      "typescript" => Some(Language::TypeScript),
      "javascript" => Some(Language::JavaScript),
      "tsx" => Some(Language::Tsx),
      "jsx" => Some(Language::Jsx),
      "html" => Some(Language::Html),
      "css" => Some(Language::Css),
      "scss" => Some(Language::Scss),
      "sass" => Some(Language::Sass),
      "less" => Some(Language::Less),
      "rust" => Some(Language::Rust),
      "python" => Some(Language::Python),
      "go" => Some(Language::Go),
      "java" => Some(Language::Java),
      "kotlin" => Some(Language::Kotlin),
      "scala" => Some(Language::Scala),
      "csharp" => Some(Language::CSharp),
      "cpp" => Some(Language::Cpp),
      "c" => Some(Language::C),
      "swift" => Some(Language::Swift),
      "ruby" => Some(Language::Ruby),
      "php" => Some(Language::Php),
      "lua" => Some(Language::Lua),
      "elixir" => Some(Language::Elixir),
      "haskell" => Some(Language::Haskell),
      "zig" => Some(Language::Zig),
      "json" => Some(Language::Json),
      "yaml" => Some(Language::Yaml),
      "toml" => Some(Language::Toml),
      "xml" => Some(Language::Xml),
      "markdown" => Some(Language::Markdown),
      "shell" => Some(Language::Shell),
      "sql" => Some(Language::Sql),
      "dockerfile" => Some(Language::Dockerfile),
      "graphql" => Some(Language::GraphQL),
      "proto" => Some(Language::Proto),
      "text" => Some(Language::Text),
      _ => Language::from_extension(&lower),
    }
  }
}

/// Broad classification of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
  Code,
  Docs,
  Config,
  Style,
  Data,
}

impl FileType {
  pub fn as_str(&self) -> &'static str {
    match self {
      FileType::Code => "code",
      FileType::Docs => "docs",
      FileType::Config => "config",
      FileType::Style => "style",
      FileType::Data => "data",
    }
  }

  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.to_lowercase().as_str() {
      "code" => Some(FileType::Code),
      "docs" | "doc" => Some(FileType::Docs),
      "config" => Some(FileType::Config),
      "style" => Some(FileType::Style),
      "data" => Some(FileType::Data),
      _ => None,
    }
  }
}
