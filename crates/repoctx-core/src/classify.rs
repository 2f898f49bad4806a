//! Path classification.
//!
//! A single pure function of the path decides which scoring tier a file
//! belongs to, which splitter mode it gets and how it ranks as a fetch
//! candidate.

use serde::{Deserialize, Serialize};

/// Scoring tier of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    /// `README*` / `CONTRIBUTING*` at the repository root.
    DocRoot,
    /// Anything under `docs/`, nested READMEs, other markdown.
    DocsTree,
    /// Top-level manifests and config files.
    Config,
    /// Source file whose name matches a known entry point.
    EntryPoint,
    Source,
    Other,
    Test,
    /// Lock files, minified bundles, build output, generated code.
    Generated,
}

impl PathClass {
    pub fn as_str(self) -> &'static str {
        match self {
            PathClass::DocRoot => "doc_root",
            PathClass::DocsTree => "docs_tree",
            PathClass::Config => "config",
            PathClass::EntryPoint => "entry_point",
            PathClass::Source => "source",
            PathClass::Other => "other",
            PathClass::Test => "test",
            PathClass::Generated => "generated",
        }
    }

    /// Candidate ranking, lower first. Follows the scoring tier order.
    pub fn rank(self) -> u8 {
        match self {
            PathClass::DocRoot => 0,
            PathClass::DocsTree => 1,
            PathClass::Config => 2,
            PathClass::EntryPoint => 3,
            PathClass::Source => 4,
            PathClass::Other => 5,
            PathClass::Test => 6,
            PathClass::Generated => 7,
        }
    }

    pub fn is_doc(self) -> bool {
        matches!(self, PathClass::DocRoot | PathClass::DocsTree)
    }
}

impl std::fmt::Display for PathClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ENTRY_POINT_NAMES: &[&str] = &[
    "main.py",
    "app.py",
    "__main__.py",
    "wsgi.py",
    "asgi.py",
    "manage.py",
    "index.js",
    "server.js",
    "app.js",
    "main.js",
    "index.ts",
    "main.ts",
    "server.ts",
    "index.tsx",
    "app.tsx",
    "main.go",
    "main.rs",
    "lib.rs",
    "main.java",
    "application.java",
    "program.cs",
    "main.c",
    "main.cpp",
    "main.kt",
    "main.swift",
];

const CODE_EXTENSIONS: &[&str] = &[
    "py", "rs", "go", "js", "jsx", "ts", "tsx", "mjs", "cjs", "java", "kt", "kts", "scala", "c",
    "h", "cc", "cpp", "hpp", "cs", "rb", "php", "swift", "m", "ex", "exs", "erl", "hs", "ml",
    "clj", "lua", "dart", "sh", "bash", "zig", "vue", "svelte", "r", "jl", "sql",
];

const CONFIG_EXTENSIONS: &[&str] = &["yml", "yaml", "json", "toml", "ini", "cfg", "conf"];

const CONFIG_NAMES: &[&str] = &[
    "dockerfile",
    "makefile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "procfile",
    ".env.example",
    "setup.py",
    "justfile",
];

const GENERATED_NAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "cargo.lock",
    "poetry.lock",
    "pipfile.lock",
    "composer.lock",
    "gemfile.lock",
    "go.sum",
    "uv.lock",
];

const GENERATED_DIRS: &[&str] = &["dist", "build", "out", "target", "generated", "__generated__"];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "pdf", "zip", "gz", "tgz", "tar",
    "bz2", "xz", "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "a", "o", "obj",
    "bin", "wasm", "pyc", "pyo", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "mov", "avi",
    "wav", "ogg", "webm", "psd", "sqlite", "db", "pkl", "npy", "parquet",
];

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub(crate) fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn dirs(path: &str) -> impl Iterator<Item = &str> {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    parts.into_iter()
}

fn is_top_level(path: &str) -> bool {
    !path.contains('/')
}

/// Markdown or other prose documentation by extension.
pub fn is_markdown(path: &str) -> bool {
    matches!(
        extension(path).as_deref(),
        Some("md") | Some("markdown") | Some("mdx") | Some("rst") | Some("adoc")
    )
}

/// Source code by extension.
pub fn is_code(path: &str) -> bool {
    extension(path).is_some_and(|ext| CODE_EXTENSIONS.contains(&ext.as_str()))
}

/// Known binary formats that are never worth fetching.
pub fn is_binary_path(path: &str) -> bool {
    extension(path).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

/// File name matches a known application entry point.
pub fn is_entry_point(path: &str) -> bool {
    let name = file_name(path).to_ascii_lowercase();
    ENTRY_POINT_NAMES.contains(&name.as_str())
}

/// Path is under a canonical source root.
pub fn in_source_root(path: &str) -> bool {
    dirs(path).any(|d| matches!(d, "src" | "lib" | "pkg" | "app" | "cmd" | "internal"))
}

/// Test file or test directory.
pub fn is_test(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let name = file_name(&lower);
    let in_test_dir = dirs(&lower).any(|d| {
        matches!(
            d,
            "test" | "tests" | "__tests__" | "spec" | "specs" | "testing" | "e2e"
        )
    });
    in_test_dir
        || name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.contains("_spec.")
}

fn is_generated(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let name = file_name(&lower);
    GENERATED_NAMES.contains(&name)
        || name.ends_with(".min.js")
        || name.ends_with(".min.css")
        || name.ends_with(".map")
        || name.ends_with(".pb.go")
        || name.ends_with("_pb2.py")
        || name.ends_with(".snap")
        || name.contains("_generated.")
        || name.contains(".generated.")
        || dirs(&lower).any(|d| GENERATED_DIRS.contains(&d))
}

fn is_config(path: &str) -> bool {
    if !is_top_level(path) {
        return false;
    }
    let name = file_name(path).to_ascii_lowercase();
    CONFIG_NAMES.contains(&name.as_str())
        || extension(&name).is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext.as_str()))
}

/// Classify a repository-relative path.
pub fn classify_path(path: &str) -> PathClass {
    let upper_name = file_name(path).to_ascii_uppercase();

    if is_generated(path) {
        return PathClass::Generated;
    }
    if is_top_level(path)
        && (upper_name.starts_with("README") || upper_name.starts_with("CONTRIBUTING"))
    {
        return PathClass::DocRoot;
    }
    if is_test(path) {
        return PathClass::Test;
    }
    let under_docs = dirs(path).any(|d| d.eq_ignore_ascii_case("docs") || d.eq_ignore_ascii_case("doc"));
    if under_docs || is_markdown(path) || upper_name.starts_with("README") {
        return PathClass::DocsTree;
    }
    if is_config(path) {
        return PathClass::Config;
    }
    if is_entry_point(path) {
        return PathClass::EntryPoint;
    }
    if is_code(path) {
        return PathClass::Source;
    }
    PathClass::Other
}

/// Chunk category reported with every unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkCategory {
    Readme,
    Docs,
    Code,
    Config,
    Test,
    Other,
}

impl ChunkCategory {
    pub fn label(self) -> &'static str {
        match self {
            ChunkCategory::Readme => "Readme",
            ChunkCategory::Docs => "Docs",
            ChunkCategory::Code => "Code",
            ChunkCategory::Config => "Config",
            ChunkCategory::Test => "Test",
            ChunkCategory::Other => "Other",
        }
    }
}

impl From<PathClass> for ChunkCategory {
    fn from(class: PathClass) -> Self {
        match class {
            PathClass::DocRoot => ChunkCategory::Readme,
            PathClass::DocsTree => ChunkCategory::Docs,
            PathClass::Config => ChunkCategory::Config,
            PathClass::EntryPoint | PathClass::Source => ChunkCategory::Code,
            PathClass::Test => ChunkCategory::Test,
            PathClass::Other | PathClass::Generated => ChunkCategory::Other,
        }
    }
}
