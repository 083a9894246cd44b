//! Project folder loading
//!
//! Turns a source tree into a single prompt body for the document and review
//! tasks. Only folders under one of the configured `allowed_roots` can be
//! loaded; with no roots configured every folder is refused. Walking is bounded
//! by [`ProjectLimits`]; vendored and hidden directories, oversized files,
//! binary files and unknown file types are skipped.
//!
//! # Configuration
//!
//! ```toml
//! [project]
//! allowed_roots = ["/home/me/code"]
//! max_files = 50
//! max_file_size = 262144     # 256 KiB
//! max_total_bytes = 1048576  # 1 MiB
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

const IGNORED_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "vendor",
    "dist",
    "build",
    "__pycache__",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectLimits {
    /// Folders that may be loaded, together with everything below them
    pub allowed_roots: Vec<PathBuf>,

    /// Maximum number of files included
    pub max_files: usize,

    /// Files larger than this (in bytes) are skipped
    pub max_file_size: u64,

    /// Budget for all included files together (in bytes)
    pub max_total_bytes: u64,
}

impl Default for ProjectLimits {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            max_files: 50,
            max_file_size: 256 * 1024,
            max_total_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectFile {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub language: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project folder not found: {0}")]
    NotFound(String),

    #[error("Project folder is outside the allowed roots: {0}")]
    Forbidden(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("No readable source files in {0}")]
    Empty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the source files under `root`, sorted by relative path.
pub async fn load_project(
    root: &Path,
    limits: &ProjectLimits,
) -> Result<Vec<ProjectFile>, ProjectError> {
    let root = match fs::canonicalize(root).await {
        Ok(root) => root,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProjectError::NotFound(root.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if !is_allowed(&root, &limits.allowed_roots).await {
        tracing::warn!("Refusing project folder {}", root.display());
        return Err(ProjectError::Forbidden(root.display().to_string()));
    }

    let root = root.as_path();
    if !fs::metadata(root).await?.is_dir() {
        return Err(ProjectError::NotADirectory(root.display().to_string()));
    }

    let mut files = Vec::new();
    let mut total_bytes = 0u64;
    let mut pending_dirs = vec![root.to_path_buf()];

    'walk: while let Some(dir) = pending_dirs.pop() {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push((entry.path(), entry.file_type().await?));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut subdirs = Vec::new();
        for (path, file_type) in entries {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.starts_with('.') || file_type.is_symlink() {
                continue;
            }

            if file_type.is_dir() {
                if !IGNORED_DIRS.contains(&name.as_str()) {
                    subdirs.push(path);
                }
                continue;
            }

            if files.len() >= limits.max_files {
                tracing::info!("Project file limit of {} reached", limits.max_files);
                break 'walk;
            }

            let Some(language) = language_for(&path) else {
                continue;
            };

            let size = fs::metadata(&path).await?.len();
            if size > limits.max_file_size || total_bytes + size > limits.max_total_bytes {
                tracing::debug!("Skipping {} ({} bytes)", path.display(), size);
                continue;
            }

            let Ok(content) = String::from_utf8(fs::read(&path).await?) else {
                tracing::debug!("Skipping non-UTF-8 file {}", path.display());
                continue;
            };

            total_bytes += size;
            files.push(ProjectFile {
                path: relative_path(root, &path),
                language: language.to_string(),
                content,
            });
        }

        // popped in alphabetical order
        pending_dirs.extend(subdirs.into_iter().rev());
    }

    if files.is_empty() {
        return Err(ProjectError::Empty(root.display().to_string()));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(
        "Loaded {} file(s), {} bytes from {}",
        files.len(),
        total_bytes,
        root.display()
    );
    Ok(files)
}

/// `root` must already be canonical.
async fn is_allowed(root: &Path, allowed_roots: &[PathBuf]) -> bool {
    for allowed in allowed_roots {
        match fs::canonicalize(allowed).await {
            Ok(allowed) if root.starts_with(&allowed) => return true,
            Ok(_) => {}
            Err(e) => tracing::debug!("Ignoring allowed root {}: {}", allowed.display(), e),
        }
    }
    false
}

/// One fenced block per file, headed by its path.
pub fn render_project(files: &[ProjectFile]) -> String {
    files
        .iter()
        .map(|file| {
            format!(
                "### {}\n```{}\n{}\n```",
                file.path,
                file.language,
                file.content.trim_end()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn language_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    let language = match extension.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "ts" => "typescript",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sh" => "bash",
        "sql" => "sql",
        "html" => "html",
        "css" => "css",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        _ => return None,
    };
    Some(language)
}
