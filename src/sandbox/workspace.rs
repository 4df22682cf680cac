use super::SandboxError;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

const HASH_PREFIX_LEN: usize = 12;

/// Directory name for a run's workspace. The hash suffix keeps two run ids
/// that sanitize to the same string apart.
pub fn workspace_dir_name(run_id: &str) -> String {
    let sanitized: String = run_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let digest = Sha256::digest(run_id.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{sanitized}-{}", &hex[..HASH_PREFIX_LEN])
}

pub fn workspace_path(root: &Path, run_id: &str) -> PathBuf {
    root.join(workspace_dir_name(run_id))
}

/// Joins a generated relative path under `workspace`, rejecting anything that
/// would land outside it.
pub fn resolve_in_workspace(workspace: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    let trimmed = relative.trim();
    let invalid = |reason: &str| SandboxError::WorkspacePath {
        path: relative.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("path must be non-empty"));
    }

    let mut resolved = workspace.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("parent traversal is not allowed")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative to the workspace"))
            }
        }
    }
    if depth == 0 {
        return Err(invalid("path must name a file"));
    }
    Ok(resolved)
}

/// Rejects a resolved target if any existing component is a symlink or the
/// deepest existing ancestor canonicalizes outside the workspace.
pub fn ensure_no_link_escape(
    workspace: &Path,
    target: &Path,
    relative: &str,
) -> Result<(), SandboxError> {
    let invalid = |reason: String| SandboxError::WorkspacePath {
        path: relative.to_string(),
        reason,
    };
    let root = fs::canonicalize(workspace)
        .map_err(|err| invalid(format!("workspace is not accessible: {err}")))?;
    let inner = target
        .strip_prefix(workspace)
        .map_err(|_| invalid("path is outside the workspace".to_string()))?;

    let mut current = workspace.to_path_buf();
    let mut deepest = workspace.to_path_buf();
    for component in inner.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(invalid(format!(
                    "`{}` is a symlink",
                    current.strip_prefix(workspace).unwrap_or(&current).display()
                )))
            }
            Ok(_) => deepest = current.clone(),
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) => return Err(invalid(err.to_string())),
        }
    }

    let anchor = fs::canonicalize(&deepest).map_err(|err| invalid(err.to_string()))?;
    if !anchor.starts_with(&root) {
        return Err(invalid("path resolves outside the workspace".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_name_is_deterministic_and_hash_suffixed() {
        let first = workspace_dir_name("run-abc-1234");
        assert_eq!(first, workspace_dir_name("run-abc-1234"));
        assert!(first.starts_with("run-abc-1234-"));
        assert_eq!(first.len(), "run-abc-1234-".len() + HASH_PREFIX_LEN);
    }

    #[test]
    fn colliding_sanitized_ids_stay_distinct() {
        assert_ne!(workspace_dir_name("run/a"), workspace_dir_name("run:a"));
        assert!(workspace_dir_name("../../etc").starts_with("______etc-"));
    }

    #[test]
    fn resolve_rejects_escapes() {
        let root = Path::new("/tmp/ws");
        assert_eq!(
            resolve_in_workspace(root, "./src/main.py").expect("relative path"),
            PathBuf::from("/tmp/ws/src/main.py")
        );
        assert!(resolve_in_workspace(root, "../secret").is_err());
        assert!(resolve_in_workspace(root, "/etc/passwd").is_err());
        assert!(resolve_in_workspace(root, "  ").is_err());
        assert!(resolve_in_workspace(root, ".").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn link_check_rejects_symlinked_components() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = dir.path().join("ws");
        let outside = dir.path().join("outside");
        fs::create_dir_all(workspace.join("src")).expect("workspace");
        fs::create_dir_all(&outside).expect("outside");
        std::os::unix::fs::symlink(&outside, workspace.join("linked")).expect("symlink");

        let plain = workspace.join("src/new/main.py");
        ensure_no_link_escape(&workspace, &plain, "src/new/main.py").expect("plain path");

        let linked = workspace.join("linked/main.py");
        let err = ensure_no_link_escape(&workspace, &linked, "linked/main.py")
            .expect_err("symlinked dir");
        assert!(err.to_string().contains("symlink"), "{err}");
    }
}
