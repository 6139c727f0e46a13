//! Directory walk with parent-document pairing.
//!
//! Walks a documentation tree and returns a flat, path-sorted list of leaf
//! files. A directory named `X` with a sibling file `X.md`/`X.mdx` in the
//! same containing directory designates that sibling as the parent document
//! for every file nested under `X`, recursively. Descendants inherit the
//! nearest such pairing; a deeper pairing overrides an outer one.
//!
//! The walk recurses explicitly over `read_dir` with the inherited parent
//! carried as an accumulator, sorting entries by name so the result is
//! independent of filesystem iteration order.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::models::SourceFile;

pub fn walk_tree(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        bail!("Source root does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    walk_dir(root, "", None, &include_set, &exclude_set, &mut files)?;

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(files)
}

/// Recurse into `dir`, collecting matching files into `out`.
///
/// `rel_prefix` is the `/`-joined path of `dir` relative to the root (empty
/// at the root itself). `inherited_parent` is the relative path of the
/// nearest paired parent document established by an enclosing directory.
fn walk_dir(
    dir: &Path,
    rel_prefix: &str,
    inherited_parent: Option<&str>,
    include_set: &GlobSet,
    exclude_set: &GlobSet,
    out: &mut Vec<SourceFile>,
) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut file_rels: Vec<(String, std::path::PathBuf)> = Vec::new();
    let mut subdirs: Vec<std::path::PathBuf> = Vec::new();

    for path in entries {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let rel = if rel_prefix.is_empty() {
            name
        } else {
            format!("{}/{}", rel_prefix, name)
        };

        if path.is_dir() {
            if !exclude_set.is_match(&rel) {
                subdirs.push(path);
            }
        } else if !exclude_set.is_match(&rel) && include_set.is_match(&rel) {
            file_rels.push((rel.clone(), path.clone()));
            out.push(SourceFile {
                path: rel,
                abs_path: path,
                parent_path: inherited_parent.map(|p| p.to_string()),
            });
        }
    }

    for subdir in subdirs {
        let dir_name = match subdir.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let rel = if rel_prefix.is_empty() {
            dir_name.clone()
        } else {
            format!("{}/{}", rel_prefix, dir_name)
        };

        // A sibling file with the directory's name (any discovered extension)
        // becomes the parent for everything nested under it. file_rels is
        // sorted, so ties resolve deterministically.
        let paired = file_rels
            .iter()
            .find(|(_, abs)| {
                abs.file_stem().and_then(|s| s.to_str()) == Some(dir_name.as_str())
            })
            .map(|(rel, _)| rel.as_str());

        let parent = paired.or(inherited_parent);
        walk_dir(&subdir, &rel, parent, include_set, exclude_set, out)?;
    }

    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn includes() -> Vec<String> {
        vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
    }

    fn walk(root: &Path) -> Vec<SourceFile> {
        walk_tree(root, &includes(), &[]).unwrap()
    }

    #[test]
    fn test_sibling_file_becomes_parent() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("guide.mdx"), "Hello").unwrap();
        fs::create_dir(tmp.path().join("guide")).unwrap();
        fs::write(tmp.path().join("guide/usage.mdx"), "## Usage\nText").unwrap();

        let files = walk(tmp.path());
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "guide.mdx");
        assert_eq!(files[0].parent_path, None);
        assert_eq!(files[1].path, "guide/usage.mdx");
        assert_eq!(files[1].parent_path.as_deref(), Some("guide.mdx"));
    }

    #[test]
    fn test_inheritance_through_unpaired_subdirectory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("guide.md"), "root").unwrap();
        fs::create_dir_all(tmp.path().join("guide/advanced")).unwrap();
        fs::write(tmp.path().join("guide/advanced/tips.md"), "tips").unwrap();

        let files = walk(tmp.path());
        let tips = files.iter().find(|f| f.path.ends_with("tips.md")).unwrap();
        // `advanced/` has no sibling `advanced.md`, so the nearest pairing
        // is still guide.md.
        assert_eq!(tips.parent_path.as_deref(), Some("guide.md"));
    }

    #[test]
    fn test_deeper_pairing_overrides_outer() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("guide.md"), "root").unwrap();
        fs::create_dir_all(tmp.path().join("guide/api")).unwrap();
        fs::write(tmp.path().join("guide/api.md"), "api").unwrap();
        fs::write(tmp.path().join("guide/api/auth.md"), "auth").unwrap();

        let files = walk(tmp.path());
        let api = files.iter().find(|f| f.path == "guide/api.md").unwrap();
        assert_eq!(api.parent_path.as_deref(), Some("guide.md"));
        let auth = files.iter().find(|f| f.path == "guide/api/auth.md").unwrap();
        assert_eq!(auth.parent_path.as_deref(), Some("guide/api.md"));
    }

    #[test]
    fn test_siblings_do_not_adopt_the_pair() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("guide.md"), "root").unwrap();
        fs::write(tmp.path().join("other.md"), "other").unwrap();
        fs::create_dir(tmp.path().join("guide")).unwrap();

        let files = walk(tmp.path());
        let other = files.iter().find(|f| f.path == "other.md").unwrap();
        assert_eq!(other.parent_path, None);
    }

    #[test]
    fn test_non_matching_extensions_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("readme.md"), "x").unwrap();
        fs::write(tmp.path().join("image.png"), [0u8; 4]).unwrap();

        let files = walk(tmp.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "readme.md");
    }

    #[test]
    fn test_sorted_output() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.md"), "b").unwrap();
        fs::write(tmp.path().join("a.md"), "a").unwrap();
        fs::create_dir(tmp.path().join("c")).unwrap();
        fs::write(tmp.path().join("c/d.md"), "d").unwrap();

        let files = walk(tmp.path());
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md", "c/d.md"]);
    }

    #[test]
    fn test_missing_root_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(walk_tree(&missing, &includes(), &[]).is_err());
    }
}
