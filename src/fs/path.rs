//! Pure path-splitting helpers; no disk access. Paths are always absolute,
//! `/`-separated, and resolved one component at a time against directory
//! blocks by the filesystem core.

use crate::error::{Error, Result};

/// Splits an absolute path into its non-empty components.
pub fn components(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(Error::validation(format!("path {path} must be absolute")));
    }
    Ok(path.split('/').filter(|c| !c.is_empty()).collect())
}

/// Splits a path into (parent path, last component). The root has no parent.
pub fn split_parent(path: &str) -> Result<(String, String)> {
    let parts = components(path)?;
    let Some((last, rest)) = parts.split_last() else {
        return Err(Error::validation("root has no parent"));
    };
    let parent = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.join("/"))
    };
    Ok((parent, last.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn components_of_nested_path() {
        assert_eq!(components("/a/b/c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(components("/").unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn split_parent_nested() {
        let (parent, name) = split_parent("/a/b/c").unwrap();
        assert_eq!(parent, "/a/b");
        assert_eq!(name, "c");
    }

    #[test]
    fn split_parent_top_level() {
        let (parent, name) = split_parent("/file.txt").unwrap();
        assert_eq!(parent, "/");
        assert_eq!(name, "file.txt");
    }

    #[test]
    fn relative_path_rejected() {
        assert!(components("a/b").is_err());
    }
}
