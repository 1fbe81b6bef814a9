use std::path::Path;

pub(crate) fn load_binary(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|err| format!("Failed to read {:?}: {}", path, err))
}

pub(crate) fn load_text(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|err| format!("Failed to read {:?}: {}", path, err))
}

/// Directory a relative asset reference inside `path` resolves against.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_path() {
        let err = load_text(Path::new("no/such/file.wgsl")).unwrap_err();
        assert!(err.contains("file.wgsl"));
    }

    #[test]
    fn parent_of_bare_file_is_empty() {
        assert_eq!(parent_dir(Path::new("model.obj")), Path::new(""));
        assert_eq!(parent_dir(Path::new("assets/model.obj")), Path::new("assets"));
    }
}
