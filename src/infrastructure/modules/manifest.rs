//! Module package manifests

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::application::errors::ModuleError;
use crate::domain::entities::ModuleDescriptor;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("name pattern is valid"));

/// File extensions recognised as module manifests
pub const MANIFEST_EXTENSIONS: &[&str] = &["yml", "yaml"];

/// A discovered package: its descriptor plus where it came from
#[derive(Debug, Clone)]
pub struct ModulePackage {
    pub descriptor: ModuleDescriptor,
    pub manifest_path: PathBuf,
}

impl ModulePackage {
    /// Package without a file on disk, e.g. the built-in module
    pub fn builtin(descriptor: ModuleDescriptor) -> Self {
        Self {
            descriptor,
            manifest_path: PathBuf::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Directory the manifest lives in; library paths resolve against it
    pub fn root(&self) -> &Path {
        self.manifest_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Absolute or manifest-relative path of the bundled library, if any
    pub fn library_path(&self) -> Option<PathBuf> {
        self.descriptor.library.as_ref().map(|lib| self.root().join(lib))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ModuleError::DescriptorParse {
            path: path.to_path_buf(),
            reason: format!("failed to read manifest: {}", e),
        })?;

        let descriptor = parse_descriptor(&content).map_err(|reason| ModuleError::DescriptorParse {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(Self {
            descriptor,
            manifest_path: path.to_path_buf(),
        })
    }
}

/// Parse and validate manifest text
pub fn parse_descriptor(content: &str) -> Result<ModuleDescriptor, String> {
    let descriptor: ModuleDescriptor =
        serde_yaml::from_str(content).map_err(|e| format!("failed to parse manifest: {}", e))?;

    if !NAME_PATTERN.is_match(&descriptor.name) {
        return Err(format!("invalid module name '{}'", descriptor.name));
    }
    if descriptor.version.trim().is_empty() {
        return Err("version must not be empty".to_string());
    }
    if descriptor.main.trim().is_empty() {
        return Err("main entry must not be empty".to_string());
    }
    for dep in descriptor.depend.iter().chain(descriptor.softdepend.iter()) {
        if !NAME_PATTERN.is_match(dep) {
            return Err(format!("invalid dependency name '{}'", dep));
        }
    }

    Ok(descriptor)
}

pub fn is_manifest(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| MANIFEST_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let descriptor = parse_descriptor(
            "name: moderation\nversion: 1.2.0\nmain: moderation_init\nlibrary: libmoderation.so\n\
             depend: [storage]\nsoftdepend: [logging]\n",
        )
        .unwrap();

        assert_eq!(descriptor.name, "moderation");
        assert_eq!(descriptor.depend, vec!["storage"]);
        assert_eq!(descriptor.softdepend, vec!["logging"]);
        assert_eq!(descriptor.library, Some(PathBuf::from("libmoderation.so")));
    }

    #[test]
    fn test_optional_fields_default() {
        let descriptor = parse_descriptor("name: fun\nversion: '0.1'\nmain: fun\n").unwrap();
        assert!(descriptor.depend.is_empty());
        assert!(descriptor.library.is_none());
    }

    #[test]
    fn test_missing_field_rejected() {
        assert!(parse_descriptor("name: fun\nversion: '0.1'\n").is_err());
    }

    #[test]
    fn test_invalid_name_rejected() {
        assert!(parse_descriptor("name: 'bad name'\nversion: '1'\nmain: x\n").is_err());
        assert!(parse_descriptor("name: ok\nversion: '1'\nmain: x\ndepend: ['../etc']\n").is_err());
    }

    #[test]
    fn test_library_resolves_against_manifest_dir() {
        let mut descriptor = ModuleDescriptor::new("fun", "1", "fun");
        descriptor.library = Some(PathBuf::from("libfun.so"));
        let package = ModulePackage {
            descriptor,
            manifest_path: PathBuf::from("/srv/bot/modules/fun.yml"),
        };
        assert_eq!(package.library_path(), Some(PathBuf::from("/srv/bot/modules/libfun.so")));
    }
}
