// Configuration types for pybridge, deserialized from pybridge.toml.

use std::path::Path;

use serde::Deserialize;

use crate::error::{GenError, GenResult};

/// Top-level config file.
#[derive(Deserialize)]
pub struct GenConfig {
    pub module: ModuleConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub smart_pointers: Vec<SmartPointerConfig>,
}

#[derive(Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    /// Restrict generation to this C++ namespace; generated calls are
    /// qualified with it.
    #[serde(default)]
    pub cpp_namespace: Option<String>,
    /// Prefix applied to generated global symbols (instance structs,
    /// type objects).
    #[serde(default)]
    pub name_prefix: String,
    /// Prefix stripped from C function names to derive python names.
    /// Defaults to `<module name>_`.
    #[serde(default)]
    pub strip_prefix: Option<String>,
    #[serde(default)]
    pub docstring: Option<String>,
}

impl ModuleConfig {
    pub fn effective_strip_prefix(&self) -> String {
        match &self.strip_prefix {
            Some(prefix) => prefix.clone(),
            None => format!("{}_", self.name),
        }
    }
}

#[derive(Deserialize)]
pub struct PathsConfig {
    /// Declaration JSON produced by the header scanner.
    pub declarations: String,
    /// Rendered C source output path.
    pub output: String,
}

#[derive(Deserialize, Default)]
pub struct SettingsConfig {
    /// Release the interpreter lock around native calls.
    #[serde(default)]
    pub unblock_threads: bool,
    /// Default for classes that do not say otherwise.
    #[serde(default)]
    pub allow_subclassing: bool,
    /// Default for classes that do not say otherwise.
    #[serde(default)]
    pub automatic_type_narrowing: bool,
}

#[derive(Deserialize, Default)]
pub struct ScanConfig {
    /// Header files the generated source includes.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Include directories forwarded to the header scanner.
    #[serde(default)]
    pub include_dirs: Vec<String>,
    /// Only declarations recorded under these path prefixes are wrapped;
    /// empty means everything.
    #[serde(default)]
    pub whitelist_paths: Vec<String>,
}

#[derive(Deserialize)]
pub struct SmartPointerConfig {
    /// Smart-pointer template name, e.g. `boost::shared_ptr`.
    pub template: String,
}

impl GenConfig {
    pub fn load(path: &Path) -> GenResult<GenConfig> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| GenError::Io { path: path.to_path_buf(), message: e.to_string() })?;
        toml::from_str(&data)
            .map_err(|e| GenError::Parse { path: path.to_path_buf(), message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: GenConfig = toml::from_str(
            r#"
            [module]
            name = "zoo"

            [paths]
            declarations = "zoo.decls.json"
            output = "zoo-module.cc"
            "#,
        )
        .unwrap();
        assert_eq!(config.module.name, "zoo");
        assert_eq!(config.module.effective_strip_prefix(), "zoo_");
        assert!(!config.settings.unblock_threads);
        assert!(config.scan.whitelist_paths.is_empty());
        assert!(config.smart_pointers.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config: GenConfig = toml::from_str(
            r#"
            [module]
            name = "zoo"
            cpp_namespace = "zoo"
            name_prefix = "Zoo"
            strip_prefix = "z_"

            [paths]
            declarations = "decls.json"
            output = "out.cc"

            [settings]
            unblock_threads = true
            allow_subclassing = true

            [scan]
            headers = ["zoo.h"]
            include_dirs = ["include"]
            whitelist_paths = ["src/zoo"]

            [[smart_pointers]]
            template = "boost::shared_ptr"
            "#,
        )
        .unwrap();
        assert_eq!(config.module.effective_strip_prefix(), "z_");
        assert!(config.settings.unblock_threads);
        assert_eq!(config.smart_pointers[0].template, "boost::shared_ptr");
    }
}
