//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::parse_drive;

use crate::error::{MigrateError, Result};
use crate::paths::PathConfig;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Every section is optional, but the document itself must not be empty.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let has_content = yaml
            .lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with('#') && line != "---");
        if !has_content {
            return Err(MigrateError::Config("configuration file is empty".into()));
        }

        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for resume validation.
    ///
    /// The report file is left out; it does not affect what gets rewritten.
    pub fn hash(&self) -> String {
        let mut hashed = self.clone();
        hashed.migration.report_file = None;
        let yaml = serde_yaml::to_string(&hashed).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Apply command-line overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(drive) = &overrides.drive {
            self.install.drive = drive.clone();
        }
        if let Some(base_path) = &overrides.base_path {
            self.install.base_path = base_path.clone();
        }
        if let Some(root) = &overrides.root {
            self.install.root = Some(root.clone());
        }
        if let Some(drive) = &overrides.target_drive {
            self.target.mode = TargetKind::Local;
            self.target.drive = Some(drive.clone());
        }
        if let Some(host) = &overrides.host {
            self.target.mode = TargetKind::Network;
            self.target.host = Some(host.clone());
        }
        if let Some(share_path) = &overrides.share_path {
            self.target.share_path = Some(share_path.clone());
        }
        if let Some(base) = &overrides.target_base {
            self.target.base = Some(base.clone());
        }
        if overrides.skip_catalog {
            self.catalog.rewrite = false;
        }
        self.validate()
    }

    /// Build the run's [`PathConfig`].
    ///
    /// An explicit `target.base` wins. Network mode without a host falls
    /// back to a local target.
    pub fn path_config(&self) -> Result<PathConfig> {
        let drive = parse_drive(&self.install.drive, "install.drive")?;
        let config = PathConfig::new(drive, &self.install.base_path)?;

        if let Some(base) = non_blank(&self.target.base) {
            return config.with_target_base(base);
        }

        if self.target.mode == TargetKind::Network {
            match non_blank(&self.target.host) {
                Some(host) => {
                    return config.with_network_target(host, non_blank(&self.target.share_path))
                }
                None => warn!("target.mode is network but no host is set, using a local target"),
            }
        }

        let target_drive = match non_blank(&self.target.drive) {
            Some(d) => parse_drive(d, "target.drive")?,
            None => drive,
        };
        config.with_local_target(target_drive)
    }

    /// Local directory holding the catalog and the entity directories.
    ///
    /// `install.root` when set, otherwise the Windows local root as a path.
    pub fn install_dir(&self, paths: &PathConfig) -> PathBuf {
        match &self.install.root {
            Some(root) => root.clone(),
            None => PathBuf::from(paths.local_root()),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let config = Config::from_yaml("install:\n  drive: C\n").unwrap();
        assert_eq!(config.install.base_path, r"Compacw\Empresas");
        assert_eq!(config.catalog.table, "MGW00001");
        assert_eq!(config.catalog.columns, vec!["CRUTADATOS", "CRUTARES01"]);
        assert!(config.catalog.rewrite);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.tables[0].name, "mgw10006");
        assert_eq!(config.tables[1].columns, vec!["CRUTAPLA01", "CRUTAPLA02", "CRUTAENT01"]);
    }

    #[test]
    fn test_empty_file_is_rejected() {
        for yaml in ["", "   \n", "# only a comment\n", "---\n"] {
            let err = Config::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, MigrateError::Config(_)), "{:?}", yaml);
        }
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
install:
  drive: c
  base_path: 'Compacw/Empresas/'
  root: /mnt/empresas
target:
  mode: network
  host: SRV
  share_path: Datos
catalog:
  rewrite: false
tables:
  - name: mgw10006
    columns: [CRUTAENT01]
migration:
  report_file: cambios_rutas.log
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.install.root, Some(PathBuf::from("/mnt/empresas")));
        assert_eq!(config.tables.len(), 1);
        assert_eq!(
            config.migration.report_file,
            Some(PathBuf::from("cambios_rutas.log"))
        );

        let paths = config.path_config().unwrap();
        assert_eq!(paths.drive_letter(), 'C');
        assert_eq!(paths.base_path(), r"Compacw\Empresas");
        assert_eq!(paths.target_base(), r"\\SRV\Datos\Empresas");
        assert_eq!(config.install_dir(&paths), PathBuf::from("/mnt/empresas"));
    }

    #[test]
    fn test_local_target_defaults_to_install_drive() {
        let paths = Config::default().path_config().unwrap();
        assert_eq!(paths.target_base(), "C:");
        assert_eq!(
            Config::default().install_dir(&paths),
            PathBuf::from(r"C:\Compacw\Empresas")
        );
    }

    #[test]
    fn test_network_without_host_falls_back_to_local() {
        let mut config = Config::default();
        config.target.mode = TargetKind::Network;
        config.target.drive = Some("D".into());
        config.target.host = Some("  ".into());
        let paths = config.path_config().unwrap();
        assert_eq!(paths.target_base(), "D:");
        assert!(!paths.is_network_target());
    }

    #[test]
    fn test_explicit_base_wins() {
        let mut config = Config::default();
        config.target.mode = TargetKind::Network;
        config.target.host = Some("SRV".into());
        config.target.base = Some(r"\\NEW\Compacw\Empresas\".into());
        let paths = config.path_config().unwrap();
        assert_eq!(paths.target_base(), r"\\NEW\Compacw\Empresas");
        assert_eq!(paths.net_host(), Some("NEW"));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(&Overrides {
                host: Some("SRV".into()),
                skip_catalog: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.target.mode, TargetKind::Network);
        assert!(!config.catalog.rewrite);
        assert_eq!(config.path_config().unwrap().target_base(), r"\\SRV\Compacw\Empresas");

        let err = config
            .apply_overrides(&Overrides {
                drive: Some("12".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_hash_tracks_changes() {
        let config = Config::default();
        let mut changed = config.clone();
        changed.target.drive = Some("D".into());
        assert_eq!(config.hash(), Config::default().hash());
        assert_ne!(config.hash(), changed.hash());
    }
}
