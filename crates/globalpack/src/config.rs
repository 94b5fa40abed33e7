//! Configuration for the packing stage
//!
//! [`Config`] is what callers hand to [`crate::install`]. [`FileConfig`] is
//! the serializable subset the CLI layers together from the user config
//! directory, a project `globalpack.toml` and `GLOBALPACK_*` environment
//! variables.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use serde::Deserialize;

use crate::{
    error::{GlobalPackError, Result},
    types::ModuleIdentity,
};

/// Project-level configuration file name
pub const CONFIG_FILE_NAME: &str = "globalpack.toml";

/// Caller-supplied mapping from chunk identity to output path
pub type OutfileFn = Box<dyn FnMut(&ModuleIdentity) -> String>;

/// Options of one packing stage
#[derive(Default)]
pub struct Config {
    /// Directory that receives one file per resolved module id
    pub write_to_dir: Option<PathBuf>,
    /// Custom output path per chunk; may map several chunks to one path
    pub get_outfile: Option<OutfileFn>,
    /// Global object the packer registers modules on
    pub scope: Option<String>,
    /// Print one `<source> -> <target>` line per written chunk
    pub verbose: bool,
    /// Create missing parent directories before writing
    pub create_dirs: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("write_to_dir", &self.write_to_dir)
            .field("get_outfile", &self.get_outfile.as_ref().map(|_| "<fn>"))
            .field("scope", &self.scope)
            .field("verbose", &self.verbose)
            .field("create_dirs", &self.create_dirs)
            .finish()
    }
}

impl Config {
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            write_to_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn custom(get_outfile: impl FnMut(&ModuleIdentity) -> String + 'static) -> Self {
        Self {
            get_outfile: Some(Box::new(get_outfile)),
            ..Self::default()
        }
    }

    /// Check that exactly one output option is set and extract it
    pub fn outfile_strategy(&mut self) -> Result<OutfileStrategy> {
        match (self.write_to_dir.take(), self.get_outfile.take()) {
            (Some(dir), None) => Ok(OutfileStrategy::Directory(dir)),
            (None, Some(get_outfile)) => Ok(OutfileStrategy::Custom(get_outfile)),
            (None, None) => Err(GlobalPackError::MissingOutput),
            (Some(dir), Some(get_outfile)) => {
                self.write_to_dir = Some(dir);
                self.get_outfile = Some(get_outfile);
                Err(GlobalPackError::ConflictingOutput)
            }
        }
    }
}

/// How target paths are derived
pub enum OutfileStrategy {
    /// `dir/<id>.js`, or `dir/<stem>.js` for absolute ids
    Directory(PathBuf),
    Custom(OutfileFn),
}

impl fmt::Debug for OutfileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(dir) => f.debug_tuple("Directory").field(dir).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Serializable configuration, merged layer by layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub write_to_dir: Option<PathBuf>,
    pub scope: Option<String>,
    pub verbose: Option<bool>,
    pub create_dirs: Option<bool>,
}

impl FileConfig {
    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GlobalPackError::InvalidConfigFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        toml::from_str(&content).map_err(|e| GlobalPackError::InvalidConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Values set in `other` win
    pub fn merge(&mut self, other: Self) {
        if other.write_to_dir.is_some() {
            self.write_to_dir = other.write_to_dir;
        }
        if other.scope.is_some() {
            self.scope = other.scope;
        }
        if other.verbose.is_some() {
            self.verbose = other.verbose;
        }
        if other.create_dirs.is_some() {
            self.create_dirs = other.create_dirs;
        }
    }

    /// Apply `GLOBALPACK_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("GLOBALPACK_WRITE_TO_DIR") {
            self.write_to_dir = Some(PathBuf::from(dir));
        }
        if let Some(scope) = lookup("GLOBALPACK_SCOPE") {
            self.scope = Some(scope);
        }
        if let Some(value) = lookup("GLOBALPACK_VERBOSE") {
            self.verbose = Some(parse_flag("GLOBALPACK_VERBOSE", &value)?);
        }
        if let Some(value) = lookup("GLOBALPACK_CREATE_DIRS") {
            self.create_dirs = Some(parse_flag("GLOBALPACK_CREATE_DIRS", &value)?);
        }
        Ok(())
    }

    /// Layer user config, project config (or `explicit`) and environment
    pub fn load(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config) = user_config_path().filter(|p| p.is_file()) {
            debug!("Loading user config from {}", user_config.display());
            config.merge(Self::from_file(&user_config)?);
        }

        let project_config = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(project_dir.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };
        if let Some(path) = project_config {
            debug!("Loading project config from {}", path.display());
            config.merge(Self::from_file(&path)?);
        }

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn into_config(self) -> Config {
        Config {
            write_to_dir: self.write_to_dir,
            get_outfile: None,
            scope: self.scope,
            verbose: self.verbose.unwrap_or(false),
            create_dirs: self.create_dirs.unwrap_or(false),
        }
    }
}

/// `<config dir>/globalpack/config.toml`, if a home directory is known
pub fn user_config_path() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("globalpack").join("config.toml"))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(GlobalPackError::InvalidEnvValue {
            name: name.to_owned(),
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_requires_an_output_option() {
        let err = Config::default().outfile_strategy().unwrap_err();
        assert!(matches!(err, GlobalPackError::MissingOutput));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_both_output_options() {
        let mut config = Config::custom(|_| "out.js".to_owned());
        config.write_to_dir = Some(PathBuf::from("foo"));
        let err = config.outfile_strategy().unwrap_err();
        assert!(matches!(err, GlobalPackError::ConflictingOutput));
        assert!(config.write_to_dir.is_some() && config.get_outfile.is_some());
    }

    #[test]
    fn test_extracts_directory_strategy() {
        let mut config = Config::directory("bundle");
        let strategy = config.outfile_strategy().unwrap();
        assert!(matches!(strategy, OutfileStrategy::Directory(ref dir) if dir == Path::new("bundle")));
    }

    #[test]
    fn test_reads_toml_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "write_to_dir = \"dist/modules\"\nscope = \"foo.bar\"\nverbose = true\n",
        )
        .unwrap();

        let config = FileConfig::from_file(&path).unwrap();
        assert_eq!(config.write_to_dir, Some(PathBuf::from("dist/modules")));
        assert_eq!(config.scope.as_deref(), Some("foo.bar"));
        assert_eq!(config.verbose, Some(true));
        assert_eq!(config.create_dirs, None);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "get_outfile = \"x\"\n").unwrap();

        let err = FileConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, GlobalPackError::InvalidConfigFile { .. }));
    }

    #[test]
    fn test_later_layers_win() {
        let mut base = FileConfig {
            write_to_dir: Some(PathBuf::from("a")),
            scope: Some("window.modules".to_owned()),
            ..FileConfig::default()
        };
        base.merge(FileConfig {
            scope: Some("app".to_owned()),
            verbose: Some(true),
            ..FileConfig::default()
        });
        assert_eq!(base.write_to_dir, Some(PathBuf::from("a")));
        assert_eq!(base.scope.as_deref(), Some("app"));
        assert_eq!(base.verbose, Some(true));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GLOBALPACK_WRITE_TO_DIR", "/tmp/out"),
            ("GLOBALPACK_VERBOSE", "yes"),
            ("GLOBALPACK_CREATE_DIRS", "0"),
        ]
        .into_iter()
        .collect();
        let mut config = FileConfig::default();
        config
            .apply_env(|name| env.get(name).map(|v| (*v).to_owned()))
            .unwrap();

        assert_eq!(config.write_to_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.verbose, Some(true));
        assert_eq!(config.create_dirs, Some(false));
        assert_eq!(config.scope, None);
    }

    #[test]
    fn test_env_rejects_garbage_flags() {
        let mut config = FileConfig::default();
        let err = config
            .apply_env(|name| (name == "GLOBALPACK_VERBOSE").then(|| "maybe".to_owned()))
            .unwrap_err();
        assert!(matches!(err, GlobalPackError::InvalidEnvValue { ref name, .. } if name == "GLOBALPACK_VERBOSE"));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(FileConfig::load(Some(&missing), temp.path()).is_err());
    }
}
