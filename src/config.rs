use crate::assembler::{ScriptSettings, DEFAULT_TEMPLATE_FALLBACK, DEFAULT_TEMPLATE_PREFERENCE_KEY};
use crate::executor::{ExecutorSettings, DEFAULT_INTERPRETER, DEFAULT_INTERPRETER_ARGS};
use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,
    #[serde(default = "default_template_fallback")]
    pub template_fallback: String,
    #[serde(default = "default_template_preference_key")]
    pub template_preference_key: u32,
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    #[serde(default = "default_script_bom")]
    pub script_bom: bool,
}

fn default_interpreter() -> String {
    DEFAULT_INTERPRETER.to_string()
}

fn default_interpreter_args() -> Vec<String> {
    DEFAULT_INTERPRETER_ARGS.iter().map(|s| s.to_string()).collect()
}

fn default_template_fallback() -> String {
    DEFAULT_TEMPLATE_FALLBACK.to_string()
}

fn default_template_preference_key() -> u32 {
    DEFAULT_TEMPLATE_PREFERENCE_KEY
}

fn default_script_bom() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            template_fallback: default_template_fallback(),
            template_preference_key: default_template_preference_key(),
            run_timeout_secs: None,
            script_bom: default_script_bom(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment variables, or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from_path(&config_path).unwrap_or_else(|_| {
            info!("No config file found, using defaults");
            Self::default()
        });

        // Environment variables override config file
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        } else {
            Err(anyhow!("Config file not found"))
        }
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(interpreter) = var("FORGEAI_INTERPRETER") {
            self.interpreter = interpreter;
        }

        if let Some(template) = var("FORGEAI_TEMPLATE") {
            self.template_fallback = template;
        }

        if let Some(secs) = var("FORGEAI_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.run_timeout_secs = Some(secs),
                Err(_) => warn!("Ignoring FORGEAI_TIMEOUT_SECS={:?}: not a number of seconds", secs),
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::get_config_path()?)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.toml"))
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let home = home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".forgeai"))
    }

    /// Set the interpreter path and save config
    pub fn set_interpreter(&mut self, interpreter: String) -> Result<()> {
        self.interpreter = interpreter;
        self.save()?;
        info!("Interpreter saved to config file");
        Ok(())
    }

    pub fn script_settings(&self) -> ScriptSettings {
        ScriptSettings {
            template_preference_key: self.template_preference_key,
            template_fallback: self.template_fallback.clone(),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            interpreter: self.interpreter.clone(),
            interpreter_args: self.interpreter_args.clone(),
            timeout: self.run_timeout_secs.map(Duration::from_secs),
            write_bom: self.script_bom,
        }
    }

    pub fn show_config_info() -> Result<()> {
        let config_path = Self::get_config_path()?;
        println!("Configuration file: {}", config_path.display());

        if config_path.exists() {
            println!("Status: Found");
        } else {
            println!("Status: Not found (using defaults)");
        }

        let config = Self::load()?;
        println!("Interpreter: {}", config.interpreter);
        println!("Interpreter args: {}", config.interpreter_args.join(" "));
        println!("Template fallback: {}", config.template_fallback);
        println!("Template preference key: {}", config.template_preference_key);
        match config.run_timeout_secs {
            Some(secs) => println!("Run timeout: {}s", secs),
            None => println!("Run timeout: none"),
        }

        println!("\nTo set the interpreter:");
        println!("  forge --set-interpreter <path>");
        println!("\nOr set environment variable:");
        println!("  export FORGEAI_INTERPRETER=<path>");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str("run_timeout_secs = 90\n").unwrap();
        assert_eq!(config.run_timeout_secs, Some(90));
        assert_eq!(config.interpreter, DEFAULT_INTERPRETER);
        assert_eq!(config.template_preference_key, DEFAULT_TEMPLATE_PREFERENCE_KEY);
        assert!(config.script_bom);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            interpreter: "pwsh".to_string(),
            run_timeout_secs: Some(30),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_path(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FORGEAI_INTERPRETER", "/usr/bin/pwsh"),
            ("FORGEAI_TEMPLATE", r"D:\part.prtdot"),
            ("FORGEAI_TIMEOUT_SECS", "15"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.interpreter, "/usr/bin/pwsh");
        assert_eq!(config.template_fallback, r"D:\part.prtdot");
        assert_eq!(config.run_timeout_secs, Some(15));
    }

    #[test]
    fn test_invalid_timeout_override_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| {
            (key == "FORGEAI_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.run_timeout_secs, None);
    }

    #[test]
    fn test_settings_conversion() {
        let config = Config {
            run_timeout_secs: Some(5),
            script_bom: false,
            ..Config::default()
        };

        let executor = config.executor_settings();
        assert_eq!(executor.timeout, Some(Duration::from_secs(5)));
        assert!(!executor.write_bom);
        assert_eq!(executor.interpreter_args, default_interpreter_args());

        let script = config.script_settings();
        assert_eq!(script, ScriptSettings::default());
    }
}
