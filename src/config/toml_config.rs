use crate::config::RelayConfig;
use crate::utils::error::{RelayError, Result};
use regex::Regex;
use std::path::Path;

impl RelayConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_toml_str_with(content, |name| std::env::var(name).ok())
    }

    pub(crate) fn from_toml_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let processed_content = substitute_env_vars(content, lookup)?;

        toml::from_str(&processed_content).map_err(|e| RelayError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }
}

/// 替換環境變數 (例如 ${RELAY_SHARED_SECRET})；未定義的變數視為錯誤，避免把字面值當成密鑰
fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| RelayError::ConfigError {
        message: format!("Invalid substitution pattern: {}", e),
    })?;

    let mut missing = Vec::new();
    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match lookup(var_name) {
            Some(value) => value,
            None => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if let Some(var_name) = missing.into_iter().next() {
        return Err(RelayError::MissingConfigError { field: var_name });
    }

    Ok(result.into_owned())
}
