//! 持久化设置存储 - 基础设施层
//!
//! 一个 JSON 文件上的键值存储，每次写入都会整体落盘。
//! 凭据、科目和开关另有带类型的读写方法，CLI 与会话都只通过它们读写。

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::{CourseQuery, Credential, MacroConfig};

/// 存储键
pub mod keys {
    pub const CREDENTIAL: &str = "credential";
    pub const DARK_THEME: &str = "theme.dark";
    pub const FAST_ACCESS: &str = "fastAccess";
    pub const BYPASS_MODE: &str = "bypassMode";
    pub const SUBJECTS: &str = "subjects";
    pub const SAVE_LOGIN: &str = "saveLogin";

    /// 可以通过 `flags` 子命令读写的布尔开关
    pub const FLAGS: [&str; 4] = [DARK_THEME, FAST_ACCESS, BYPASS_MODE, SAVE_LOGIN];
}

/// 设置存储
pub struct SettingsStore {
    path: PathBuf,
    values: RwLock<Map<String, JsonValue>>,
}

impl SettingsStore {
    /// 打开存储文件，文件不存在时视为空存储
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content).map_err(|source| StoreError::Json {
                    key: path.display().to_string(),
                    source,
                })?
            }
        } else {
            debug!("设置文件不存在，使用空存储: {}", path.display());
            Map::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取键值，不存在或格式不符时返回默认值
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        match values.get(key) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("设置项 {} 格式错误，使用默认值: {}", key, e);
                    default
                }
            },
            None => default,
        }
    }

    /// 写入键值并落盘，后写覆盖先写
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), StoreError> {
        let json = serde_json::to_value(value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), json);
        self.persist(&values)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// 删除键值并落盘
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let existed = values.remove(key).is_some();
        if existed {
            self.persist(&values)?;
        }
        Ok(existed)
    }

    // ========== 凭据 / 科目 / 开关 ==========

    pub fn credential(&self) -> Option<Credential> {
        self.get(keys::CREDENTIAL, None)
    }

    pub fn set_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.set(keys::CREDENTIAL, credential)?;
        info!("🔑 已保存凭据: {}", credential.masked_identifier());
        Ok(())
    }

    /// 返回是否确实删除了已保存的凭据
    pub fn reset_credential(&self) -> Result<bool, StoreError> {
        let removed = self.remove(keys::CREDENTIAL)?;
        if removed {
            info!("🗑️ 已清除凭据");
        }
        Ok(removed)
    }

    pub fn subjects(&self) -> Vec<CourseQuery> {
        self.get(keys::SUBJECTS, Vec::new())
    }

    pub fn set_subjects(&self, subjects: &[CourseQuery]) -> Result<(), StoreError> {
        self.set(keys::SUBJECTS, subjects)?;
        info!("📚 科目列表已更新，共 {} 个", subjects.len());
        Ok(())
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key, false)
    }

    pub fn set_flag(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.set(key, value)?;
        info!("✓ {} = {}", key, value);
        Ok(())
    }

    /// 由科目列表和 `fastAccess` / `bypassMode` 组成的宏配置
    pub fn macro_config(&self) -> MacroConfig {
        MacroConfig {
            subjects: self.subjects(),
            fast_mode: self.flag(keys::FAST_ACCESS),
            bypass_mode: self.flag(keys::BYPASS_MODE),
        }
    }

    fn persist(&self, values: &Map<String, JsonValue>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(values).map_err(|source| StoreError::Json {
            key: self.path.display().to_string(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_get_returns_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json")).unwrap();
        assert!(!store.has(keys::FAST_ACCESS));
        assert!(!store.get(keys::FAST_ACCESS, false));
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        {
            let store = SettingsStore::open(&path).unwrap();
            assert_ok!(store.set(keys::CREDENTIAL, Credential::new("2020123456", "pw")));
            assert_ok!(store.set(keys::SUBJECTS, vec![CourseQuery::new("COSE101", "")]));
            assert_ok!(store.set(keys::BYPASS_MODE, true));
        }

        let store = SettingsStore::open(&path).unwrap();
        let credential: Option<Credential> = store.get(keys::CREDENTIAL, None);
        assert_eq!(credential, Some(Credential::new("2020123456", "pw")));
        let subjects: Vec<CourseQuery> = store.get(keys::SUBJECTS, Vec::new());
        assert_eq!(subjects.len(), 1);
        assert!(store.get(keys::BYPASS_MODE, false));
    }

    #[test]
    fn test_last_write_wins_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("s.json")).unwrap();
        store.set(keys::SAVE_LOGIN, true).unwrap();
        store.set(keys::SAVE_LOGIN, false).unwrap();
        assert!(!store.get(keys::SAVE_LOGIN, true));

        assert!(store.remove(keys::SAVE_LOGIN).unwrap());
        assert!(!store.has(keys::SAVE_LOGIN));
        assert!(!store.remove(keys::SAVE_LOGIN).unwrap());
    }

    #[test]
    fn test_typed_accessors_share_one_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("s.json")).unwrap();

        assert_ok!(store.set_credential(&Credential::new("2020123456", "pw")));
        assert_ok!(store.set_subjects(&[CourseQuery::new("COSE101", "")]));
        assert_ok!(store.set_flag(keys::FAST_ACCESS, true));

        let config = store.macro_config();
        assert_eq!(config.subjects, vec![CourseQuery::new("COSE101", "")]);
        assert!(config.fast_mode);
        assert!(!config.bypass_mode);
        assert_eq!(store.credential(), Some(Credential::new("2020123456", "pw")));

        assert!(store.reset_credential().unwrap());
        assert_eq!(store.credential(), None);
        assert!(!store.reset_credential().unwrap());
    }

    #[test]
    fn test_wrong_type_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("s.json")).unwrap();
        store.set(keys::FAST_ACCESS, "yes").unwrap();
        assert!(!store.get(keys::FAST_ACCESS, false));
    }
}
