/// 永続化スナップショットストレージモジュール
///
/// キーごとにJSON値を保存する単純なキーバリューストア。
/// 認証セッションのスナップショット（ユーザー・トークン・認証済みフラグ）の
/// 保存先として使用する。
use crate::shared::errors::{AppError, AppResult};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// キーバリュー形式の永続化ストア
pub trait SnapshotStore: Send + Sync {
    /// キーに対応する値を読み込む
    fn load(&self, key: &str) -> AppResult<Option<Value>>;

    /// キーに値を保存する
    fn save(&self, key: &str, value: Value) -> AppResult<()>;

    /// キーを削除する
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// 型付きでスナップショットを読み込む
///
/// 保存値が期待する形式でない場合はエラー
pub fn load_snapshot<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    key: &str,
) -> AppResult<Option<T>> {
    match store.load(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// 型付きでスナップショットを保存する
pub fn save_snapshot<T: Serialize>(store: &dyn SnapshotStore, key: &str, value: &T) -> AppResult<()> {
    store.save(key, serde_json::to_value(value)?)
}

/// JSONファイルに保存するストア
///
/// ファイル全体を1つのJSONオブジェクトとして扱い、書き込みのたびに
/// 一時ファイル経由で置き換える
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl FileSnapshotStore {
    /// ファイルを開く（存在しない場合は空のストアとして扱う）
    ///
    /// # 引数
    /// * `path` - スナップショットファイルのパス
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&contents)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(AppError::storage(format!(
                            "スナップショットファイルの形式が不正です: {}",
                            path.display()
                        )))
                    }
                }
            }
        } else {
            Map::new()
        };

        log::debug!(
            "スナップショットストアを開きました: path={}, keys={}",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// ファイルパスを取得
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &Map<String, Value>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                log::info!("スナップショットディレクトリを作成しました: {}", parent.display());
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, key: &str) -> AppResult<Option<Value>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: Value) -> AppResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        self.flush(&entries)?;

        log::debug!("スナップショットを保存しました: key={key}");
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
            log::debug!("スナップショットを削除しました: key={key}");
        }
        Ok(())
    }
}

/// メモリ上のストア（テスト・永続化不要な環境用）
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &str) -> AppResult<Option<Value>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: Value) -> AppResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}
