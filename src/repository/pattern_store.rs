// ==========================================
// 门店服务评级系统 - 基线存储接口
// ==========================================
// 职责: 定义基线 key→value 存储契约 + 内存实现
// 红线: 所有操作返回显式 Result,不 panic
// 红线: PatternManager 只依赖此 trait,不依赖具体存储
// ==========================================

use crate::domain::pattern::{ClearScope, PatternFilter, PatternRecord};
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::collections::BTreeMap;
use std::sync::RwLock;

// ==========================================
// PatternStore Trait
// ==========================================
// 实现者:
// - InMemoryPatternStore（测试 / 本地缓存）
// - SqlitePatternStore（持久化）
pub trait PatternStore<P: PatternRecord>: Send + Sync {
    /// 按键读取
    fn get(&self, key: &P::Key) -> RepositoryResult<Option<P>>;

    /// 仅插入；键已存在返回 DuplicateKey
    fn save(&self, pattern: &P) -> RepositoryResult<()>;

    /// 仅更新；键不存在返回 NotFound
    fn update(&self, pattern: &P) -> RepositoryResult<()>;

    /// 插入或替换
    fn upsert(&self, pattern: &P) -> RepositoryResult<()>;

    /// 删除；返回是否实际删除
    fn delete(&self, key: &P::Key) -> RepositoryResult<bool>;

    /// 按过滤条件列出（按键排序）
    fn list(&self, filter: &PatternFilter) -> RepositoryResult<Vec<P>>;

    /// 按范围清理；返回删除条数
    fn clear(&self, scope: &ClearScope) -> RepositoryResult<usize>;
}

// ==========================================
// InMemoryPatternStore - 内存存储
// ==========================================
pub struct InMemoryPatternStore<P: PatternRecord> {
    entries: RwLock<BTreeMap<P::Key, P>>,
}

impl<P: PatternRecord> InMemoryPatternStore<P> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> RepositoryResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> RepositoryResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> RepositoryResult<std::sync::RwLockReadGuard<'_, BTreeMap<P::Key, P>>> {
        self.entries
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn write(&self) -> RepositoryResult<std::sync::RwLockWriteGuard<'_, BTreeMap<P::Key, P>>> {
        self.entries
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl<P: PatternRecord> Default for InMemoryPatternStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PatternRecord> PatternStore<P> for InMemoryPatternStore<P> {
    fn get(&self, key: &P::Key) -> RepositoryResult<Option<P>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn save(&self, pattern: &P) -> RepositoryResult<()> {
        let mut entries = self.write()?;
        if entries.contains_key(pattern.key()) {
            return Err(RepositoryError::DuplicateKey {
                entity: "Pattern".to_string(),
                key: pattern.key().to_string(),
            });
        }
        entries.insert(pattern.key().clone(), pattern.clone());
        Ok(())
    }

    fn update(&self, pattern: &P) -> RepositoryResult<()> {
        let mut entries = self.write()?;
        match entries.get_mut(pattern.key()) {
            Some(slot) => {
                *slot = pattern.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: "Pattern".to_string(),
                key: pattern.key().to_string(),
            }),
        }
    }

    fn upsert(&self, pattern: &P) -> RepositoryResult<()> {
        self.write()?.insert(pattern.key().clone(), pattern.clone());
        Ok(())
    }

    fn delete(&self, key: &P::Key) -> RepositoryResult<bool> {
        Ok(self.write()?.remove(key).is_some())
    }

    fn list(&self, filter: &PatternFilter) -> RepositoryResult<Vec<P>> {
        Ok(self
            .read()?
            .iter()
            .filter(|(key, _)| filter.matches(*key))
            .map(|(_, pattern)| pattern.clone())
            .collect())
    }

    fn clear(&self, scope: &ClearScope) -> RepositoryResult<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|key, _| !scope.contains(key));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::{Pattern, PatternKey, PatternStats};
    use crate::domain::types::ServiceCategory;
    use std::sync::Arc;

    #[test]
    fn test_poisoned_lock_reports_lock_error() {
        let store = Arc::new(InMemoryPatternStore::<Pattern>::new());
        let ts = chrono::NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let pattern = Pattern::from_parts(
            PatternKey::new("R001", ServiceCategory::Lobby, 12, 0),
            PatternStats::observed(12.0, 1, 0.95, ts),
        );
        store.save(&pattern).unwrap();
        assert_eq!(store.len().unwrap(), 1);

        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("poison");
        })
        .join();

        assert!(matches!(store.len(), Err(RepositoryError::LockError(_))));
        assert!(matches!(store.is_empty(), Err(RepositoryError::LockError(_))));
        assert!(matches!(store.get(&pattern.key), Err(RepositoryError::LockError(_))));
    }
}
