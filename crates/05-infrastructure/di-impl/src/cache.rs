//! 计算缓存
//!
//! 每个键最多发布一个值。值由按键加锁的惰性容器保存：并发首次访问时只有
//! 一个线程执行计算，其它线程等待并读取结果；同一线程上的嵌套计算可以重入，
//! 独立计算而不会死锁。计算失败不会写入缓存，下一次调用会重试。

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

struct LazyValue<V> {
    lock: ReentrantMutex<()>,
    value: OnceCell<V>,
}

impl<V: Clone> LazyValue<V> {
    fn new() -> Self {
        Self {
            lock: ReentrantMutex::new(()),
            value: OnceCell::new(),
        }
    }

    fn get(&self) -> Option<V> {
        self.value.get().cloned()
    }
}

/// 并发计算缓存
pub struct ComputingCache<K, V> {
    map: DashMap<K, Arc<LazyValue<V>>>,
}

impl<K, V> ComputingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    fn slot(&self, key: &K) -> Arc<LazyValue<V>> {
        if let Some(slot) = self.map.get(key) {
            return Arc::clone(slot.value());
        }
        let slot = self
            .map
            .entry(key.clone())
            .or_insert_with(|| Arc::new(LazyValue::new()));
        Arc::clone(slot.value())
    }

    /// 获取值，不存在时计算并缓存
    pub fn get_or_compute(&self, key: &K, compute: impl FnOnce(&K) -> V) -> V {
        match self.try_get_or_compute::<std::convert::Infallible>(key, |key| Ok(compute(key))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// 获取值，不存在时计算；计算失败时返回错误且不缓存
    pub fn try_get_or_compute<E>(
        &self,
        key: &K,
        compute: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<V, E> {
        let slot = self.slot(key);
        if let Some(value) = slot.get() {
            return Ok(value);
        }
        let guard = slot.lock.lock();
        if let Some(value) = slot.get() {
            return Ok(value);
        }
        if !self.is_current(key, &slot) {
            // 持锁期间前一次计算失败并移除了槽位，换到当前槽位重试
            drop(guard);
            return self.try_get_or_compute(key, compute);
        }
        match compute(key) {
            // 重入计算可能已经先发布了值，保留先发布者
            Ok(computed) => Ok(slot.value.get_or_init(|| computed).clone()),
            Err(e) => {
                // 仍然持锁，等待者醒来后会发现槽位已失效
                self.map.remove_if(key, |_, current| {
                    Arc::ptr_eq(current, &slot) && current.get().is_none()
                });
                Err(e)
            }
        }
    }

    fn is_current(&self, key: &K, slot: &Arc<LazyValue<V>>) -> bool {
        self.map
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current.value(), slot))
    }

    /// 获取已计算的值
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.map.get(key).and_then(|slot| slot.value().get())
    }

    /// 移除并返回已计算的值
    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).and_then(|(_, slot)| slot.get())
    }

    /// 移除全部条目并返回已计算的值
    pub fn drain(&self) -> Vec<(K, V)> {
        let keys: Vec<K> = self.map.iter().map(|entry| entry.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| {
                self.map
                    .remove(&key)
                    .and_then(|(key, slot)| slot.get().map(|value| (key, value)))
            })
            .collect()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    /// 遍历所有已计算的值
    pub fn for_each(&self, mut action: impl FnMut(&K, &V)) {
        for entry in self.map.iter() {
            if let Some(value) = entry.value().value.get() {
                action(entry.key(), value);
            }
        }
    }

    /// 所有已计算的值
    pub fn values(&self) -> Vec<V> {
        self.map
            .iter()
            .filter_map(|entry| entry.value().get())
            .collect()
    }

    /// 已计算的值的数量
    pub fn len(&self) -> usize {
        self.map
            .iter()
            .filter(|entry| entry.value().value.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for ComputingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ComputingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputingCache")
            .field("entries", &self.len())
            .finish()
    }
}
