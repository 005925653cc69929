// ==========================================
// 生产派工核心 - 按键串行锁
// ==========================================
// 用途:
// - (物料, 工序, 销售行) 级别的工序卡申请串行化
// - 工位级别的时段 检查-登记 串行化
// ==========================================

use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// 按键串行锁
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 在给定键上执行闭包 (同键串行, 异键并行)
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(key);
        // 持锁线程 panic 后锁仍可用
        let _guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }

    /// 同时持有多个键 (排序去重后依次加锁, 避免交叉等待)
    pub fn with_locks<T>(&self, keys: &[String], f: impl FnOnce() -> T) -> T {
        let mut ordered: Vec<&String> = keys.iter().collect();
        ordered.sort();
        ordered.dedup();
        let slots: Vec<Arc<Mutex<()>>> = ordered.iter().map(|k| self.slot(k)).collect();
        let _guards: Vec<_> = slots
            .iter()
            .map(|s| s.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect();
        f()
    }

    /// 组合键
    pub fn key(parts: &[&str]) -> String {
        parts.join("\u{1f}")
    }

    /// 已登记的键数量
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock("WS-1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_multi_key_excludes_single_key_holders() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    let body = || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    };
                    if i % 2 == 0 {
                        locks.with_locks(&["WS-2".to_string(), "WS-1".to_string(), "WS-2".to_string()], body)
                    } else {
                        locks.with_lock("WS-1", body)
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_key_joins_parts() {
        assert_ne!(KeyedLocks::key(&["a", "bc"]), KeyedLocks::key(&["ab", "c"]));
    }
}
