// 任务注册表
//
// 维护会话任务 ID 到对外任务 ID、响应体缓冲区的映射，
// 以及对外任务 ID 的单调递增序号。
// 所有读写都可能来自不同的回调上下文，结构层面的增删由 DashMap 保证并发安全；
// 同一任务的回调由传输会话串行派发，因此条目内部不需要额外加锁。

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// 任务注册表
///
/// 条目在任务进入终止状态时一次性移除，移除后不再发生任何写入
#[derive(Debug, Default)]
pub struct TaskRegistry {
    /// runtime_id -> 对外任务 ID
    public_ids: DashMap<u64, String>,
    /// runtime_id -> 响应体缓冲区（只追加）
    response_bodies: DashMap<u64, Vec<u8>>,
    /// 对外任务 ID 序号
    next_public_seq: AtomicU64,
}

impl TaskRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配下一个对外任务 ID（从 "0" 开始的十进制序号）
    pub fn mint_public_id(&self) -> String {
        self.next_public_seq.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// 登记任务
    ///
    /// 必须在任务启动之前调用，保证任何回调都能查到对外任务 ID
    pub fn register(&self, runtime_id: u64, public_id: String) {
        self.public_ids.insert(runtime_id, public_id);
    }

    /// 查询对外任务 ID
    pub fn public_id_of(&self, runtime_id: u64) -> Option<String> {
        self.public_ids.get(&runtime_id).map(|id| id.clone())
    }

    /// 追加响应体数据
    ///
    /// 空数据直接忽略；未见过的 runtime_id 会按需创建缓冲区
    pub fn append_response(&self, runtime_id: u64, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.response_bodies
            .entry(runtime_id)
            .or_default()
            .extend_from_slice(chunk);
    }

    /// 终结任务，取出并移除其全部记录
    ///
    /// 返回 (对外任务 ID, 响应体)。重复调用返回 (None, None)
    pub fn finish(&self, runtime_id: u64) -> (Option<String>, Option<Vec<u8>>) {
        let public_id = self.public_ids.remove(&runtime_id).map(|(_, id)| id);
        let body = self.response_bodies.remove(&runtime_id).map(|(_, buf)| buf);
        (public_id, body)
    }

    /// 当前登记的任务数
    pub fn len(&self) -> usize {
        self.public_ids.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.public_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_mint_sequence() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.mint_public_id(), "0");
        assert_eq!(registry.mint_public_id(), "1");
        assert_eq!(registry.mint_public_id(), "2");
    }

    #[test]
    fn test_mint_concurrent_unique() {
        let registry = Arc::new(TaskRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let r = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| r.mint_public_id()).collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "序号不应重复");
            }
        }
        assert_eq!(all.len(), 800);
    }

    #[test]
    fn test_register_and_finish() {
        let registry = TaskRegistry::new();
        registry.register(7, "abc".to_string());
        assert_eq!(registry.public_id_of(7), Some("abc".to_string()));

        registry.append_response(7, b"hello");
        registry.append_response(7, b" world");

        let (public_id, body) = registry.finish(7);
        assert_eq!(public_id, Some("abc".to_string()));
        assert_eq!(body, Some(b"hello world".to_vec()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finish_twice_is_empty() {
        let registry = TaskRegistry::new();
        registry.register(1, "t".to_string());
        let _ = registry.finish(1);

        let (public_id, body) = registry.finish(1);
        assert_eq!(public_id, None);
        assert_eq!(body, None);
    }

    #[test]
    fn test_append_creates_buffer_lazily() {
        let registry = TaskRegistry::new();
        // runtime_id 尚未登记也能累积响应体
        registry.append_response(9, b"xy");
        let (public_id, body) = registry.finish(9);
        assert_eq!(public_id, None);
        assert_eq!(body, Some(b"xy".to_vec()));
    }

    #[test]
    fn test_append_ignores_empty_chunk() {
        let registry = TaskRegistry::new();
        registry.register(3, "t".to_string());
        registry.append_response(3, b"");
        let (_, body) = registry.finish(3);
        assert_eq!(body, None);
    }
}
