//! 공유 정책 스냅샷
//!
//! 조회 루프가 유일한 writer, 수집 루프가 reader입니다.
//! 스냅샷은 불변 객체이며 `Arc`째로 교체됩니다. 쓰기 락은 포인터를 바꾸는 순간에만 잡습니다.
//!
//! 핸들은 필터 반영 세대도 함께 들고 있습니다. 반영은 체인을 비우므로 세대가 바뀌면
//! 라이브 카운터가 0부터 다시 쌓입니다. 수집 루프는 세대를 보고 증분 기준값을 버립니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use befw_core::types::{AddressList, PolicyDocument, Rule};

/// 테넌트의 현재 정책
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub tenant: String,
    pub rules: Vec<Rule>,
    /// 보관만 하고 엔진에는 반영하지 않음
    pub address_lists: Vec<AddressList>,
}

impl PolicySnapshot {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<PolicyDocument> for PolicySnapshot {
    fn from(doc: PolicyDocument) -> Self {
        Self {
            tenant: doc.tenant,
            rules: doc.rules,
            address_lists: doc.address_lists,
        }
    }
}

/// 시작/종료된 반영 횟수. 항상 `finished <= started`
#[derive(Debug, Default)]
struct ApplyEpoch {
    started: AtomicU64,
    finished: AtomicU64,
}

/// 진행 중인 반영 표시. 드롭되면 반영이 끝난 것으로 기록합니다.
#[must_use = "the apply is marked finished as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ApplyGuard {
    epoch: Arc<ApplyEpoch>,
}

impl Drop for ApplyGuard {
    fn drop(&mut self) {
        self.epoch.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// 여러 태스크가 공유하는 스냅샷 핸들
#[derive(Debug, Clone, Default)]
pub struct SharedSnapshot {
    inner: Arc<RwLock<Arc<PolicySnapshot>>>,
    epoch: Arc<ApplyEpoch>,
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 스냅샷을 반환합니다. 읽기 락은 `Arc` 복제 동안만 유지됩니다.
    pub fn load(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.inner.read())
    }

    /// 스냅샷을 교체하고 새 스냅샷을 반환합니다.
    pub fn replace(&self, snapshot: PolicySnapshot) -> Arc<PolicySnapshot> {
        let next = Arc::new(snapshot);
        *self.inner.write() = Arc::clone(&next);
        next
    }

    /// 스냅샷 교체와 필터 반영을 시작합니다. 반환된 guard가 살아 있는 동안은
    /// [`settled_epoch`](Self::settled_epoch)가 `None`입니다.
    pub fn begin_apply(&self) -> ApplyGuard {
        self.epoch.started.fetch_add(1, Ordering::SeqCst);
        ApplyGuard {
            epoch: Arc::clone(&self.epoch),
        }
    }

    /// 진행 중인 반영이 없으면 지금까지 시작된 반영 횟수를 반환합니다.
    ///
    /// 두 번 읽은 값이 같으면 그 사이에 체인이 비워지지 않았습니다.
    pub fn settled_epoch(&self) -> Option<u64> {
        // finished를 먼저 읽어야 started == finished가 한 시점의 상태를 뜻함
        let finished = self.epoch.finished.load(Ordering::SeqCst);
        let started = self.epoch.started.load(Ordering::SeqCst);
        (started == finished).then_some(started)
    }
}
