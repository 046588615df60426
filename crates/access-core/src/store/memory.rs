//! ============================================================================
//! In-Memory Store - Process-local subscription contract
//! ============================================================================
//! Mirrors the contract's rules (owner-only, single active delegate) so
//! resolution and rental flows can run without a node. Supports fault
//! injection for scan and confirmation tests.
//! ============================================================================

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::{StoreError, SubmissionId, SubmissionStatus, TokenStore};
use crate::clock::{Clock, SystemClock};
use crate::types::{Account, TokenId, TokenState};

#[derive(Debug)]
struct PendingAssignment {
    token_id: TokenId,
    delegate: Account,
    expires_at: i64,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct Inner {
    tokens: Vec<TokenState>,
    failing: HashSet<TokenId>,
    pending: HashMap<SubmissionId, PendingAssignment>,
    finished: HashMap<SubmissionId, SubmissionStatus>,
    reject_next: Option<String>,
    revert_next: Option<String>,
    unavailable: bool,
}

/// Thread-safe in-memory token store
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    /// Status polls answered `Pending` before a submission commits
    confirm_after_polls: u32,
    reads: AtomicU64,
    submissions: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryStore {
    /// Empty store; the clock decides whether an existing delegate is active
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            confirm_after_polls: 0,
            reads: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
        }
    }

    /// Keep submissions pending for `polls` status queries
    pub fn with_confirm_after_polls(mut self, polls: u32) -> Self {
        self.confirm_after_polls = polls;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    /// Mint the next token to `owner` and return its ID
    pub fn mint(&self, owner: Account, is_valid: bool) -> TokenId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.tokens.len() as TokenId;
        inner.tokens.push(TokenState {
            id,
            owner,
            is_valid,
            delegate: None,
            delegate_expires_at: 0,
        });
        id
    }

    /// Overwrite delegate fields directly, bypassing ownership checks
    pub fn set_delegate(&self, token_id: TokenId, delegate: Option<Account>, expires_at: i64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(t) = inner.tokens.get_mut(token_id as usize) {
            t.delegate = delegate;
            t.delegate_expires_at = expires_at;
        }
    }

    pub fn set_valid(&self, token_id: TokenId, is_valid: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(t) = inner.tokens.get_mut(token_id as usize) {
            t.is_valid = is_valid;
        }
    }

    /// Make every read of `token_id` fail with a transport error
    pub fn fail_reads(&self, token_id: TokenId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.failing.insert(token_id);
    }

    /// Make every call fail with a transport error
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.unavailable = unavailable;
    }

    /// Refuse the next submission outright
    pub fn reject_next_submission(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.reject_next = Some(reason.into());
    }

    /// Accept the next submission but revert it on inclusion
    pub fn revert_next_submission(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.revert_next = Some(reason.into());
    }

    /// Current state of a token, bypassing fault injection
    pub fn snapshot(&self, token_id: TokenId) -> Option<TokenState> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tokens.get(token_id as usize).cloned()
    }

    /// Number of remote reads served
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of assignment submissions received
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    fn read<T>(
        &self,
        token_id: TokenId,
        f: impl FnOnce(&TokenState) -> T,
    ) -> Result<T, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock()?;
        if inner.unavailable || inner.failing.contains(&token_id) {
            return Err(StoreError::Unavailable(format!(
                "connection reset reading token #{}",
                token_id
            )));
        }
        inner
            .tokens
            .get(token_id as usize)
            .map(f)
            .ok_or(StoreError::NotMinted(token_id))
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn total_issued(&self) -> Result<u64, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock()?;
        if inner.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(inner.tokens.len() as u64)
    }

    async fn owner_of(&self, token_id: TokenId) -> Result<Account, StoreError> {
        self.read(token_id, |t| t.owner.clone())
    }

    async fn is_valid(&self, token_id: TokenId) -> Result<bool, StoreError> {
        self.read(token_id, |t| t.is_valid)
    }

    async fn delegate_of(&self, token_id: TokenId) -> Result<Option<Account>, StoreError> {
        self.read(token_id, |t| t.delegate.clone())
    }

    async fn delegate_expires(&self, token_id: TokenId) -> Result<i64, StoreError> {
        self.read(token_id, |t| t.delegate_expires_at)
    }

    async fn submit_assignment(
        &self,
        caller: &Account,
        token_id: TokenId,
        delegate: &Account,
        expires_at: i64,
    ) -> Result<SubmissionId, StoreError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let mut inner = self.lock()?;

        if inner.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        if let Some(reason) = inner.reject_next.take() {
            return Err(StoreError::Rejected(reason));
        }

        let token = inner
            .tokens
            .get(token_id as usize)
            .ok_or(StoreError::NotMinted(token_id))?;
        if token.owner != *caller {
            return Err(StoreError::Rejected(format!(
                "caller {} is not owner of token #{}",
                caller, token_id
            )));
        }
        if token.has_active_delegate(now) {
            return Err(StoreError::Rejected(format!(
                "token #{} already has an active user",
                token_id
            )));
        }

        let id = SubmissionId(format!("0x{:064x}", n + 1));
        if let Some(reason) = inner.revert_next.take() {
            inner
                .finished
                .insert(id.clone(), SubmissionStatus::Reverted(reason));
            return Ok(id);
        }

        inner.pending.insert(
            id.clone(),
            PendingAssignment {
                token_id,
                delegate: delegate.clone(),
                expires_at,
                polls_left: self.confirm_after_polls,
            },
        );
        debug!("Accepted assignment {} for token #{}", id, token_id);
        Ok(id)
    }

    async fn assignment_status(&self, id: &SubmissionId) -> Result<SubmissionStatus, StoreError> {
        let mut inner = self.lock()?;
        if inner.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        if let Some(status) = inner.finished.get(id) {
            return Ok(status.clone());
        }

        let pending = inner
            .pending
            .get_mut(id)
            .ok_or_else(|| StoreError::Unavailable(format!("unknown submission {}", id)))?;
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(SubmissionStatus::Pending);
        }

        if let Some(p) = inner.pending.remove(id) {
            if let Some(t) = inner.tokens.get_mut(p.token_id as usize) {
                t.delegate = Some(p.delegate);
                t.delegate_expires_at = p.expires_at;
            }
        }
        inner.finished.insert(id.clone(), SubmissionStatus::Committed);
        Ok(SubmissionStatus::Committed)
    }
}
