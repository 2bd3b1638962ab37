// Editing-session lock coordination.
//
// A lock has two halves. The durable half is a tag rendered into the file
// message's attachment list; it survives restarts and is readable by any
// process that can read the message. The ephemeral half is a short-lived
// guard that bridges the window while the tag write is still in flight, so
// near-simultaneous openers converge on one session key even before the tag
// is readable. Guards expire `GUARD_WINDOW_MS` after creation and are
// evicted lazily.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use charta_common::protocol::callback::CallbackBody;
use charta_common::protocol::lock_tag::LockTag;

use crate::error::GatewayError;
use crate::slack::{find_lock_tag, ChatApi, MessageAttachment};

/// How long an ephemeral guard outlives its creation, in milliseconds.
pub const GUARD_WINDOW_MS: i64 = 1500;

/// Identity of the message a guard protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardKey {
    pub file_id: String,
    pub message_ts: String,
}

/// An in-flight lock whose durable tag may not be readable yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardEntry {
    pub doc_key: String,
    pub owner_id: String,
    pub expires_at: DateTime<Utc>,
}

impl GuardEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Storage for in-flight lock guards.
///
/// The bundled implementation is process-local; this trait is the seam for
/// sharing guards across gateway instances.
pub trait GuardStore: Send + Sync {
    fn put(&self, key: GuardKey, entry: GuardEntry);
    /// Fetch a live guard. Expired entries are evicted on the way out.
    fn get(&self, key: &GuardKey, now: DateTime<Utc>) -> Option<GuardEntry>;
    fn remove(&self, key: &GuardKey);
    /// Drop every expired entry, returning how many went away.
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

/// `GuardStore` backed by a process-local map.
#[derive(Default)]
pub struct MemoryGuardStore {
    entries: Mutex<HashMap<GuardKey, GuardEntry>>,
}

impl MemoryGuardStore {
    fn entries(&self) -> MutexGuard<'_, HashMap<GuardKey, GuardEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GuardStore for MemoryGuardStore {
    fn put(&self, key: GuardKey, entry: GuardEntry) {
        self.entries().insert(key, entry);
    }

    fn get(&self, key: &GuardKey, now: DateTime<Utc>) -> Option<GuardEntry> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    fn remove(&self, key: &GuardKey) {
        self.entries().remove(key);
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(entries.len())
    }
}

/// Granted role for an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRole {
    /// First opener; the durable tag names this session.
    Owner,
    /// Joined a session someone else owns.
    CoEditor,
}

/// Outcome of a lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGrant {
    pub role: LockRole,
    /// Session key the editor must open with.
    pub doc_key: String,
    /// User the session belongs to.
    pub owner_id: String,
}

/// Parameters for a lock acquisition.
#[derive(Debug, Clone)]
pub struct LockRequest {
    /// Token authorized to read and rewrite the file's message.
    pub access_token: String,
    pub channel: String,
    pub file_id: String,
    pub message_ts: String,
    /// Whether the file's message is a thread reply.
    pub is_reply: bool,
    /// Key to establish if no lock exists yet.
    pub candidate_key: String,
    pub requester_id: String,
    /// `iat` of the requester's session token.
    pub issued_at: i64,
}

/// Token context for a lock release decision.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub access_token: String,
    pub channel: String,
    pub file_id: String,
    pub message_ts: String,
    pub is_reply: bool,
    /// Session key the caller's token names.
    pub doc_key: Option<String>,
    pub issued_at: i64,
    pub is_co_editor: bool,
}

/// Coordinates editing locks across the durable tag and the ephemeral guard.
pub struct LockCoordinator {
    chat: ChatApi,
    guards: Box<dyn GuardStore>,
}

impl LockCoordinator {
    pub fn new(chat: ChatApi, guards: Box<dyn GuardStore>) -> Self {
        Self { chat, guards }
    }

    /// Acquire the lock for a message, or join the session already holding
    /// it. Precedence: a well-formed durable tag wins, then a live guard,
    /// then the caller becomes the owner under `candidate_key`.
    ///
    /// A failed tag write is soft: the caller still gets ownership and the
    /// editor opens, covered by the guard until it lapses.
    pub async fn acquire_or_join(
        &self,
        req: LockRequest,
        now: DateTime<Utc>,
    ) -> Result<LockGrant, GatewayError> {
        self.guards.sweep(now);

        let snapshot = self
            .chat
            .message_snapshot(&req.access_token, &req.channel, &req.message_ts, req.is_reply)
            .await?
            .ok_or_else(|| GatewayError::FileResolution {
                file_id: req.file_id.clone(),
                source: anyhow::anyhow!(
                    "message `{}` not found in `{}`",
                    req.message_ts,
                    req.channel
                ),
            })?;
        let mut attachments = snapshot.attachments;

        if let Some((_, tag)) = find_lock_tag(&attachments) {
            debug!(file_id = %req.file_id, doc_key = %tag.doc_key, "joining tagged session");
            return Ok(LockGrant {
                role: LockRole::CoEditor,
                doc_key: tag.doc_key,
                owner_id: tag.owner_id,
            });
        }

        let key = GuardKey { file_id: req.file_id.clone(), message_ts: req.message_ts.clone() };
        if let Some(guard) = self.guards.get(&key, now) {
            debug!(file_id = %req.file_id, doc_key = %guard.doc_key, "joining guarded session");
            return Ok(LockGrant {
                role: LockRole::CoEditor,
                doc_key: guard.doc_key,
                owner_id: guard.owner_id,
            });
        }

        self.guards.put(
            key,
            GuardEntry {
                doc_key: req.candidate_key.clone(),
                owner_id: req.requester_id.clone(),
                expires_at: now + Duration::milliseconds(GUARD_WINDOW_MS),
            },
        );

        let tag = LockTag::new(req.candidate_key.clone(), req.issued_at, req.requester_id.clone());
        attachments.push(MessageAttachment::lock_banner(&tag));
        if let Err(source) = self
            .chat
            .update_attachments(&req.access_token, &req.channel, &req.message_ts, attachments)
            .await
        {
            let error = GatewayError::LockWrite(source);
            warn!(error = %error, file_id = %req.file_id, "durable lock tag write failed");
        }

        Ok(LockGrant {
            role: LockRole::Owner,
            doc_key: req.candidate_key,
            owner_id: req.requester_id,
        })
    }

    /// Remove the durable tag if the callback context is entitled to.
    ///
    /// Entitled means all of: terminal status, at most one participant left
    /// in the session, the token matches the tag by `iat` equality or
    /// co-editor standing, and the token's session key equals the tag's.
    /// Anything else leaves the tag in place and returns `Ok(false)`, so a
    /// second release of the same session is a no-op.
    pub async fn release(
        &self,
        req: ReleaseRequest,
        callback: &CallbackBody,
        now: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        self.guards.sweep(now);

        if !callback.status.is_terminal() || !callback.solo_participant() {
            return Ok(false);
        }

        let Some(snapshot) = self
            .chat
            .message_snapshot(&req.access_token, &req.channel, &req.message_ts, req.is_reply)
            .await?
        else {
            return Ok(false);
        };
        let mut attachments = snapshot.attachments;

        let Some((index, tag)) = find_lock_tag(&attachments) else {
            return Ok(false);
        };

        let entitled = req.issued_at == tag.issued_at || req.is_co_editor;
        if !entitled || req.doc_key.as_deref() != Some(tag.doc_key.as_str()) {
            debug!(file_id = %req.file_id, "token does not match the lock tag; leaving it");
            return Ok(false);
        }

        attachments.remove(index);
        if attachments.is_empty() {
            attachments.push(MessageAttachment::placeholder());
        }
        self.chat
            .update_attachments(&req.access_token, &req.channel, &req.message_ts, attachments)
            .await
            .map_err(GatewayError::LockWrite)?;

        self.guards
            .remove(&GuardKey { file_id: req.file_id.clone(), message_ts: req.message_ts.clone() });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use charta_common::protocol::callback::SessionStatus;

    use crate::slack::{MemoryChatApi, MessageSnapshot};

    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("timestamp should be valid")
    }

    async fn coordinator_with_message(
        attachments: Vec<MessageAttachment>,
    ) -> (LockCoordinator, MemoryChatApi) {
        let memory = MemoryChatApi::default();
        memory
            .seed_message("C1", MessageSnapshot { ts: "111.222".to_string(), attachments })
            .await;
        let chat = ChatApi::Memory(memory.clone());
        (LockCoordinator::new(chat, Box::new(MemoryGuardStore::default())), memory)
    }

    fn request(candidate_key: &str, requester_id: &str, issued_at: i64) -> LockRequest {
        LockRequest {
            access_token: "xoxp-author".to_string(),
            channel: "C1".to_string(),
            file_id: "F1".to_string(),
            message_ts: "111.222".to_string(),
            is_reply: false,
            candidate_key: candidate_key.to_string(),
            requester_id: requester_id.to_string(),
            issued_at,
        }
    }

    fn release_request(doc_key: &str, issued_at: i64, is_co_editor: bool) -> ReleaseRequest {
        ReleaseRequest {
            access_token: "xoxp-author".to_string(),
            channel: "C1".to_string(),
            file_id: "F1".to_string(),
            message_ts: "111.222".to_string(),
            is_reply: false,
            doc_key: Some(doc_key.to_string()),
            issued_at,
            is_co_editor,
        }
    }

    fn closed(users: &[&str]) -> CallbackBody {
        CallbackBody {
            key: "k1".to_string(),
            status: SessionStatus::Closed,
            url: None,
            users: Some(users.iter().map(|user| user.to_string()).collect()),
        }
    }

    #[tokio::test]
    async fn first_opener_becomes_owner_and_tags_the_message() {
        let (coordinator, memory) = coordinator_with_message(vec![]).await;

        let grant = coordinator
            .acquire_or_join(request("k1", "U1", 100), at(1_000))
            .await
            .expect("acquisition should succeed");

        assert_eq!(grant.role, LockRole::Owner);
        assert_eq!(grant.doc_key, "k1");
        assert_eq!(grant.owner_id, "U1");

        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert_eq!(message.attachments.len(), 1);
        let tag = message.attachments[0].lock_tag().expect("banner should carry a tag");
        assert_eq!(tag, LockTag::new("k1", 100, "U1"));
    }

    #[tokio::test]
    async fn existing_attachments_survive_the_tag_append() {
        let foreign =
            MessageAttachment { fallback: Some("a poll".to_string()), ..Default::default() };
        let (coordinator, memory) = coordinator_with_message(vec![foreign.clone()]).await;

        coordinator
            .acquire_or_join(request("k1", "U1", 100), at(1_000))
            .await
            .expect("acquisition should succeed");

        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[0], foreign);
    }

    #[tokio::test]
    async fn second_opener_joins_the_tagged_session() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, memory) = coordinator_with_message(vec![banner]).await;

        let grant = coordinator
            .acquire_or_join(request("k2", "U2", 200), at(1_000))
            .await
            .expect("acquisition should succeed");

        assert_eq!(grant.role, LockRole::CoEditor);
        assert_eq!(grant.doc_key, "k1");
        assert_eq!(grant.owner_id, "U1");

        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert_eq!(message.attachments.len(), 1, "joining must not add another tag");
    }

    #[tokio::test]
    async fn guard_bridges_the_window_while_the_tag_write_is_down() {
        let (coordinator, memory) = coordinator_with_message(vec![]).await;
        memory.fail_attachment_updates().await;

        let first = coordinator
            .acquire_or_join(request("k1", "U1", 100), at(1_000))
            .await
            .expect("acquisition should succeed despite the write failure");
        assert_eq!(first.role, LockRole::Owner);

        let second = coordinator
            .acquire_or_join(request("k2", "U2", 200), at(1_001))
            .await
            .expect("acquisition should succeed");
        assert_eq!(second.role, LockRole::CoEditor);
        assert_eq!(second.doc_key, "k1");
        assert_eq!(second.owner_id, "U1");
    }

    #[tokio::test]
    async fn guard_expires_after_its_window() {
        let (coordinator, memory) = coordinator_with_message(vec![]).await;
        memory.fail_attachment_updates().await;

        coordinator
            .acquire_or_join(request("k1", "U1", 100), at(1_000))
            .await
            .expect("acquisition should succeed");

        // Two seconds later the guard is gone and no durable tag was ever
        // written, so the next opener starts a fresh session.
        let late = coordinator
            .acquire_or_join(request("k2", "U2", 200), at(1_002))
            .await
            .expect("acquisition should succeed");
        assert_eq!(late.role, LockRole::Owner);
        assert_eq!(late.doc_key, "k2");
    }

    #[tokio::test]
    async fn malformed_tag_text_is_treated_as_absent() {
        let broken = MessageAttachment {
            fallback: Some("ONLYOFFICE Key : corrupted".to_string()),
            ..Default::default()
        };
        let (coordinator, memory) = coordinator_with_message(vec![broken]).await;

        let grant = coordinator
            .acquire_or_join(request("k1", "U1", 100), at(1_000))
            .await
            .expect("acquisition should succeed");

        assert_eq!(grant.role, LockRole::Owner);
        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert_eq!(message.attachments.len(), 2);
    }

    #[tokio::test]
    async fn release_removes_the_tag_and_leaves_a_placeholder() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, memory) = coordinator_with_message(vec![banner]).await;

        let released = coordinator
            .release(release_request("k1", 100, false), &closed(&["U1"]), at(2_000))
            .await
            .expect("release should succeed");

        assert!(released);
        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert_eq!(message.attachments.len(), 1);
        assert!(message.attachments[0].lock_tag().is_none());
        assert_eq!(message.attachments[0].fallback.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn release_keeps_other_attachments_without_a_placeholder() {
        let foreign =
            MessageAttachment { fallback: Some("a poll".to_string()), ..Default::default() };
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, memory) = coordinator_with_message(vec![foreign.clone(), banner]).await;

        let released = coordinator
            .release(release_request("k1", 100, false), &closed(&["U1"]), at(2_000))
            .await
            .expect("release should succeed");

        assert!(released);
        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert_eq!(message.attachments, vec![foreign]);
    }

    #[tokio::test]
    async fn release_needs_a_solo_participant() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, memory) = coordinator_with_message(vec![banner]).await;

        let released = coordinator
            .release(release_request("k1", 100, false), &closed(&["U1", "U2"]), at(2_000))
            .await
            .expect("release should succeed");

        assert!(!released);
        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert!(message.attachments[0].lock_tag().is_some());
    }

    #[tokio::test]
    async fn empty_participant_list_blocks_release() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, _memory) = coordinator_with_message(vec![banner]).await;

        let released = coordinator
            .release(release_request("k1", 100, false), &closed(&[]), at(2_000))
            .await
            .expect("release should succeed");

        assert!(!released);
    }

    #[tokio::test]
    async fn mismatched_iat_needs_co_editor_standing() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, _memory) = coordinator_with_message(vec![banner.clone()]).await;

        let stranger = coordinator
            .release(release_request("k1", 999, false), &closed(&["U1"]), at(2_000))
            .await
            .expect("release should succeed");
        assert!(!stranger);

        let co_editor = coordinator
            .release(release_request("k1", 999, true), &closed(&["U1"]), at(2_000))
            .await
            .expect("release should succeed");
        assert!(co_editor);
    }

    #[tokio::test]
    async fn mismatched_doc_key_blocks_release() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, memory) = coordinator_with_message(vec![banner]).await;

        let released = coordinator
            .release(release_request("another-key", 100, false), &closed(&["U1"]), at(2_000))
            .await
            .expect("release should succeed");

        assert!(!released);
        let message = memory.message("C1", "111.222").await.expect("message should exist");
        assert!(message.attachments[0].lock_tag().is_some());
    }

    #[tokio::test]
    async fn non_terminal_status_never_releases() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, _memory) = coordinator_with_message(vec![banner]).await;

        let editing = CallbackBody {
            key: "k1".to_string(),
            status: SessionStatus::Editing,
            url: None,
            users: Some(vec!["U1".to_string()]),
        };
        let released = coordinator
            .release(release_request("k1", 100, false), &editing, at(2_000))
            .await
            .expect("release should succeed");

        assert!(!released);
    }

    #[tokio::test]
    async fn releasing_twice_is_idempotent() {
        let banner = MessageAttachment::lock_banner(&LockTag::new("k1", 100, "U1"));
        let (coordinator, _memory) = coordinator_with_message(vec![banner]).await;

        let first = coordinator
            .release(release_request("k1", 100, false), &closed(&["U1"]), at(2_000))
            .await
            .expect("release should succeed");
        let second = coordinator
            .release(release_request("k1", 100, false), &closed(&["U1"]), at(2_001))
            .await
            .expect("release should succeed");

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn release_without_a_message_is_a_no_op() {
        let memory = MemoryChatApi::default();
        let coordinator = LockCoordinator::new(
            ChatApi::Memory(memory),
            Box::new(MemoryGuardStore::default()),
        );

        let released = coordinator
            .release(release_request("k1", 100, false), &closed(&["U1"]), at(2_000))
            .await
            .expect("release should succeed");
        assert!(!released);
    }

    // ── Guard store ─────────────────────────────────────────────────────────

    fn entry(doc_key: &str, expires_at: DateTime<Utc>) -> GuardEntry {
        GuardEntry { doc_key: doc_key.to_string(), owner_id: "U1".to_string(), expires_at }
    }

    fn key(file_id: &str) -> GuardKey {
        GuardKey { file_id: file_id.to_string(), message_ts: "1.2".to_string() }
    }

    #[test]
    fn live_guards_are_returned_until_their_deadline() {
        let store = MemoryGuardStore::default();
        store.put(key("F1"), entry("k1", at(1_000)));

        let live = store.get(&key("F1"), at(999)).expect("guard should be live before deadline");
        assert_eq!(live, entry("k1", at(1_000)));
        assert!(store.get(&key("F1"), at(1_000)).is_none());
    }

    #[test]
    fn expired_guards_are_evicted_by_get() {
        let store = MemoryGuardStore::default();
        store.put(key("F1"), entry("k1", at(1_000)));

        assert!(store.get(&key("F1"), at(1_001)).is_none());
        assert_eq!(store.sweep(at(1_001)), 0, "get should already have evicted the entry");
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = MemoryGuardStore::default();
        store.put(key("F1"), entry("k1", at(1_000)));
        store.put(key("F2"), entry("k2", at(2_000)));

        assert_eq!(store.sweep(at(1_500)), 1);
        assert!(store.get(&key("F2"), at(1_500)).is_some());
    }

    #[test]
    fn remove_discards_an_entry_outright() {
        let store = MemoryGuardStore::default();
        store.put(key("F1"), entry("k1", at(1_000)));
        store.remove(&key("F1"));

        assert!(store.get(&key("F1"), at(0)).is_none());
    }
}
