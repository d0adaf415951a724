//! In-memory bulletin service for tests.
//!
//! A single [`MemoryBulletin`] is shared by every engine in a test; clones
//! point at the same boards. Fault injection fails the next N sends so
//! tests can drive the retry paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gossip_types::{Seeker, UserId};

use crate::{BoardItem, BoardMessage, Bulletin, Result, TransportError};

#[derive(Default)]
struct Inner {
    announcements: Vec<BoardItem>,
    next_counter: u64,
    messages: HashMap<Seeker, Vec<u8>>,
    public_keys: HashMap<UserId, Vec<u8>>,
    fail_message_sends: usize,
    fail_announcement_sends: usize,
    node_url: String,
}

/// Shared in-memory board.
#[derive(Clone, Default)]
pub struct MemoryBulletin {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBulletin {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a panicking test; keep the state.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `n` message-board sends with an I/O error.
    pub fn fail_message_sends(&self, n: usize) {
        self.lock().fail_message_sends = n;
    }

    /// Fail the next `n` announcement-board sends with an I/O error.
    pub fn fail_announcement_sends(&self, n: usize) {
        self.lock().fail_announcement_sends = n;
    }

    /// Number of announcements on the board.
    pub fn announcement_count(&self) -> usize {
        self.lock().announcements.len()
    }

    /// Number of ciphertexts on the message board.
    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }
}

#[async_trait]
impl Bulletin for MemoryBulletin {
    async fn send_announcement(&self, data: &[u8]) -> Result<u64> {
        let mut inner = self.lock();
        if inner.fail_announcement_sends > 0 {
            inner.fail_announcement_sends -= 1;
            return Err(TransportError::Io("injected announcement failure".into()));
        }
        inner.next_counter += 1;
        let counter = inner.next_counter;
        inner.announcements.push(BoardItem {
            counter,
            data: data.to_vec(),
        });
        Ok(counter)
    }

    async fn fetch_announcements(
        &self,
        limit: usize,
        cursor: Option<u64>,
    ) -> Result<Vec<BoardItem>> {
        let inner = self.lock();
        let floor = cursor.unwrap_or(0);
        Ok(inner
            .announcements
            .iter()
            .filter(|item| item.counter > floor)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn send_message(&self, message: BoardMessage) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_message_sends > 0 {
            inner.fail_message_sends -= 1;
            return Err(TransportError::Io("injected message failure".into()));
        }
        inner.messages.insert(message.seeker, message.ciphertext);
        Ok(())
    }

    async fn fetch_messages(&self, seekers: &[Seeker]) -> Result<Vec<BoardMessage>> {
        let inner = self.lock();
        Ok(seekers
            .iter()
            .filter_map(|seeker| {
                inner.messages.get(seeker).map(|ciphertext| BoardMessage {
                    seeker: *seeker,
                    ciphertext: ciphertext.clone(),
                })
            })
            .collect())
    }

    async fn post_public_key(&self, data: &[u8]) -> Result<String> {
        // The memory board keys bundles by the embedded id when the
        // caller registers them via `register_public_key`; a bare post
        // only returns a hash-like handle.
        Ok(format!("pk-{}", data.len()))
    }

    async fn fetch_public_key(&self, user_id: &UserId) -> Result<Vec<u8>> {
        let inner = self.lock();
        inner
            .public_keys
            .get(user_id)
            .cloned()
            .ok_or(TransportError::NotFound)
    }

    async fn change_node(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(TransportError::Node("empty node URL".into()));
        }
        self.lock().node_url = url.to_string();
        Ok(())
    }
}

impl MemoryBulletin {
    /// Register a public-key bundle under an identity, as a directory
    /// service would after verifying the post.
    pub fn register_public_key(&self, user_id: UserId, data: Vec<u8>) {
        self.lock().public_keys.insert(user_id, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_announcement_counters_are_monotonic() {
        let board = MemoryBulletin::new();
        let first = board.send_announcement(b"a").await.expect("send");
        let second = board.send_announcement(b"b").await.expect("send");
        assert!(second > first);

        let items = board.fetch_announcements(10, None).await.expect("fetch");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].data, b"a");

        let after = board
            .fetch_announcements(10, Some(first))
            .await
            .expect("fetch");
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].counter, second);
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let board = MemoryBulletin::new();
        for i in 0..5u8 {
            board.send_announcement(&[i]).await.expect("send");
        }
        let items = board.fetch_announcements(3, None).await.expect("fetch");
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_message_board_by_seeker() {
        let board = MemoryBulletin::new();
        let seeker = Seeker::from_bytes([7; 32]);
        board
            .send_message(BoardMessage {
                seeker,
                ciphertext: vec![1, 2, 3],
            })
            .await
            .expect("send");

        let hits = board
            .fetch_messages(&[seeker, Seeker::from_bytes([8; 32])])
            .await
            .expect("fetch");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ciphertext, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let board = MemoryBulletin::new();
        board.fail_message_sends(1);
        let msg = BoardMessage {
            seeker: Seeker::from_bytes([7; 32]),
            ciphertext: vec![1],
        };
        assert!(board.send_message(msg.clone()).await.is_err());
        board.send_message(msg).await.expect("second attempt");
    }

    #[tokio::test]
    async fn test_public_key_lookup() {
        let board = MemoryBulletin::new();
        let id = UserId::from_bytes([1; 32]);
        assert!(matches!(
            board.fetch_public_key(&id).await,
            Err(TransportError::NotFound)
        ));
        board.register_public_key(id, vec![9, 9]);
        assert_eq!(board.fetch_public_key(&id).await.expect("fetch"), vec![9, 9]);
    }
}
