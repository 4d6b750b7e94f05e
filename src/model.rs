//! Item model: queued images, their cards, and the bounded queue.
//!
//! Fields of [`QueuedItem`] are private and change only through the
//! transition methods, which keep the card / error invariant in one place:
//! a `done` item always has a card and no error message, an `error` item
//! always has a message and no card, and a pending or processing item has
//! neither.

use crate::config::MAX_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque identity of a queued image, stable for the item's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Base64-encoded image ready to attach to a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Base64 body without any `data:` prefix.
    pub data: String,
    /// e.g. `image/jpeg`.
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.trim().is_empty()
    }
}

/// One flashcard: question side and answer side.
///
/// Both fields must be present in a synthesis response; their content is
/// not validated further and may carry Markdown or HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub front: String,
    pub back: String,
}

impl Card {
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
        }
    }
}

/// Per-item pipeline state: `pending → processing → {done | error}`.
///
/// `done` is terminal. `error` is picked up again by the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// An image in the batch queue together with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedItem {
    id: ItemId,
    source: Option<String>,
    #[serde(skip)]
    payload: Arc<ImagePayload>,
    status: ItemStatus,
    card: Option<Card>,
    error_message: Option<String>,
}

impl QueuedItem {
    pub fn new(payload: ImagePayload) -> Self {
        Self {
            id: ItemId::new(),
            source: None,
            payload: Arc::new(payload),
            status: ItemStatus::Pending,
            card: None,
            error_message: None,
        }
    }

    /// Attach a human-readable origin (file name, URL) for reports.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn payload(&self) -> &ImagePayload {
        &self.payload
    }

    pub(crate) fn payload_handle(&self) -> Arc<ImagePayload> {
        Arc::clone(&self.payload)
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn card(&self) -> Option<&Card> {
        self.card.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub(crate) fn begin(&mut self) {
        self.status = ItemStatus::Processing;
        self.card = None;
        self.error_message = None;
    }

    pub(crate) fn complete(&mut self, card: Card) {
        self.status = ItemStatus::Done;
        self.card = Some(card);
        self.error_message = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = ItemStatus::Error;
        self.card = None;
        self.error_message = Some(if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        });
    }
}

/// Counts derived from a queue; available at any time, including mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub done: usize,
    pub error: usize,
    /// Pending and processing items.
    pub pending: usize,
}

impl QueueStats {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a QueuedItem>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            match item.status() {
                ItemStatus::Done => stats.done += 1,
                ItemStatus::Error => stats.error += 1,
                ItemStatus::Pending | ItemStatus::Processing => stats.pending += 1,
            }
        }
        stats
    }

    /// Items that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.done + self.error
    }
}

/// Ordered, bounded list of queued images.
///
/// Insertion order drives processing order, the `#N` progress labels, and
/// the export row order.
#[derive(Debug, Clone)]
pub struct Queue {
    items: Vec<QueuedItem>,
    capacity: usize,
}

impl Default for Queue {
    fn default() -> Self {
        Self::with_capacity(MAX_QUEUE_CAPACITY)
    }
}

impl Queue {
    /// Create an empty queue. `capacity` is clamped to 1–100.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append items in order until the queue is full.
    ///
    /// Items beyond the capacity are dropped without error. Returns how many
    /// were accepted.
    pub fn extend(&mut self, items: impl IntoIterator<Item = QueuedItem>) -> usize {
        let before = self.items.len();
        let room = self.remaining();
        self.items.extend(items.into_iter().take(room));
        self.items.len() - before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    pub fn items(&self) -> &[QueuedItem] {
        &self.items
    }

    pub fn get(&self, id: ItemId) -> Option<&QueuedItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub(crate) fn get_mut_at(&mut self, index: usize) -> Option<&mut QueuedItem> {
        self.items.get_mut(index)
    }

    /// Remove an item by id, returning it if it was present.
    pub fn remove(&mut self, id: ItemId) -> Option<QueuedItem> {
        let pos = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(pos))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_items(&self.items)
    }
}

/// Coarse phase of the batch, mirrored in [`BatchRunState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    #[default]
    Idle,
    Processing,
    Completed,
}

/// Session-scoped run flag and status line. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRunState {
    pub is_running: bool,
    pub step: RunStep,
    pub current_message: String,
}

impl BatchRunState {
    pub fn idle() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> QueuedItem {
        QueuedItem::new(ImagePayload::new("aGVsbG8=", "image/png"))
    }

    fn assert_invariant(item: &QueuedItem) {
        match item.status() {
            ItemStatus::Done => {
                assert!(item.card().is_some());
                assert!(item.error_message().is_none());
            }
            ItemStatus::Error => {
                assert!(item.card().is_none());
                assert!(item.error_message().is_some());
            }
            ItemStatus::Pending | ItemStatus::Processing => {
                assert!(item.card().is_none());
                assert!(item.error_message().is_none());
            }
        }
    }

    #[test]
    fn transitions_keep_card_and_error_exclusive() {
        let mut it = item();
        assert_eq!(it.status(), ItemStatus::Pending);
        assert_invariant(&it);

        it.begin();
        assert_eq!(it.status(), ItemStatus::Processing);
        assert_invariant(&it);

        it.fail("boom");
        assert_eq!(it.error_message(), Some("boom"));
        assert_invariant(&it);

        it.begin();
        assert_invariant(&it);
        it.complete(Card::new("Q", "A"));
        assert_eq!(it.card(), Some(&Card::new("Q", "A")));
        assert_invariant(&it);
    }

    #[test]
    fn blank_failure_message_is_replaced() {
        let mut it = item();
        it.fail("   ");
        assert_eq!(it.error_message(), Some("unknown error"));
    }

    #[test]
    fn intake_of_105_yields_100() {
        let mut queue = Queue::default();
        let accepted = queue.extend((0..105).map(|_| item()));
        assert_eq!(accepted, 100);
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.remaining(), 0);
        assert_eq!(queue.extend([item()]), 0);
    }

    #[test]
    fn extend_preserves_order_and_ids_are_unique() {
        let mut queue = Queue::with_capacity(3);
        let items: Vec<_> = (0..3).map(|i| item().with_source(format!("{i}.jpg"))).collect();
        let ids: Vec<_> = items.iter().map(QueuedItem::id).collect();
        queue.extend(items);
        let sources: Vec<_> = queue.items().iter().filter_map(QueuedItem::source).collect();
        assert_eq!(sources, ["0.jpg", "1.jpg", "2.jpg"]);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn remove_and_stats() {
        let mut queue = Queue::default();
        queue.extend((0..4).map(|_| item()));
        let ids: Vec<_> = queue.items().iter().map(QueuedItem::id).collect();

        queue.get_mut_at(0).unwrap().complete(Card::new("a", "b"));
        queue.get_mut_at(1).unwrap().fail("x");
        queue.get_mut_at(2).unwrap().begin();

        assert_eq!(
            queue.stats(),
            QueueStats {
                total: 4,
                done: 1,
                error: 1,
                pending: 2
            }
        );

        assert!(queue.remove(ids[1]).is_some());
        assert!(queue.remove(ids[1]).is_none());
        assert_eq!(queue.stats().error, 0);
        assert_eq!(queue.get(ids[0]).map(QueuedItem::status), Some(ItemStatus::Done));
    }

    #[test]
    fn item_serialises_without_payload() {
        let mut it = item().with_source("page.jpg");
        it.complete(Card::new("Q1", "A1"));
        let json = serde_json::to_value(&it).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["card"]["front"], "Q1");
        assert!(json.get("payload").is_none());
    }
}
