//! Typed delivery of pushed events.
//!
//! The channel manager decodes each event and hands it to an [`EventSink`].
//! [`CacheEventSink`] is the production sink: it turns events into tag
//! invalidations, updates the unread counter and forwards security alerts
//! to the session.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::messages::{
    BalanceUpdate, NotificationCreated, SecurityAlert, ServerEvent, TransactionCreated,
    UnreadCount,
};
use crate::cache::tag::{ACCOUNTS, NOTIFICATIONS, TRANSACTIONS};
use crate::cache::{Tag, TaggedCache};
use crate::session::Session;

/// Receiver of decoded server events, one method per kind.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn balance_updated(&self, event: BalanceUpdate);
    async fn transaction_created(&self, event: TransactionCreated);
    async fn notification_created(&self, event: NotificationCreated);
    async fn unread_count(&self, event: UnreadCount);
    async fn security_alert(&self, event: SecurityAlert);
}

/// Route an event to the matching sink method.
pub async fn deliver(sink: &dyn EventSink, event: ServerEvent) {
    match event {
        ServerEvent::BalanceUpdated(e) => sink.balance_updated(e).await,
        ServerEvent::TransactionCreated(e) => sink.transaction_created(e).await,
        ServerEvent::NotificationCreated(e) => sink.notification_created(e).await,
        ServerEvent::UnreadCount(e) => sink.unread_count(e).await,
        ServerEvent::SecurityAlert(e) => sink.security_alert(e).await,
    }
}

/// Latest unread notification count pushed by the server.
#[derive(Clone)]
pub struct UnreadCounter {
    tx: Arc<watch::Sender<u64>>,
}

impl UnreadCounter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn set(&self, count: u64) {
        self.tx.send_replace(count);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for UnreadCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Tags a balance change touches.
pub fn balance_tags(event: &BalanceUpdate) -> Vec<Tag> {
    Tag::member_change(ACCOUNTS, event.account_id.clone())
}

/// Tags a new transaction touches.
pub fn transaction_tags(event: &TransactionCreated) -> Vec<Tag> {
    vec![
        Tag::list(TRANSACTIONS),
        Tag::item(TRANSACTIONS, event.account_id.clone()),
        Tag::item(ACCOUNTS, event.account_id.clone()),
    ]
}

pub fn notification_tags(_event: &NotificationCreated) -> Vec<Tag> {
    vec![Tag::list(NOTIFICATIONS)]
}

/// Sink wiring pushed events into the cache and session.
#[derive(Clone)]
pub struct CacheEventSink {
    cache: TaggedCache,
    unread: UnreadCounter,
    session: Session,
}

impl CacheEventSink {
    pub fn new(cache: TaggedCache, unread: UnreadCounter, session: Session) -> Self {
        Self {
            cache,
            unread,
            session,
        }
    }
}

#[async_trait]
impl EventSink for CacheEventSink {
    async fn balance_updated(&self, event: BalanceUpdate) {
        let affected = self.cache.invalidate(&balance_tags(&event));
        debug!(account = %event.account_id, affected, "Balance updated");
    }

    async fn transaction_created(&self, event: TransactionCreated) {
        let affected = self.cache.invalidate(&transaction_tags(&event));
        debug!(
            account = %event.account_id,
            transaction = %event.transaction_id,
            affected,
            "Transaction created"
        );
    }

    async fn notification_created(&self, event: NotificationCreated) {
        let affected = self.cache.invalidate(&notification_tags(&event));
        debug!(notification = %event.notification_id, affected, "Notification created");
    }

    async fn unread_count(&self, event: UnreadCount) {
        self.unread.set(event.count);
    }

    async fn security_alert(&self, event: SecurityAlert) {
        self.session.handle_security_alert(&event).await;
    }
}
