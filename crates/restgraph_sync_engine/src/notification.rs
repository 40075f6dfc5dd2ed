//! Lifecycle notifications.
//!
//! Every remote fetch and every save is bracketed by a pair of
//! notifications: the "will" notification is emitted before the first
//! request leaves, the "did" notification after every request of the pass
//! has settled. Both carry the operations of the pass.
//!
//! ```rust,ignore
//! let receiver = store.subscribe();
//! std::thread::spawn(move || {
//!     while let Ok(notification) = receiver.recv() {
//!         println!("{notification:?}");
//!     }
//! });
//! ```

use crate::error::SyncError;
use crate::request::Method;
use crate::write_back::ChangeBatch;
use parking_lot::RwLock;
use restgraph_core::{LocalId, Query};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// One remote request issued during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOperation {
    /// Context-unique operation number.
    pub id: u64,
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
}

/// The outstanding operations of one fetch or save pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSet {
    operations: Vec<RemoteOperation>,
}

impl OperationSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set with a single operation.
    pub fn single(operation: RemoteOperation) -> Self {
        Self {
            operations: vec![operation],
        }
    }

    /// Adds an operation.
    pub fn push(&mut self, operation: RemoteOperation) {
        self.operations.push(operation);
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the pass issued no requests.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Iterates over the operations.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteOperation> {
        self.operations.iter()
    }
}

impl FromIterator<RemoteOperation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = RemoteOperation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A collection fetch is about to be sent.
    WillFetchCollection {
        /// Operations of the pass.
        operations: OperationSet,
        /// The query being fetched.
        query: Query,
    },
    /// A collection fetch settled.
    DidFetchCollection {
        /// Operations of the pass.
        operations: OperationSet,
        /// The query that was fetched.
        query: Query,
        /// Merged local identities, in response order.
        fetched: Vec<LocalId>,
        /// Failure, if the fetch failed.
        error: Option<SyncError>,
    },
    /// An object fault is about to be sent.
    WillFetchObject {
        /// Operations of the pass.
        operations: OperationSet,
        /// The faulted object.
        object: LocalId,
    },
    /// An object fault settled.
    DidFetchObject {
        /// Operations of the pass.
        operations: OperationSet,
        /// The faulted object.
        object: LocalId,
        /// Failure, if the fault failed.
        error: Option<SyncError>,
    },
    /// A relationship fault is about to be sent.
    WillFetchRelationship {
        /// Operations of the pass.
        operations: OperationSet,
        /// The object owning the relationship.
        object: LocalId,
        /// Relationship name.
        relationship: String,
    },
    /// A relationship fault settled.
    DidFetchRelationship {
        /// Operations of the pass.
        operations: OperationSet,
        /// The object owning the relationship.
        object: LocalId,
        /// Relationship name.
        relationship: String,
        /// Related local identities, in response order.
        fetched: Vec<LocalId>,
        /// Failure, if the fault failed.
        error: Option<SyncError>,
    },
    /// A save is about to be sent.
    WillSave {
        /// Operations that could be built before any request was issued.
        operations: OperationSet,
        /// The batch being saved.
        batch: ChangeBatch,
    },
    /// A save settled.
    DidSave {
        /// Every operation issued by the save.
        operations: OperationSet,
        /// The batch that was saved.
        batch: ChangeBatch,
        /// Per-object failures.
        errors: BTreeMap<LocalId, SyncError>,
    },
}

impl Notification {
    /// The operations carried by the notification.
    pub fn operations(&self) -> &OperationSet {
        match self {
            Notification::WillFetchCollection { operations, .. }
            | Notification::DidFetchCollection { operations, .. }
            | Notification::WillFetchObject { operations, .. }
            | Notification::DidFetchObject { operations, .. }
            | Notification::WillFetchRelationship { operations, .. }
            | Notification::DidFetchRelationship { operations, .. }
            | Notification::WillSave { operations, .. }
            | Notification::DidSave { operations, .. } => operations,
        }
    }

    /// Returns true for the "will" half of a pair.
    pub fn is_will(&self) -> bool {
        matches!(
            self,
            Notification::WillFetchCollection { .. }
                | Notification::WillFetchObject { .. }
                | Notification::WillFetchRelationship { .. }
                | Notification::WillSave { .. }
        )
    }
}

/// Distributes notifications to subscribers.
///
/// Delivery is in emission order. Dropped receivers are pruned on the next
/// emission.
pub struct NotificationCenter {
    subscribers: RwLock<Vec<Sender<Notification>>>,
    history: RwLock<Vec<Notification>>,
    max_history: usize,
}

impl NotificationCenter {
    /// Creates a notification center.
    pub fn new() -> Self {
        Self::with_max_history(1000)
    }

    /// Creates a notification center with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Subscribes to future notifications.
    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits a notification to all subscribers.
    pub fn emit(&self, notification: Notification) {
        {
            let mut history = self.history.write();
            history.push(notification.clone());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    /// Recent notifications, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        self.history.read().clone()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
