//! # restgraph Sync Engine
//!
//! Keeps a local object graph in sync with a REST service.
//!
//! This crate provides:
//! - Fetch coordinator (collections, object faults, relationship faults)
//! - Write-back coordinator (inserts, updates, deletes with reconciliation)
//! - Request factory with the REST path convention
//! - Transport abstraction with mock and HTTP implementations
//! - Lifecycle notifications
//! - The `IncrementalStore` facade tying it together
//!
//! ## Architecture
//!
//! The engine implements a **pull-on-demand, push-on-save** model:
//! 1. Queries and faults pull remote records into the local graph
//! 2. Local mutations are recorded as pending changes
//! 3. Save pushes one request per changed object and merges the canonical
//!    response
//!
//! ## Key Invariants
//!
//! - The same remote resource always materializes as the same local object
//! - Each remote read or write is attempted once
//! - A failed operation never corrupts previously merged state
//! - Operations on an object wait for that object's in-flight insert
//! - No lock is held across a transport call

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod fetch;
mod http;
mod merge;
mod notification;
mod request;
mod store;
mod transport;
mod write_back;

pub use config::SyncConfig;
pub use context::{InsertGate, SyncContext};
pub use error::{SyncError, SyncResult, TransportError};
pub use fetch::{FetchCoordinator, FetchOutcome, FetchState, FetchStats};
pub use http::HttpTransport;
pub use notification::{Notification, NotificationCenter, OperationSet, RemoteOperation};
pub use request::{Method, RemoteRequest, RemoteResponse, RequestFactory, RestRequestFactory};
pub use store::IncrementalStore;
pub use transport::{MockTransport, Transport};
pub use write_back::{ChangeBatch, PendingChange, SaveReport, WriteBackCoordinator};
