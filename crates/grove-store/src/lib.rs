// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Redis state store — the only shared mutable resource in the system.
//!
//! All cross-task communication flows through here: task records,
//! conversation logs, and per-task message queues as RedisJSON documents,
//! plus pub/sub channels for notifications and throttle coordination.
//! Field- and array-level writes map to single RedisJSON commands, which
//! the server applies atomically; concurrent appenders rely on that.
//! No cross-key transactions are used anywhere.

pub mod keys;
mod records;
mod store;
mod tasks;

pub use records::{
    ApiCallMarker, Envelope, EnvelopeContent, EnvelopeKind, StoredMessage, TaskRecord, TaskStatus,
    ThrottleState, Turn,
};
pub use store::{StateStore, StoreError, Subscription};
pub use tasks::API_CALL_TTL_SECS;
