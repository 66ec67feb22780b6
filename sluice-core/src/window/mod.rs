use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::Hash;
use std::ops::Bound;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::mailbox::{Inbox, Outbox};
use crate::operator::Operator;
use crate::types::{EventTime, StreamData, StreamElement, Watermark, EVENT_TIME_MAX, EVENT_TIME_MIN};

/// Key-to-accumulator map used throughout the operators; ahash for fast
/// non-cryptographic hashing.
pub(crate) type KeyMap<K, V> = HashMap<K, V, ahash::RandomState>;

mod grouper;
mod primitives;
mod session;
mod sliding;

pub use grouper::*;
pub use primitives::*;
pub use session::*;
pub use sliding::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/property_tests.rs"]
mod property_tests;
