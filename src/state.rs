//! In-memory node state: role, term, the replicated log, the staged
//! `pending` entries used by the CAS protocol, and the key-value state
//! machine they drive.
//!
//! All of it (barring the fault-injection switch, see `fault.rs`) lives
//! behind the single coarse lock described in SPEC_FULL.md §5; this module
//! only defines the data, not the locking.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::ServerId;

/// A single operation in the replicated log. `Delete` carries no value, so
/// the "value omitted for delete" rule from the spec's data model is
/// enforced by the type rather than by convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LogEntry {
    Put { key: String, value: String },
    Delete { key: String },
}

impl LogEntry {
    pub fn key(&self) -> &str {
        match self {
            LogEntry::Put { key, .. } => key,
            LogEntry::Delete { key } => key,
        }
    }

    /// Applies this entry to a key-value map: `Put` sets, `Delete` removes.
    pub fn apply(&self, kv: &mut HashMap<String, String>) {
        match self {
            LogEntry::Put { key, value } => {
                kv.insert(key.clone(), value.clone());
            }
            LogEntry::Delete { key } => {
                kv.remove(key);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// The complete node state behind the coarse lock.
pub struct NodeState {
    pub server_id: ServerId,
    pub role: Role,
    pub term: u64,
    pub leader_id: Option<ServerId>,
    pub log: Vec<LogEntry>,
    pub pending: Vec<LogEntry>,
    pub kv: HashMap<String, String>,
    pub voted_for_by_term: HashMap<u64, ServerId>,
    pub last_heartbeat_ts: Instant,
    /// Leader's best estimate of each peer's log length, updated from
    /// heartbeat responses. Also doubles as the freshness index the GET
    /// route consults (§4.5).
    pub peer_log_len: HashMap<ServerId, usize>,
    /// `key -> 1-based index of the last log entry mentioning key`,
    /// maintained incrementally on every append so the freshness route is
    /// O(1) instead of a linear scan over `log` (§9 re-architecture
    /// guidance).
    pub key_index: HashMap<String, usize>,
}

impl NodeState {
    pub fn new(server_id: ServerId) -> Self {
        NodeState {
            server_id,
            role: Role::Follower,
            term: 0,
            leader_id: None,
            log: Vec::new(),
            pending: Vec::new(),
            kv: HashMap::new(),
            voted_for_by_term: HashMap::new(),
            last_heartbeat_ts: Instant::now(),
            peer_log_len: HashMap::new(),
            key_index: HashMap::new(),
        }
    }

    /// Appends `entry` to the log, applies it to `kv`, and records its
    /// position in `key_index`. Used for blind writes (PUT/POST/DELETE) and
    /// for the leader's speculative CAS append.
    pub fn append_and_apply(&mut self, entry: LogEntry) {
        entry.apply(&mut self.kv);
        self.log.push(entry);
        let index = self.log.len();
        let key = self.log[index - 1].key().to_string();
        self.key_index.insert(key, index);
    }

    /// Rolls back the most recently appended entry and its effect on `kv`
    /// and `key_index`, restoring `kv[key]` to `previous` (or removing it if
    /// there was no prior value). Used when a CAS write fails to reach
    /// majority ack (§4.4 step 6).
    pub fn rollback_last(&mut self, previous: Option<String>) {
        if let Some(entry) = self.log.pop() {
            let key = entry.key().to_string();
            match previous {
                Some(value) => {
                    self.kv.insert(key.clone(), value);
                }
                None => {
                    self.kv.remove(&key);
                }
            }
            // Restore key_index to whatever it pointed at before this
            // entry, i.e. the last remaining log entry mentioning key, if
            // any.
            match self
                .log
                .iter()
                .enumerate()
                .rev()
                .find(|(_, e)| e.key() == key)
            {
                Some((idx, _)) => {
                    self.key_index.insert(key, idx + 1);
                }
                None => {
                    self.key_index.remove(&key);
                }
            }
        }
    }

    /// 1-based index of the last log entry mentioning `key`, or `-1` if
    /// none (matches the spec's `key_ver` definition, §4.5).
    pub fn key_version(&self, key: &str) -> i64 {
        self.key_index
            .get(key)
            .map(|&idx| idx as i64)
            .unwrap_or(-1)
    }

    /// Replays `entries` onto `kv`, appends them to `log`, and updates
    /// `key_index` for each — used by the follower side of heartbeat
    /// reconciliation (§4.3), which applies entries immediately rather than
    /// through the `pending`/commit path.
    pub fn append_entries_from_leader(&mut self, entries: Vec<LogEntry>) {
        for entry in entries {
            self.append_and_apply(entry);
        }
    }

    /// Promotes `pending` into `log`: entries beyond the current log length
    /// are applied to `kv`, then `log` is replaced outright by `pending`.
    /// See DESIGN.md open question 5 for why this replaces rather than
    /// appends.
    pub fn commit_pending(&mut self) {
        let current_len = self.log.len();
        for entry in self.pending.iter().skip(current_len) {
            entry.apply(&mut self.kv);
        }
        self.log = std::mem::take(&mut self.pending);
        self.key_index.clear();
        for (i, entry) in self.log.iter().enumerate() {
            self.key_index.insert(entry.key().to_string(), i + 1);
        }
    }

    /// Stages `log ∪ change_log` into `pending`, overwriting whatever was
    /// previously staged (§4.4).
    pub fn stage_pending(&mut self, change_log: Vec<LogEntry>) {
        let mut staged = self.log.clone();
        staged.extend(change_log);
        self.pending = staged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_apply_sets_key_index_and_kv() {
        let mut state = NodeState::new(1);
        state.append_and_apply(LogEntry::Put {
            key: "foo".into(),
            value: "bar".into(),
        });
        assert_eq!(state.kv.get("foo"), Some(&"bar".to_string()));
        assert_eq!(state.key_version("foo"), 1);
        assert_eq!(state.key_version("missing"), -1);
    }

    #[test]
    fn rollback_last_restores_previous_value() {
        let mut state = NodeState::new(1);
        state.append_and_apply(LogEntry::Put {
            key: "foo".into(),
            value: "bar".into(),
        });
        state.append_and_apply(LogEntry::Put {
            key: "foo".into(),
            value: "baz".into(),
        });
        state.rollback_last(Some("bar".to_string()));
        assert_eq!(state.kv.get("foo"), Some(&"bar".to_string()));
        assert_eq!(state.log.len(), 1);
        assert_eq!(state.key_version("foo"), 1);
    }

    #[test]
    fn rollback_last_removes_key_with_no_prior_value() {
        let mut state = NodeState::new(1);
        state.append_and_apply(LogEntry::Put {
            key: "foo".into(),
            value: "bar".into(),
        });
        state.rollback_last(None);
        assert!(!state.kv.contains_key("foo"));
        assert_eq!(state.key_version("foo"), -1);
    }

    #[test]
    fn commit_pending_applies_only_new_suffix_and_replaces_log() {
        let mut state = NodeState::new(1);
        state.append_and_apply(LogEntry::Put {
            key: "foo".into(),
            value: "bar".into(),
        });
        state.stage_pending(vec![LogEntry::Put {
            key: "baz".into(),
            value: "qux".into(),
        }]);
        state.commit_pending();
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.kv.get("baz"), Some(&"qux".to_string()));
        assert_eq!(state.key_version("foo"), 1);
        assert_eq!(state.key_version("baz"), 2);
    }

    #[test]
    fn delete_entry_removes_key_on_apply() {
        let mut kv = HashMap::new();
        kv.insert("foo".to_string(), "bar".to_string());
        LogEntry::Delete { key: "foo".into() }.apply(&mut kv);
        assert!(!kv.contains_key("foo"));
    }
}
