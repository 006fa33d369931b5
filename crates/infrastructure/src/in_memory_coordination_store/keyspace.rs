use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use stead_application::{ScoreBound, ScoredMember, StoreCommand, StoreReply};
use stead_core::{AppError, AppResult};

#[derive(Debug)]
enum StoredValue {
    Text(String),
    Sorted(HashMap<String, f64>),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn persistent(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_empty_collection(&self) -> bool {
        match &self.value {
            StoredValue::Text(_) => false,
            StoredValue::Sorted(members) => members.is_empty(),
            StoredValue::List(items) => items.is_empty(),
        }
    }
}

/// Keys, values and write versions of the in-memory store.
///
/// Every write stamps its key with a fresh value of a keyspace-wide counter.
/// Absent keys carry no version and read as 0, so a watched key is considered
/// changed when it was written, created, deleted or expired since.
#[derive(Debug, Default)]
pub(super) struct Keyspace {
    entries: HashMap<String, StoredEntry>,
    versions: HashMap<String, u64>,
    last_stamp: u64,
}

impl Keyspace {
    pub(super) fn version(&mut self, key: &str, now: Instant) -> u64 {
        self.purge_expired(key, now);
        self.versions.get(key).copied().unwrap_or(0)
    }

    pub(super) fn apply(&mut self, command: &StoreCommand, now: Instant) -> AppResult<StoreReply> {
        for key in command.keys() {
            self.purge_expired(key, now);
        }

        let reply = self.apply_command(command, now);
        for key in command.keys() {
            if !self.entries.contains_key(key) {
                self.versions.remove(key);
            }
        }
        reply
    }

    fn apply_command(&mut self, command: &StoreCommand, now: Instant) -> AppResult<StoreReply> {
        match command {
            StoreCommand::SetIfAbsent { key, value, ttl } => {
                if self.entries.contains_key(key) {
                    return Ok(StoreReply::Flag(false));
                }

                self.entries.insert(
                    key.clone(),
                    StoredEntry {
                        value: StoredValue::Text(value.clone()),
                        expires_at: ttl.map(|ttl| now + ttl),
                    },
                );
                self.touch(key);
                Ok(StoreReply::Flag(true))
            }
            StoreCommand::Get { key } => match self.entries.get(key) {
                None => Ok(StoreReply::Nil),
                Some(StoredEntry {
                    value: StoredValue::Text(value),
                    ..
                }) => Ok(StoreReply::Text(value.clone())),
                Some(_) => Err(wrong_type(key)),
            },
            StoreCommand::Delete { key } => {
                if self.entries.remove(key).is_none() {
                    return Ok(StoreReply::Integer(0));
                }

                self.touch(key);
                Ok(StoreReply::Integer(1))
            }
            StoreCommand::Expire { key, ttl } => {
                let Some(entry) = self.entries.get_mut(key) else {
                    return Ok(StoreReply::Flag(false));
                };

                entry.expires_at = Some(now + *ttl);
                self.touch(key);
                Ok(StoreReply::Flag(true))
            }
            StoreCommand::TimeToLive { key } => {
                let remaining = match self.entries.get(key) {
                    None => -2,
                    Some(StoredEntry {
                        expires_at: None, ..
                    }) => -1,
                    Some(StoredEntry {
                        expires_at: Some(expires_at),
                        ..
                    }) => i64::try_from(expires_at.saturating_duration_since(now).as_millis())
                        .unwrap_or(i64::MAX),
                };
                Ok(StoreReply::Integer(remaining))
            }
            StoreCommand::Increment { key } => {
                let current = match self.entries.get(key) {
                    None => 0,
                    Some(StoredEntry {
                        value: StoredValue::Text(value),
                        ..
                    }) => value.parse::<i64>().map_err(|_| {
                        AppError::Internal(format!("value at '{key}' is not an integer"))
                    })?,
                    Some(_) => return Err(wrong_type(key)),
                };
                let next = current.checked_add(1).ok_or_else(|| {
                    AppError::Internal(format!("increment would overflow '{key}'"))
                })?;

                match self.entries.get_mut(key) {
                    Some(entry) => entry.value = StoredValue::Text(next.to_string()),
                    None => {
                        self.entries.insert(
                            key.clone(),
                            StoredEntry::persistent(StoredValue::Text(next.to_string())),
                        );
                    }
                }
                self.touch(key);
                Ok(StoreReply::Integer(next))
            }
            StoreCommand::SortedAdd { key, member, score } => {
                let previous = self.sorted_mut(key)?.insert(member.clone(), *score);
                if previous != Some(*score) {
                    self.touch(key);
                }
                Ok(StoreReply::Integer(i64::from(previous.is_none())))
            }
            StoreCommand::SortedAddExisting { key, member, score } => {
                let updated = match self.sorted(key)? {
                    Some(members) => members.get(member).is_some_and(|current| current != score),
                    None => false,
                };
                if updated {
                    self.sorted_mut(key)?.insert(member.clone(), *score);
                    self.touch(key);
                }
                Ok(StoreReply::Integer(0))
            }
            StoreCommand::SortedRemove { key, member } => {
                let removed = match self.sorted(key)? {
                    Some(members) => members.contains_key(member),
                    None => false,
                };
                if removed {
                    self.sorted_mut(key)?.remove(member);
                    self.touch(key);
                    self.drop_if_empty(key);
                }
                Ok(StoreReply::Integer(i64::from(removed)))
            }
            StoreCommand::SortedScore { key, member } => {
                Ok(match self.sorted(key)?.and_then(|members| members.get(member)) {
                    Some(score) => StoreReply::Score(*score),
                    None => StoreReply::Nil,
                })
            }
            StoreCommand::SortedRank { key, member } => {
                let ordered = self.ordered(key)?;
                Ok(
                    match ordered.iter().position(|entry| &entry.member == member) {
                        Some(rank) => StoreReply::Integer(as_count(rank)),
                        None => StoreReply::Nil,
                    },
                )
            }
            StoreCommand::SortedCount { key } => Ok(StoreReply::Integer(as_count(
                self.sorted(key)?.map_or(0, HashMap::len),
            ))),
            StoreCommand::SortedRangeByRank { key, start, stop } => {
                let ordered = self.ordered(key)?;
                let members = match index_window(ordered.len(), *start, *stop) {
                    Some((first, last)) => ordered[first..=last].to_vec(),
                    None => Vec::new(),
                };
                Ok(StoreReply::Members(members))
            }
            StoreCommand::SortedRangeByScore { key, min, max } => Ok(StoreReply::Members(
                self.ordered(key)?
                    .into_iter()
                    .filter(|entry| within(entry.score, *min, *max))
                    .collect(),
            )),
            StoreCommand::SortedRemoveRangeByScore { key, min, max } => {
                let doomed: Vec<String> = self
                    .ordered(key)?
                    .into_iter()
                    .filter(|entry| within(entry.score, *min, *max))
                    .map(|entry| entry.member)
                    .collect();
                if !doomed.is_empty() {
                    let members = self.sorted_mut(key)?;
                    for member in &doomed {
                        members.remove(member);
                    }
                    self.touch(key);
                    self.drop_if_empty(key);
                }
                Ok(StoreReply::Integer(as_count(doomed.len())))
            }
            StoreCommand::SortedRetainShared { key, filter_key } => {
                let keep: HashSet<String> = self
                    .sorted(filter_key)?
                    .map(|members| members.keys().cloned().collect())
                    .unwrap_or_default();
                let existed = self.entries.contains_key(key);
                let remaining = match self.sorted(key)? {
                    Some(_) => {
                        let members = self.sorted_mut(key)?;
                        members.retain(|member, _| keep.contains(member));
                        members.len()
                    }
                    None => 0,
                };
                if existed {
                    self.touch(key);
                    self.drop_if_empty(key);
                }
                Ok(StoreReply::Integer(as_count(remaining)))
            }
            StoreCommand::ListPush { key, value } => {
                let items = self.list_mut(key)?;
                items.push_back(value.clone());
                let length = items.len();
                self.touch(key);
                Ok(StoreReply::Integer(as_count(length)))
            }
            StoreCommand::ListPopFront { key } => {
                if self.list(key)?.is_none() {
                    return Ok(StoreReply::Nil);
                }

                let popped = self.list_mut(key)?.pop_front();
                self.touch(key);
                self.drop_if_empty(key);
                Ok(popped.map_or(StoreReply::Nil, StoreReply::Text))
            }
            StoreCommand::ListLength { key } => Ok(StoreReply::Integer(as_count(
                self.list(key)?.map_or(0, VecDeque::len),
            ))),
            StoreCommand::ListRange { key, start, stop } => {
                let items: Vec<String> = self
                    .list(key)?
                    .map(|items| items.iter().cloned().collect())
                    .unwrap_or_default();
                let window = match index_window(items.len(), *start, *stop) {
                    Some((first, last)) => items[first..=last].to_vec(),
                    None => Vec::new(),
                };
                Ok(StoreReply::Texts(window))
            }
        }
    }

    fn touch(&mut self, key: &str) {
        self.last_stamp += 1;
        self.versions.insert(key.to_owned(), self.last_stamp);
    }

    fn purge_expired(&mut self, key: &str, now: Instant) {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|expires_at| expires_at <= now);

        if expired {
            self.entries.remove(key);
            self.versions.remove(key);
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(StoredEntry::is_empty_collection)
        {
            self.entries.remove(key);
        }
    }

    fn sorted(&self, key: &str) -> AppResult<Option<&HashMap<String, f64>>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(StoredEntry {
                value: StoredValue::Sorted(members),
                ..
            }) => Ok(Some(members)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> AppResult<&mut HashMap<String, f64>> {
        let entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| StoredEntry::persistent(StoredValue::Sorted(HashMap::new())));

        match &mut entry.value {
            StoredValue::Sorted(members) => Ok(members),
            _ => Err(wrong_type(key)),
        }
    }

    fn ordered(&self, key: &str) -> AppResult<Vec<ScoredMember>> {
        let mut ordered: Vec<ScoredMember> = self
            .sorted(key)?
            .map(|members| {
                members
                    .iter()
                    .map(|(member, score)| ScoredMember {
                        member: member.clone(),
                        score: *score,
                    })
                    .collect()
            })
            .unwrap_or_default();

        ordered.sort_by(|left, right| {
            left.score
                .total_cmp(&right.score)
                .then_with(|| left.member.cmp(&right.member))
        });
        Ok(ordered)
    }

    fn list(&self, key: &str) -> AppResult<Option<&VecDeque<String>>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(StoredEntry {
                value: StoredValue::List(items),
                ..
            }) => Ok(Some(items)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn list_mut(&mut self, key: &str) -> AppResult<&mut VecDeque<String>> {
        let entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| StoredEntry::persistent(StoredValue::List(VecDeque::new())));

        match &mut entry.value {
            StoredValue::List(items) => Ok(items),
            _ => Err(wrong_type(key)),
        }
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::Internal(format!("operation against '{key}' holding the wrong kind of value"))
}

fn within(score: f64, min: ScoreBound, max: ScoreBound) -> bool {
    min.admits_from_below(score) && max.admits_from_above(score)
}

fn as_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Resolves Redis-style inclusive `start..=stop` indexes, negative values
/// counting from the end, into a window of a sequence of `len` items.
fn index_window(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = as_count(len);
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len {
        return None;
    }

    Some((
        usize::try_from(start).ok()?,
        usize::try_from(stop).ok()?,
    ))
}
