use std::time::Duration;

/// Bound of a score range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    /// Lower than any score.
    NegativeInfinity,
    /// Higher than any score.
    PositiveInfinity,
    /// Range includes this score.
    Inclusive(f64),
    /// Range stops just short of this score.
    Exclusive(f64),
}

impl ScoreBound {
    /// Returns whether `score` satisfies this bound used as a minimum.
    #[must_use]
    pub fn admits_from_below(self, score: f64) -> bool {
        match self {
            Self::NegativeInfinity => true,
            Self::PositiveInfinity => false,
            Self::Inclusive(bound) => score >= bound,
            Self::Exclusive(bound) => score > bound,
        }
    }

    /// Returns whether `score` satisfies this bound used as a maximum.
    #[must_use]
    pub fn admits_from_above(self, score: f64) -> bool {
        match self {
            Self::NegativeInfinity => false,
            Self::PositiveInfinity => true,
            Self::Inclusive(bound) => score <= bound,
            Self::Exclusive(bound) => score < bound,
        }
    }
}

/// One operation understood by a coordination store.
///
/// Batches of commands are executed atomically; see
/// [`CoordinationStore::execute`](super::CoordinationStore::execute).
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Sets `key` only when it does not exist. Replies with a flag.
    SetIfAbsent {
        /// Target key.
        key: String,
        /// Value to store.
        value: String,
        /// Optional expiry armed together with the write.
        ttl: Option<Duration>,
    },
    /// Reads a string key. Replies with text or nil.
    Get {
        /// Target key.
        key: String,
    },
    /// Deletes a key of any type. Replies with the number of removed keys.
    Delete {
        /// Target key.
        key: String,
    },
    /// Arms an expiry on an existing key. Replies with a flag.
    Expire {
        /// Target key.
        key: String,
        /// Remaining lifetime.
        ttl: Duration,
    },
    /// Remaining lifetime in milliseconds, `-1` without expiry, `-2` when missing.
    TimeToLive {
        /// Target key.
        key: String,
    },
    /// Increments an integer counter. Replies with the new value.
    Increment {
        /// Target key.
        key: String,
    },
    /// Inserts or re-scores a member. Replies with the number of new members.
    SortedAdd {
        /// Sorted set key.
        key: String,
        /// Member to write.
        member: String,
        /// Member score.
        score: f64,
    },
    /// Re-scores a member only when it is already present. Replies with `0`.
    SortedAddExisting {
        /// Sorted set key.
        key: String,
        /// Member to write.
        member: String,
        /// Member score.
        score: f64,
    },
    /// Removes a member. Replies with the number of removed members.
    SortedRemove {
        /// Sorted set key.
        key: String,
        /// Member to remove.
        member: String,
    },
    /// Reads a member score. Replies with a score or nil.
    SortedScore {
        /// Sorted set key.
        key: String,
        /// Member to look up.
        member: String,
    },
    /// Zero-based rank by ascending score. Replies with an integer or nil.
    SortedRank {
        /// Sorted set key.
        key: String,
        /// Member to look up.
        member: String,
    },
    /// Number of members. Replies with an integer.
    SortedCount {
        /// Sorted set key.
        key: String,
    },
    /// Members between two ranks, negative ranks counting from the end.
    SortedRangeByRank {
        /// Sorted set key.
        key: String,
        /// First rank.
        start: i64,
        /// Last rank, inclusive.
        stop: i64,
    },
    /// Members whose score lies within the bounds, ascending.
    SortedRangeByScore {
        /// Sorted set key.
        key: String,
        /// Lower bound.
        min: ScoreBound,
        /// Upper bound.
        max: ScoreBound,
    },
    /// Removes members within the bounds. Replies with the removed count.
    SortedRemoveRangeByScore {
        /// Sorted set key.
        key: String,
        /// Lower bound.
        min: ScoreBound,
        /// Upper bound.
        max: ScoreBound,
    },
    /// Drops members of `key` that are not members of `filter_key`, keeping
    /// the scores of `key`. Replies with the resulting member count.
    SortedRetainShared {
        /// Sorted set rewritten in place.
        key: String,
        /// Sorted set whose membership is kept.
        filter_key: String,
    },
    /// Appends to the tail of a list. Replies with the new length.
    ListPush {
        /// List key.
        key: String,
        /// Item to append.
        value: String,
    },
    /// Pops the head of a list. Replies with text or nil.
    ListPopFront {
        /// List key.
        key: String,
    },
    /// Length of a list. Replies with an integer.
    ListLength {
        /// List key.
        key: String,
    },
    /// Items between two indexes, negative indexes counting from the end.
    ListRange {
        /// List key.
        key: String,
        /// First index.
        start: i64,
        /// Last index, inclusive.
        stop: i64,
    },
}

impl StoreCommand {
    /// Returns the keys this command reads or writes.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::SortedRetainShared { key, filter_key } => {
                vec![key.as_str(), filter_key.as_str()]
            }
            Self::SetIfAbsent { key, .. }
            | Self::Get { key }
            | Self::Delete { key }
            | Self::Expire { key, .. }
            | Self::TimeToLive { key }
            | Self::Increment { key }
            | Self::SortedAdd { key, .. }
            | Self::SortedAddExisting { key, .. }
            | Self::SortedRemove { key, .. }
            | Self::SortedScore { key, .. }
            | Self::SortedRank { key, .. }
            | Self::SortedCount { key }
            | Self::SortedRangeByRank { key, .. }
            | Self::SortedRangeByScore { key, .. }
            | Self::SortedRemoveRangeByScore { key, .. }
            | Self::ListPush { key, .. }
            | Self::ListPopFront { key }
            | Self::ListLength { key }
            | Self::ListRange { key, .. } => vec![key.as_str()],
        }
    }

    /// Builds a [`StoreCommand::SetIfAbsent`].
    #[must_use]
    pub fn set_if_absent(
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        Self::SetIfAbsent {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    /// Builds a [`StoreCommand::Get`].
    #[must_use]
    pub fn get(key: impl Into<String>) -> Self {
        Self::Get { key: key.into() }
    }

    /// Builds a [`StoreCommand::Delete`].
    #[must_use]
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Builds a [`StoreCommand::Expire`].
    #[must_use]
    pub fn expire(key: impl Into<String>, ttl: Duration) -> Self {
        Self::Expire {
            key: key.into(),
            ttl,
        }
    }

    /// Builds a [`StoreCommand::TimeToLive`].
    #[must_use]
    pub fn time_to_live(key: impl Into<String>) -> Self {
        Self::TimeToLive { key: key.into() }
    }

    /// Builds a [`StoreCommand::Increment`].
    #[must_use]
    pub fn increment(key: impl Into<String>) -> Self {
        Self::Increment { key: key.into() }
    }

    /// Builds a [`StoreCommand::SortedAdd`].
    #[must_use]
    pub fn sorted_add(key: impl Into<String>, member: impl Into<String>, score: f64) -> Self {
        Self::SortedAdd {
            key: key.into(),
            member: member.into(),
            score,
        }
    }

    /// Builds a [`StoreCommand::SortedAddExisting`].
    #[must_use]
    pub fn sorted_add_existing(
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> Self {
        Self::SortedAddExisting {
            key: key.into(),
            member: member.into(),
            score,
        }
    }

    /// Builds a [`StoreCommand::SortedRemove`].
    #[must_use]
    pub fn sorted_remove(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self::SortedRemove {
            key: key.into(),
            member: member.into(),
        }
    }

    /// Builds a [`StoreCommand::SortedScore`].
    #[must_use]
    pub fn sorted_score(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self::SortedScore {
            key: key.into(),
            member: member.into(),
        }
    }

    /// Builds a [`StoreCommand::SortedRank`].
    #[must_use]
    pub fn sorted_rank(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self::SortedRank {
            key: key.into(),
            member: member.into(),
        }
    }

    /// Builds a [`StoreCommand::SortedCount`].
    #[must_use]
    pub fn sorted_count(key: impl Into<String>) -> Self {
        Self::SortedCount { key: key.into() }
    }

    /// Builds a [`StoreCommand::SortedRangeByRank`].
    #[must_use]
    pub fn sorted_range_by_rank(key: impl Into<String>, start: i64, stop: i64) -> Self {
        Self::SortedRangeByRank {
            key: key.into(),
            start,
            stop,
        }
    }

    /// Builds a [`StoreCommand::SortedRangeByScore`].
    #[must_use]
    pub fn sorted_range_by_score(
        key: impl Into<String>,
        min: ScoreBound,
        max: ScoreBound,
    ) -> Self {
        Self::SortedRangeByScore {
            key: key.into(),
            min,
            max,
        }
    }

    /// Builds a [`StoreCommand::SortedRemoveRangeByScore`].
    #[must_use]
    pub fn sorted_remove_range_by_score(
        key: impl Into<String>,
        min: ScoreBound,
        max: ScoreBound,
    ) -> Self {
        Self::SortedRemoveRangeByScore {
            key: key.into(),
            min,
            max,
        }
    }

    /// Builds a [`StoreCommand::SortedRetainShared`].
    #[must_use]
    pub fn sorted_retain_shared(key: impl Into<String>, filter_key: impl Into<String>) -> Self {
        Self::SortedRetainShared {
            key: key.into(),
            filter_key: filter_key.into(),
        }
    }

    /// Builds a [`StoreCommand::ListPush`].
    #[must_use]
    pub fn list_push(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ListPush {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Builds a [`StoreCommand::ListPopFront`].
    #[must_use]
    pub fn list_pop_front(key: impl Into<String>) -> Self {
        Self::ListPopFront { key: key.into() }
    }

    /// Builds a [`StoreCommand::ListLength`].
    #[must_use]
    pub fn list_length(key: impl Into<String>) -> Self {
        Self::ListLength { key: key.into() }
    }

    /// Builds a [`StoreCommand::ListRange`].
    #[must_use]
    pub fn list_range(key: impl Into<String>, start: i64, stop: i64) -> Self {
        Self::ListRange {
            key: key.into(),
            start,
            stop,
        }
    }
}
