use std::time::Duration;

use stead_core::{AppError, AppResult};

/// Sorted-set member together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    /// Member value.
    pub member: String,
    /// Member score.
    pub score: f64,
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given duration.
    Expiring(Duration),
}

/// Reply to one [`StoreCommand`](super::StoreCommand).
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    /// Missing key, member or list item.
    Nil,
    /// Yes/no outcome of a conditional write.
    Flag(bool),
    /// Count, counter value, rank or length.
    Integer(i64),
    /// Sorted-set score.
    Score(f64),
    /// String value or popped list item.
    Text(String),
    /// Range of list items.
    Texts(Vec<String>),
    /// Range of sorted-set members with scores.
    Members(Vec<ScoredMember>),
}

impl StoreReply {
    /// Returns the flag of a conditional write.
    pub fn into_flag(self) -> AppResult<bool> {
        match self {
            Self::Flag(value) => Ok(value),
            other => Err(unexpected("flag", &other)),
        }
    }

    /// Returns an integer reply.
    pub fn into_integer(self) -> AppResult<i64> {
        match self {
            Self::Integer(value) => Ok(value),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Returns an integer reply that may be nil.
    pub fn into_optional_integer(self) -> AppResult<Option<i64>> {
        match self {
            Self::Nil => Ok(None),
            Self::Integer(value) => Ok(Some(value)),
            other => Err(unexpected("optional integer", &other)),
        }
    }

    /// Returns a score reply that may be nil.
    pub fn into_optional_score(self) -> AppResult<Option<f64>> {
        match self {
            Self::Nil => Ok(None),
            Self::Score(value) => Ok(Some(value)),
            other => Err(unexpected("optional score", &other)),
        }
    }

    /// Returns a text reply that may be nil.
    pub fn into_optional_text(self) -> AppResult<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Text(value) => Ok(Some(value)),
            other => Err(unexpected("optional text", &other)),
        }
    }

    /// Returns a list range reply.
    pub fn into_texts(self) -> AppResult<Vec<String>> {
        match self {
            Self::Texts(values) => Ok(values),
            other => Err(unexpected("texts", &other)),
        }
    }

    /// Returns a sorted-set range reply.
    pub fn into_members(self) -> AppResult<Vec<ScoredMember>> {
        match self {
            Self::Members(members) => Ok(members),
            other => Err(unexpected("members", &other)),
        }
    }

    /// Interprets a [`StoreCommand::TimeToLive`](super::StoreCommand::TimeToLive) reply.
    pub fn into_ttl(self) -> AppResult<KeyTtl> {
        match self.into_integer()? {
            -2 => Ok(KeyTtl::Missing),
            -1 => Ok(KeyTtl::Persistent),
            millis if millis >= 0 => Ok(KeyTtl::Expiring(Duration::from_millis(
                millis.unsigned_abs(),
            ))),
            millis => Err(AppError::Internal(format!(
                "invalid remaining ttl reply: {millis}"
            ))),
        }
    }
}

fn unexpected(expected: &str, reply: &StoreReply) -> AppError {
    AppError::Internal(format!(
        "unexpected store reply: expected {expected}, got {reply:?}"
    ))
}

/// Pops the next reply of a batch, failing when the store returned fewer
/// replies than commands.
pub fn next_reply(replies: &mut impl Iterator<Item = StoreReply>) -> AppResult<StoreReply> {
    replies
        .next()
        .ok_or_else(|| AppError::Internal("store returned fewer replies than commands".to_owned()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stead_core::AppError;

    use super::{KeyTtl, StoreReply, next_reply};

    #[test]
    fn ttl_reply_distinguishes_missing_and_persistent_keys() {
        assert!(matches!(
            StoreReply::Integer(-2).into_ttl(),
            Ok(KeyTtl::Missing)
        ));
        assert!(matches!(
            StoreReply::Integer(-1).into_ttl(),
            Ok(KeyTtl::Persistent)
        ));
        assert!(matches!(
            StoreReply::Integer(1500).into_ttl(),
            Ok(KeyTtl::Expiring(remaining)) if remaining == Duration::from_millis(1500)
        ));
    }

    #[test]
    fn mismatched_reply_shape_is_internal_error() {
        let result = StoreReply::Text("value".to_owned()).into_integer();
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn nil_reads_as_absent_optional_values() {
        assert!(matches!(StoreReply::Nil.into_optional_score(), Ok(None)));
        assert!(matches!(StoreReply::Nil.into_optional_text(), Ok(None)));
        assert!(matches!(StoreReply::Nil.into_optional_integer(), Ok(None)));
    }

    #[test]
    fn short_batch_is_reported() {
        let mut replies = vec![StoreReply::Flag(true)].into_iter();
        assert!(next_reply(&mut replies).is_ok());
        assert!(next_reply(&mut replies).is_err());
    }
}
