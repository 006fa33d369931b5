use std::time::Duration;

use redis::Value;
use stead_application::{ScoreBound, ScoredMember, StoreCommand, StoreReply};
use stead_core::{AppError, AppResult};

/// Redis command name and arguments for one store command, keys prefixed.
pub(super) fn command_parts(
    command: &StoreCommand,
    key_prefix: &str,
) -> (&'static str, Vec<String>) {
    let key = |key: &str| format!("{key_prefix}:{key}");

    match command {
        StoreCommand::SetIfAbsent {
            key: name,
            value,
            ttl,
        } => {
            let mut args = vec![key(name), value.clone(), "NX".to_owned()];
            if let Some(ttl) = ttl {
                args.push("PX".to_owned());
                args.push(millis(*ttl));
            }
            ("SET", args)
        }
        StoreCommand::Get { key: name } => ("GET", vec![key(name)]),
        StoreCommand::Delete { key: name } => ("DEL", vec![key(name)]),
        StoreCommand::Expire { key: name, ttl } => ("PEXPIRE", vec![key(name), millis(*ttl)]),
        StoreCommand::TimeToLive { key: name } => ("PTTL", vec![key(name)]),
        StoreCommand::Increment { key: name } => ("INCR", vec![key(name)]),
        StoreCommand::SortedAdd {
            key: name,
            member,
            score,
        } => ("ZADD", vec![key(name), score.to_string(), member.clone()]),
        StoreCommand::SortedAddExisting {
            key: name,
            member,
            score,
        } => (
            "ZADD",
            vec![key(name), "XX".to_owned(), score.to_string(), member.clone()],
        ),
        StoreCommand::SortedRemove { key: name, member } => {
            ("ZREM", vec![key(name), member.clone()])
        }
        StoreCommand::SortedScore { key: name, member } => {
            ("ZSCORE", vec![key(name), member.clone()])
        }
        StoreCommand::SortedRank { key: name, member } => {
            ("ZRANK", vec![key(name), member.clone()])
        }
        StoreCommand::SortedCount { key: name } => ("ZCARD", vec![key(name)]),
        StoreCommand::SortedRangeByRank {
            key: name,
            start,
            stop,
        } => (
            "ZRANGE",
            vec![
                key(name),
                start.to_string(),
                stop.to_string(),
                "WITHSCORES".to_owned(),
            ],
        ),
        StoreCommand::SortedRangeByScore {
            key: name,
            min,
            max,
        } => (
            "ZRANGEBYSCORE",
            vec![key(name), bound(*min), bound(*max), "WITHSCORES".to_owned()],
        ),
        StoreCommand::SortedRemoveRangeByScore {
            key: name,
            min,
            max,
        } => ("ZREMRANGEBYSCORE", vec![key(name), bound(*min), bound(*max)]),
        StoreCommand::SortedRetainShared {
            key: name,
            filter_key,
        } => (
            "ZINTERSTORE",
            vec![
                key(name),
                "2".to_owned(),
                key(name),
                key(filter_key),
                "WEIGHTS".to_owned(),
                "1".to_owned(),
                "0".to_owned(),
            ],
        ),
        StoreCommand::ListPush { key: name, value } => ("RPUSH", vec![key(name), value.clone()]),
        StoreCommand::ListPopFront { key: name } => ("LPOP", vec![key(name)]),
        StoreCommand::ListLength { key: name } => ("LLEN", vec![key(name)]),
        StoreCommand::ListRange {
            key: name,
            start,
            stop,
        } => (
            "LRANGE",
            vec![key(name), start.to_string(), stop.to_string()],
        ),
    }
}

pub(super) fn build_command(command: &StoreCommand, key_prefix: &str) -> redis::Cmd {
    let (name, args) = command_parts(command, key_prefix);
    let mut cmd = redis::cmd(name);
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

pub(super) fn decode_replies(
    commands: &[StoreCommand],
    values: Vec<Value>,
) -> AppResult<Vec<StoreReply>> {
    if commands.len() != values.len() {
        return Err(AppError::Internal(format!(
            "redis returned {} replies for {} commands",
            values.len(),
            commands.len()
        )));
    }

    commands
        .iter()
        .zip(values)
        .map(|(command, value)| decode_reply(command, value))
        .collect()
}

pub(super) fn decode_reply(command: &StoreCommand, value: Value) -> AppResult<StoreReply> {
    match command {
        StoreCommand::SetIfAbsent { .. } => Ok(StoreReply::Flag(!matches!(value, Value::Nil))),
        StoreCommand::Expire { .. } => Ok(StoreReply::Flag(integer(value)? == 1)),
        StoreCommand::Get { .. } | StoreCommand::ListPopFront { .. } => match value {
            Value::Nil => Ok(StoreReply::Nil),
            other => text(other).map(StoreReply::Text),
        },
        StoreCommand::SortedScore { .. } => match value {
            Value::Nil => Ok(StoreReply::Nil),
            other => score(other).map(StoreReply::Score),
        },
        StoreCommand::SortedRank { .. } => match value {
            Value::Nil => Ok(StoreReply::Nil),
            other => integer(other).map(StoreReply::Integer),
        },
        StoreCommand::SortedRangeByRank { .. } | StoreCommand::SortedRangeByScore { .. } => {
            scored_members(value).map(StoreReply::Members)
        }
        StoreCommand::ListRange { .. } => array(value)?
            .into_iter()
            .map(text)
            .collect::<AppResult<Vec<_>>>()
            .map(StoreReply::Texts),
        StoreCommand::Delete { .. }
        | StoreCommand::TimeToLive { .. }
        | StoreCommand::Increment { .. }
        | StoreCommand::SortedAdd { .. }
        | StoreCommand::SortedAddExisting { .. }
        | StoreCommand::SortedRemove { .. }
        | StoreCommand::SortedCount { .. }
        | StoreCommand::SortedRemoveRangeByScore { .. }
        | StoreCommand::SortedRetainShared { .. }
        | StoreCommand::ListPush { .. }
        | StoreCommand::ListLength { .. } => integer(value).map(StoreReply::Integer),
    }
}

fn millis(ttl: Duration) -> String {
    ttl.as_millis().max(1).to_string()
}

fn bound(bound: ScoreBound) -> String {
    match bound {
        ScoreBound::NegativeInfinity => "-inf".to_owned(),
        ScoreBound::PositiveInfinity => "+inf".to_owned(),
        ScoreBound::Inclusive(score) => score.to_string(),
        ScoreBound::Exclusive(score) => format!("({score}"),
    }
}

fn unexpected(expected: &str, value: &Value) -> AppError {
    AppError::Unavailable(format!("expected {expected} reply from redis, got {value:?}"))
}

fn integer(value: Value) -> AppResult<i64> {
    match value {
        Value::Int(value) => Ok(value),
        other => Err(unexpected("integer", &other)),
    }
}

fn text(value: Value) -> AppResult<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes)
            .map_err(|error| AppError::Internal(format!("redis value is not utf-8: {error}"))),
        Value::SimpleString(value) => Ok(value),
        other => Err(unexpected("string", &other)),
    }
}

fn score(value: Value) -> AppResult<f64> {
    match value {
        Value::Double(score) => Ok(score),
        Value::Int(score) => Ok(score as f64),
        other => {
            let raw = text(other)?;
            raw.parse::<f64>()
                .map_err(|error| AppError::Internal(format!("invalid score '{raw}': {error}")))
        }
    }
}

fn array(value: Value) -> AppResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Nil => Ok(Vec::new()),
        other => Err(unexpected("array", &other)),
    }
}

/// Parses `WITHSCORES` output: a flat member/score array on RESP2, or an
/// array of two-element pairs on RESP3.
fn scored_members(value: Value) -> AppResult<Vec<ScoredMember>> {
    let items = array(value)?;

    if items.iter().all(|item| matches!(item, Value::Array(_))) {
        return items
            .into_iter()
            .map(|pair| {
                let mut pair = array(pair)?.into_iter();
                match (pair.next(), pair.next()) {
                    (Some(member), Some(value)) => Ok(ScoredMember {
                        member: text(member)?,
                        score: score(value)?,
                    }),
                    _ => Err(AppError::Internal(
                        "redis returned an incomplete member/score pair".to_owned(),
                    )),
                }
            })
            .collect();
    }

    if items.len() % 2 != 0 {
        return Err(AppError::Internal(
            "redis returned an odd member/score array".to_owned(),
        ));
    }

    let mut members = Vec::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(member), Some(value)) = (items.next(), items.next()) {
        members.push(ScoredMember {
            member: text(member)?,
            score: score(value)?,
        });
    }
    Ok(members)
}
