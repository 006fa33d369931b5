use std::env;
use std::time::Duration;

use stead_core::{AppError, AppResult};

#[derive(Debug, Clone)]
pub(crate) struct WorkerConfig {
    pub(crate) redis_url: String,
    pub(crate) key_prefix: String,
    pub(crate) worker_id: String,
    pub(crate) queues: Vec<String>,
    pub(crate) log_tasks: Vec<String>,
    pub(crate) pollers: usize,
    pub(crate) poll_interval: Duration,
}

impl WorkerConfig {
    pub(crate) fn load() -> AppResult<Self> {
        let redis_url = required_env("REDIS_URL")?;
        let key_prefix = env::var("COORDINATION_KEY_PREFIX")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "stead".to_owned());
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let queues = parse_list(
            "WORKER_QUEUES",
            env::var("WORKER_QUEUES").ok().as_deref(),
            "default",
        )?;
        let log_tasks = parse_list(
            "WORKER_LOG_TASKS",
            env::var("WORKER_LOG_TASKS").ok().as_deref(),
            "log",
        )?;
        let pollers = parse_env_usize("WORKER_POLLERS", 1)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 10)?;

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            redis_url,
            key_prefix,
            worker_id,
            queues,
            log_tasks,
            pollers,
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }
}

/// Splits a comma separated list, falling back to `default` when unset.
fn parse_list(name: &str, value: Option<&str>, default: &str) -> AppResult<Vec<String>> {
    let items: Vec<String> = value
        .unwrap_or(default)
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect();

    if items.is_empty() {
        return Err(AppError::Validation(format!(
            "{name} must name at least one entry"
        )));
    }

    Ok(items)
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_list;

    #[test]
    fn queue_list_keeps_priority_order() {
        let queues = parse_list("WORKER_QUEUES", Some(" high, low ,,default"), "default");
        assert!(queues.is_ok());
        assert_eq!(
            queues.unwrap_or_default(),
            vec!["high".to_owned(), "low".to_owned(), "default".to_owned()]
        );
    }

    #[test]
    fn unset_list_uses_default() {
        let queues = parse_list("WORKER_QUEUES", None, "default");
        assert_eq!(queues.unwrap_or_default(), vec!["default".to_owned()]);
    }

    #[test]
    fn blank_list_is_rejected() {
        assert!(parse_list("WORKER_QUEUES", Some(" , "), "default").is_err());
    }
}
