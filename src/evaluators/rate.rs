//! Sliding-window rate limiting, per-(agent, tool) and per-agent.
//!
//! Mirrors the original's `_SlidingWindow`: a monotonic-clock deque of call
//! timestamps, pruned lazily on each check. Check-then-record is not atomic
//! across threads contending for the same key — two concurrent calls can
//! both observe "under limit" and both be admitted, slightly over-admitting
//! under race. This mirrors the original's behavior and is accepted rather
//! than fused into a single compare-and-swap, since exact admission control
//! is not a stated invariant.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::types::{ActionIntent, EvaluatorResult, Verdict};

use super::Evaluator;

/// A parsed rate limit: `max` calls per `period`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max_calls: u32,
    pub period: Duration,
}

impl RateLimit {
    pub fn new(max_calls: u32, period: Duration) -> Self {
        Self { max_calls, period }
    }

    /// Parses strings like `"10/minute"`, `"100/hour"`, `"5/second"`.
    pub fn from_string(spec: &str) -> Result<Self, String> {
        let (count_part, unit_part) = spec
            .split_once('/')
            .ok_or_else(|| format!("invalid rate limit spec: {spec}"))?;
        let max_calls: u32 = count_part
            .trim()
            .parse()
            .map_err(|_| format!("invalid call count in rate limit spec: {spec}"))?;
        let period = match unit_part.trim().to_lowercase().as_str() {
            "second" | "sec" | "s" => Duration::from_secs(1),
            "minute" | "min" | "m" => Duration::from_secs(60),
            "hour" | "hr" | "h" => Duration::from_secs(3600),
            "day" | "d" => Duration::from_secs(86400),
            other => return Err(format!("unknown rate limit unit: {other}")),
        };
        Ok(Self { max_calls, period })
    }
}

#[derive(Default)]
struct SlidingWindow {
    calls: Vec<Instant>,
}

impl SlidingWindow {
    fn prune(&mut self, now: Instant, period: Duration) {
        self.calls.retain(|t| now.duration_since(*t) < period);
    }

    fn check_and_record(&mut self, limit: &RateLimit, now: Instant) -> bool {
        self.prune(now, limit.period);
        if self.calls.len() as u32 >= limit.max_calls {
            return false;
        }
        self.calls.push(now);
        true
    }

    fn count_in_last(&mut self, window: Duration, now: Instant) -> usize {
        self.prune(now, window);
        self.calls.iter().filter(|t| now.duration_since(**t) < window).count()
    }
}

/// Per-tool and per-agent sliding-window rate limiting.
pub struct RateLimiter {
    per_tool_limits: HashMap<String, RateLimit>,
    per_agent_limit: Option<RateLimit>,
    tool_windows: Mutex<HashMap<(String, String), SlidingWindow>>,
    agent_windows: Mutex<HashMap<String, SlidingWindow>>,
}

impl RateLimiter {
    pub fn new(per_tool_limits: HashMap<String, RateLimit>, per_agent_limit: Option<RateLimit>) -> Self {
        Self {
            per_tool_limits,
            per_agent_limit,
            tool_windows: Mutex::new(HashMap::new()),
            agent_windows: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the limit for a tool name, matching exact names first and
    /// then the longest registered prefix (patterns are registered with a
    /// trailing `*`, e.g. `"db.*"`).
    fn limit_for_tool(&self, tool_name: &str) -> Option<&RateLimit> {
        if let Some(limit) = self.per_tool_limits.get(tool_name) {
            return Some(limit);
        }
        self.per_tool_limits
            .iter()
            .filter(|(pattern, _)| pattern.ends_with('*') && tool_name.starts_with(pattern.trim_end_matches('*')))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, limit)| limit)
    }

    /// Number of calls recorded for `agent_id` in the last 5 minutes,
    /// exposed to the condition compiler as the `rate_last_5min()` builtin.
    pub fn last_5min_count(&self, agent_id: &str) -> usize {
        let mut windows = self.agent_windows.lock();
        windows
            .entry(agent_id.to_string())
            .or_default()
            .count_in_last(Duration::from_secs(300), Instant::now())
    }
}

impl Evaluator for RateLimiter {
    fn name(&self) -> &str {
        "rate_limiter"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn evaluate(&self, intent: &ActionIntent) -> EvaluatorResult {
        let now = Instant::now();

        if let Some(limit) = self.limit_for_tool(&intent.tool_name) {
            let key = (intent.agent_id.clone(), intent.tool_name.clone());
            let mut windows = self.tool_windows.lock();
            let window = windows.entry(key).or_default();
            if !window.check_and_record(limit, now) {
                return EvaluatorResult::new(
                    Verdict::Block,
                    format!(
                        "Rate limit exceeded for tool '{}': {} calls per {:?}",
                        intent.tool_name, limit.max_calls, limit.period
                    ),
                    self.name(),
                );
            }
        }

        if let Some(limit) = &self.per_agent_limit {
            let mut windows = self.agent_windows.lock();
            let window = windows.entry(intent.agent_id.clone()).or_default();
            if !window.check_and_record(limit, now) {
                return EvaluatorResult::new(
                    Verdict::Block,
                    format!(
                        "Rate limit exceeded for agent '{}': {} calls per {:?}",
                        intent.agent_id, limit.max_calls, limit.period
                    ),
                    self.name(),
                );
            }
        }

        EvaluatorResult::new(Verdict::Allow, "Within rate limits", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_rate_limit_strings() {
        let limit = RateLimit::from_string("10/minute").unwrap();
        assert_eq!(limit.max_calls, 10);
        assert_eq!(limit.period, Duration::from_secs(60));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(RateLimit::from_string("10/fortnight").is_err());
    }

    #[test]
    fn blocks_once_limit_exceeded() {
        let mut tools = HashMap::new();
        tools.insert("db.query".to_string(), RateLimit::new(2, Duration::from_secs(60)));
        let limiter = RateLimiter::new(tools, None);
        let intent = ActionIntent::new("db.select", "db.query", "agent-1", HashMap::new());

        assert_eq!(limiter.evaluate(&intent).verdict, Verdict::Allow);
        assert_eq!(limiter.evaluate(&intent).verdict, Verdict::Allow);
        assert_eq!(limiter.evaluate(&intent).verdict, Verdict::Block);
    }

    #[test]
    fn prefix_pattern_matches_tool_family() {
        let mut tools = HashMap::new();
        tools.insert("db.*".to_string(), RateLimit::new(1, Duration::from_secs(60)));
        let limiter = RateLimiter::new(tools, None);
        let intent = ActionIntent::new("db.select", "db.query", "agent-1", HashMap::new());

        assert_eq!(limiter.evaluate(&intent).verdict, Verdict::Allow);
        assert_eq!(limiter.evaluate(&intent).verdict, Verdict::Block);
    }
}
