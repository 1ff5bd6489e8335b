//! Parsers for the carrier-config rule grammars.
//!
//! Carrier policy arrives as strings; each grammar parses into the typed
//! structures in `types`. A malformed entry yields a descriptive error and
//! is skipped by the list helpers, never aborting the remaining rules.

use log::warn;
use thiserror::Error;

use crate::types::{
    AccessNetwork, FallbackPreference, FallbackRule, HandoverRule, HandoverRuleKind,
    InitialConnectionFailureRule, NetCapability, ReasonRange, RttPingRule, SignalMeasurement,
    ThresholdGapRule,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("empty rule")]
    Empty,
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unknown access network `{0}`")]
    UnknownAccessNetwork(String),
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    #[error("unknown measurement `{0}`")]
    UnknownMeasurement(String),
    #[error("invalid rule type `{0}`")]
    InvalidRuleType(String),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("invalid range `{0}`")]
    InvalidRange(String),
    #[error("invalid preference `{0}`")]
    InvalidPreference(String),
    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },
    #[error("handover rule must name iwlan in source or target")]
    MissingIwlan,
}

fn parse_access_networks(value: &str) -> Result<Vec<AccessNetwork>, RuleParseError> {
    value
        .split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            AccessNetwork::from_token(t)
                .ok_or_else(|| RuleParseError::UnknownAccessNetwork(t.to_string()))
        })
        .collect()
}

fn parse_capabilities(value: &str) -> Result<Vec<NetCapability>, RuleParseError> {
    value
        .split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            NetCapability::from_token(t)
                .ok_or_else(|| RuleParseError::UnknownCapability(t.to_string()))
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T, RuleParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| RuleParseError::InvalidNumber(value.trim().to_string()))
}

/// Parse one handover rule:
/// `source=<an>[|<an>…], target=<an>[|<an>…], type=allowed|disallowed,
///  capabilities=<cap>[|<cap>…], roaming=true|false`
///
/// `unknown` is forbidden in source and target, and IWLAN must appear in at
/// least one of them. Capabilities may be omitted (rule applies to all).
pub fn parse_handover_rule(rule: &str) -> Result<HandoverRule, RuleParseError> {
    if rule.trim().is_empty() {
        return Err(RuleParseError::Empty);
    }

    let mut sources = None;
    let mut targets = None;
    let mut kind = None;
    let mut capabilities = Vec::new();
    let mut roaming_only = false;

    for part in rule.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| RuleParseError::UnknownKey(part.to_string()))?;
        match key.trim() {
            "source" => sources = Some(parse_access_networks(value)?),
            "target" => targets = Some(parse_access_networks(value)?),
            "type" => {
                kind = Some(match value.trim() {
                    "allowed" => HandoverRuleKind::Allowed,
                    "disallowed" => HandoverRuleKind::Disallowed,
                    other => return Err(RuleParseError::InvalidRuleType(other.to_string())),
                })
            }
            "capabilities" => capabilities = parse_capabilities(value)?,
            "roaming" => roaming_only = value.trim() == "true",
            other => return Err(RuleParseError::UnknownKey(other.to_string())),
        }
    }

    let sources = sources.ok_or(RuleParseError::MissingField("source"))?;
    let targets = targets.ok_or(RuleParseError::MissingField("target"))?;
    let kind = kind.ok_or(RuleParseError::MissingField("type"))?;
    if sources.is_empty() {
        return Err(RuleParseError::MissingField("source"));
    }
    if targets.is_empty() {
        return Err(RuleParseError::MissingField("target"));
    }
    if !sources.contains(&AccessNetwork::Iwlan) && !targets.contains(&AccessNetwork::Iwlan) {
        return Err(RuleParseError::MissingIwlan);
    }

    Ok(HandoverRule {
        sources,
        targets,
        capabilities,
        kind,
        roaming_only,
    })
}

/// Parse one fallback rule:
/// `cause=<code>[|<code>|<a>~<b>…], time=<ms>[, preference=cell|wifi]`
pub fn parse_fallback_rule(rule: &str) -> Result<FallbackRule, RuleParseError> {
    if rule.trim().is_empty() {
        return Err(RuleParseError::Empty);
    }

    let mut reasons = None;
    let mut backoff_ms = None;
    let mut preference = None;

    for part in rule.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| RuleParseError::UnknownKey(part.to_string()))?;
        match key.trim() {
            "cause" => {
                let parsed: Result<Vec<ReasonRange>, RuleParseError> = value
                    .split('|')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|token| {
                        if let Some((lo, hi)) = token.split_once('~') {
                            let lo: i32 = parse_number(lo)?;
                            let hi: i32 = parse_number(hi)?;
                            if lo > hi {
                                return Err(RuleParseError::InvalidRange(token.to_string()));
                            }
                            Ok(ReasonRange { lo, hi })
                        } else {
                            Ok(ReasonRange::single(parse_number(token)?))
                        }
                    })
                    .collect();
                reasons = Some(parsed?);
            }
            "time" => backoff_ms = Some(parse_number::<u64>(value)?),
            "preference" => {
                preference = Some(match value.trim() {
                    "cell" => FallbackPreference::Cell,
                    "wifi" => FallbackPreference::Wifi,
                    other => return Err(RuleParseError::InvalidPreference(other.to_string())),
                })
            }
            other => return Err(RuleParseError::UnknownKey(other.to_string())),
        }
    }

    let reasons = reasons.ok_or(RuleParseError::MissingField("cause"))?;
    if reasons.is_empty() {
        return Err(RuleParseError::MissingField("cause"));
    }
    let backoff_ms = backoff_ms.ok_or(RuleParseError::MissingField("time"))?;

    Ok(FallbackRule {
        reasons,
        backoff_ms,
        preference,
    })
}

/// Parse one initial-connection-failure rule:
/// `<capability>:<retry_count>:<retry_timer_ms>:<fallback_guard_timer_ms>:<max_fallback_count>`
pub fn parse_initial_connection_failure_rule(
    rule: &str,
) -> Result<InitialConnectionFailureRule, RuleParseError> {
    if rule.trim().is_empty() {
        return Err(RuleParseError::Empty);
    }
    let fields: Vec<&str> = rule.split(':').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(RuleParseError::FieldCount {
            expected: 5,
            got: fields.len(),
        });
    }
    let capability = NetCapability::from_token(fields[0])
        .ok_or_else(|| RuleParseError::UnknownCapability(fields[0].to_string()))?;
    Ok(InitialConnectionFailureRule {
        capability,
        retry_count: parse_number(fields[1])?,
        retry_timer_ms: parse_number(fields[2])?,
        fallback_guard_timer_ms: parse_number(fields[3])?,
        max_fallback_count: parse_number(fields[4])?,
    })
}

/// Parse the RTT ping rule:
/// `<server>,<count>,<interval_ms>,<packet_size>,<rtt_ms_criterion>,<rtt_check_interval_ms>,<hyst_fallback_timer_ms>`
pub fn parse_rtt_ping_rule(rule: &str) -> Result<RttPingRule, RuleParseError> {
    if rule.trim().is_empty() {
        return Err(RuleParseError::Empty);
    }
    let fields: Vec<&str> = rule.split(',').map(str::trim).collect();
    if fields.len() != 7 {
        return Err(RuleParseError::FieldCount {
            expected: 7,
            got: fields.len(),
        });
    }
    if fields[0].is_empty() {
        return Err(RuleParseError::MissingField("server"));
    }
    Ok(RttPingRule {
        server: fields[0].to_string(),
        count: parse_number(fields[1])?,
        interval_ms: parse_number(fields[2])?,
        packet_size: parse_number(fields[3])?,
        rtt_criterion_ms: parse_number(fields[4])?,
        check_interval_ms: parse_number(fields[5])?,
        hysteresis_fallback_ms: parse_number(fields[6])?,
    })
}

/// Parse one threshold-gap-with-guard rule:
/// `<access_network>:<meas_type>:<signed_gap>`
pub fn parse_threshold_gap_rule(rule: &str) -> Result<ThresholdGapRule, RuleParseError> {
    if rule.trim().is_empty() {
        return Err(RuleParseError::Empty);
    }
    let fields: Vec<&str> = rule.split(':').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(RuleParseError::FieldCount {
            expected: 3,
            got: fields.len(),
        });
    }
    let access_network = AccessNetwork::from_token(fields[0])
        .ok_or_else(|| RuleParseError::UnknownAccessNetwork(fields[0].to_string()))?;
    let measurement = SignalMeasurement::from_token(fields[1])
        .ok_or_else(|| RuleParseError::UnknownMeasurement(fields[1].to_string()))?;
    Ok(ThresholdGapRule {
        access_network,
        measurement,
        gap: parse_number(fields[2])?,
    })
}

/// Parse a whole rule list, logging and skipping malformed entries so one
/// bad rule never drops the rest of the policy.
pub fn parse_rule_list<T, F>(rules: &[String], what: &str, parse: F) -> Vec<T>
where
    F: Fn(&str) -> Result<T, RuleParseError>,
{
    let mut parsed = Vec::with_capacity(rules.len());
    for rule in rules {
        match parse(rule) {
            Ok(r) => parsed.push(r),
            Err(e) => warn!("discarding malformed {what} rule `{rule}`: {e}"),
        }
    }
    parsed
}
