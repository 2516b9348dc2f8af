//! Result parsers (spec §4.7 step 4, §3 "Parser").
//!
//! A parser never raises; empty output is the unit representation of
//! "nothing found" (spec §9: "Exception-driven control flow in parsers").
//! Builtins mirror `examples/original_source/generic_job_scheduler.py`'s
//! `result_parsers` table (`ping_result`, `snmp_result`, `port_result`,
//! `hostname_result`).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::job::Parser;
use crate::model::value::Value;

/// Raw probe/command output handed to a parser.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub text: String,
    pub reachable: Option<bool>,
    pub rtt_ms: Option<f64>,
    pub port_open: Option<bool>,
    pub snmp_value: Option<String>,
    pub hostname: Option<String>,
}

pub fn apply(parser: &Parser, raw: &RawOutput) -> Value {
    match parser {
        Parser::Builtin { name } => apply_builtin(name, raw),
        Parser::Regex { patterns } => apply_regex(patterns, &raw.text),
        Parser::Json => apply_json(&raw.text),
    }
}

fn apply_builtin(name: &str, raw: &RawOutput) -> Value {
    match name {
        "ping_result" => {
            let mut m = BTreeMap::new();
            m.insert("reachable".to_string(), Value::Bool(raw.reachable.unwrap_or(false)));
            if let Some(rtt) = raw.rtt_ms {
                m.insert("rtt_ms".to_string(), Value::Float(rtt));
            }
            Value::Map(m)
        }
        "snmp_result" => match &raw.snmp_value {
            Some(v) => {
                let mut m = BTreeMap::new();
                m.insert("value".to_string(), Value::String(v.clone()));
                Value::Map(m)
            }
            None => Value::Map(BTreeMap::new()),
        },
        "port_result" => {
            let mut m = BTreeMap::new();
            m.insert("open".to_string(), Value::Bool(raw.port_open.unwrap_or(false)));
            Value::Map(m)
        }
        "hostname_result" => match &raw.hostname {
            Some(h) => {
                let mut m = BTreeMap::new();
                m.insert("hostname".to_string(), Value::String(h.clone()));
                Value::Map(m)
            }
            None => Value::Map(BTreeMap::new()),
        },
        _ => Value::Map(BTreeMap::new()),
    }
}

fn apply_regex(patterns: &[String], text: &str) -> Value {
    let mut out = BTreeMap::new();
    for pattern in patterns {
        let re = match compile_cached(pattern) {
            Some(re) => re,
            None => continue,
        };
        if let Some(caps) = re.captures(text) {
            for name in re.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    out.insert(name.to_string(), Value::String(m.as_str().to_string()));
                }
            }
        }
    }
    Value::Map(out)
}

fn compile_cached(pattern: &str) -> Option<Regex> {
    // Parsers are configured, not hot-loop hammered; compiling per call
    // keeps this free of global mutable state (spec §9).
    Regex::new(pattern).ok()
}

fn apply_json(text: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .unwrap_or(Value::Map(BTreeMap::new()))
}

/// Extract vendor/model/version from an SNMP `sysDescr` string
/// (spec §4.10 Stage 4).
pub fn parse_sys_descr(sys_descr: &str, patterns: &[(Regex, &str, &str)]) -> (Option<String>, Option<String>) {
    for (re, vendor, role) in patterns {
        if re.is_match(sys_descr) {
            return (Some(vendor.to_string()), Some(role.to_string()));
        }
    }
    (None, None)
}

static MODEL_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

pub fn extract_model(sys_descr: &str) -> Option<String> {
    let patterns = MODEL_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"Model:\s*(\S+)").unwrap(),
            Regex::new(r"Software,\s*(\S+)\s+Software").unwrap(),
            Regex::new(r"^(\S+)\s+(\S+)\s+Software").unwrap(),
        ]
    });
    for re in patterns {
        if let Some(caps) = re.captures(sys_descr) {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
    }
    None
}

static VERSION_PATTERN: OnceLock<Regex> = OnceLock::new();

pub fn extract_version(sys_descr: &str) -> Option<String> {
    let re = VERSION_PATTERN.get_or_init(|| Regex::new(r"Version\s+([\w.()]+)").unwrap());
    re.captures(sys_descr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_result_parser() {
        let raw = RawOutput {
            reachable: Some(true),
            rtt_ms: Some(1.2),
            ..Default::default()
        };
        let out = apply(&Parser::Builtin { name: "ping_result".into() }, &raw);
        assert_eq!(out.get("reachable"), Some(&Value::Bool(true)));
    }

    #[test]
    fn json_parser_on_garbage_is_empty_not_error() {
        let raw = RawOutput { text: "not json".into(), ..Default::default() };
        let out = apply(&Parser::Json, &raw);
        assert_eq!(out, Value::Map(BTreeMap::new()));
    }

    #[test]
    fn regex_parser_extracts_named_groups() {
        let raw = RawOutput { text: "uptime: 42 days".into(), ..Default::default() };
        let out = apply(
            &Parser::Regex { patterns: vec![r"uptime:\s*(?P<days>\d+)\s*days".to_string()] },
            &raw,
        );
        assert_eq!(out.get("days"), Some(&Value::String("42".to_string())));
    }

    #[test]
    fn extract_model_from_software_string() {
        let descr = "Cisco IOS Software, C3750 Software (C3750-IPSERVICESK9-M), Version 12.2(58)SE2";
        assert_eq!(extract_model(descr), Some("C3750".to_string()));
        assert_eq!(extract_version(descr), Some("12.2(58)SE2".to_string()));
    }
}
