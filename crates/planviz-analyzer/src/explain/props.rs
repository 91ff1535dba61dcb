//! Property Extractors - single-purpose matchers for property-line dialects.
//!
//! Each extractor recognizes one dialect (buffers, WAL, I/O timings, sort
//! method, sort key, sort groups, JIT options/timing, settings) and mutates
//! the target record. Extractors are tried in a fixed priority order; the
//! first match claims the line. A line claimed by no extractor degrades to a
//! verbatim key/value capture, and a line that cannot even be split into a
//! key/value pair is dropped.

use crate::explain::plan::{
    JitInfo, PlanNode, PropValue, SortGroups, SortSpaceMemory, SortSpaceType, Worker,
};
use crate::explain::split::split_balanced;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static SORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Sort Method:\s+(?P<method>.*)\s+(?P<space_type>Memory|Disk):\s+(?P<space>\S*)kB\s*$")
        .expect("valid regex")
});

static SORT_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<kind>Sort|Presorted) Key:\s+(?P<rest>.*)").expect("valid regex")
});

static BUFFERS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Buffers:\s+(?P<rest>.*?)\s*$").expect("valid regex"));

static BUFFER_GROUP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<location>shared|temp|local)\s+(?P<rest>.*)$").expect("valid regex"));

static WAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"WAL:\s+(?P<rest>.*?)\s*$").expect("valid regex"));

static IO_TIMINGS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"I/O Timings:\s+(?P<rest>.*?)\s*$").expect("valid regex"));

static OPTIONS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Options:\s+(?P<rest>.*)$").expect("valid regex"));

static TIMING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Timing:\s+(?P<rest>.*)$").expect("valid regex"));

static SETTINGS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Settings:\s*(?P<rest>.*)$").expect("valid regex"));

static SORT_GROUPS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<kind>Full-sort|Pre-sorted) Groups:\s+(?P<count>[0-9]*)\s+Sort Method[s]*:\s+(?P<methods>.*)\s+Average Memory:\s+(?P<average>\S*)kB\s+Peak Memory:\s+(?P<peak>\S*)kB.*$",
    )
    .expect("valid regex")
});

static ENTRY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<key>\S*)\s+(?P<value>.*)$").expect("valid regex"));

static SETTING_ENTRY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<key>\S*)\s+=\s+(?P<value>.*)$").expect("valid regex"));

/// A parsed `Sort Method:` line.
#[derive(Debug, PartialEq)]
pub struct SortLine {
    pub method: String,
    pub space_used: Option<u64>,
    pub space_type: SortSpaceType,
}

/// Which sort-key dialect matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKeyKind {
    Sort,
    Presorted,
}

/// Which sort-groups dialect matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortGroupsKind {
    FullSort,
    PreSorted,
}

/// `Sort Method: <method>  (Memory|Disk): <n>kB`
pub fn sort_line(text: &str) -> Option<SortLine> {
    let caps = SORT_REGEX.captures(text)?;
    Some(SortLine {
        method: caps["method"].trim().to_string(),
        space_used: caps["space"].parse().ok(),
        space_type: SortSpaceType::from_label(&caps["space_type"])?,
    })
}

/// `(Sort|Presorted) Key: <comma list>`, split balanced and trimmed.
pub fn sort_key_line(text: &str) -> Option<(SortKeyKind, Vec<String>)> {
    let caps = SORT_KEY_REGEX.captures(text)?;
    let kind = if &caps["kind"] == "Presorted" {
        SortKeyKind::Presorted
    } else {
        SortKeyKind::Sort
    };
    let keys = split_balanced(&caps["rest"], ',')
        .iter()
        .map(|k| k.trim().to_string())
        .collect();
    Some((kind, keys))
}

/// `Buffers: shared hit=.. read=.., temp read=.. written=..`
///
/// For each named category the four counters are zero-initialized, then the
/// present keys overwrite them.
pub fn apply_buffers(node: &mut PlanNode, text: &str) -> bool {
    let Some(caps) = BUFFERS_REGEX.captures(text) else {
        return false;
    };
    let rest = caps["rest"].to_string();

    for group in rest.split(',').map(str::trim) {
        let Some(group_caps) = BUFFER_GROUP_REGEX.captures(group) else {
            continue;
        };
        let location = group_caps["location"].to_string();
        let mut unknown: Vec<(String, u64)> = Vec::new();
        {
            let [hit, read, written, dirtied] = buffer_slots(node, &location);
            *hit = Some(0);
            *read = Some(0);
            *written = Some(0);
            *dirtied = Some(0);
            for token in group_caps["rest"].split_whitespace() {
                let Some((key, value)) = token.split_once('=') else {
                    continue;
                };
                let Ok(value) = value.parse::<u64>() else {
                    continue;
                };
                match key {
                    "hit" => *hit = Some(value),
                    "read" => *read = Some(value),
                    "written" => *written = Some(value),
                    "dirtied" => *dirtied = Some(value),
                    other => unknown.push((other.to_string(), value)),
                }
            }
        }
        for (key, value) in unknown {
            node.extra.insert(
                format!("{} {} Blocks", capitalize(&location), capitalize(&key)),
                PropValue::Number(value as f64),
            );
        }
    }
    true
}

fn buffer_slots<'a>(node: &'a mut PlanNode, location: &str) -> [&'a mut Option<u64>; 4] {
    match location {
        "local" => [
            &mut node.local_hit_blocks,
            &mut node.local_read_blocks,
            &mut node.local_written_blocks,
            &mut node.local_dirtied_blocks,
        ],
        "temp" => [
            &mut node.temp_hit_blocks,
            &mut node.temp_read_blocks,
            &mut node.temp_written_blocks,
            &mut node.temp_dirtied_blocks,
        ],
        _ => [
            &mut node.shared_hit_blocks,
            &mut node.shared_read_blocks,
            &mut node.shared_written_blocks,
            &mut node.shared_dirtied_blocks,
        ],
    }
}

/// `WAL: records=.. bytes=.. fpi=..`
pub fn apply_wal(node: &mut PlanNode, text: &str) -> bool {
    let Some(caps) = WAL_REGEX.captures(text) else {
        return false;
    };
    node.wal_records = Some(0);
    node.wal_bytes = Some(0);
    node.wal_fpi = Some(0);
    let rest = caps["rest"].to_string();
    for token in rest.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        match key {
            "records" => node.wal_records = Some(value),
            "bytes" => node.wal_bytes = Some(value),
            "fpi" => node.wal_fpi = Some(value),
            other => {
                node.extra.insert(
                    format!("WAL {}", capitalize(other)),
                    PropValue::Number(value as f64),
                );
            }
        }
    }
    true
}

/// `I/O Timings: read=.. write=..`
pub fn apply_io_timings(node: &mut PlanNode, text: &str) -> bool {
    let Some(caps) = IO_TIMINGS_REGEX.captures(text) else {
        return false;
    };
    node.io_read_time = Some(0.0);
    node.io_write_time = Some(0.0);
    let rest = caps["rest"].to_string();
    for token in rest.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let Ok(value) = value.parse::<f64>() else {
            continue;
        };
        match key {
            "read" => node.io_read_time = Some(value),
            "write" => node.io_write_time = Some(value),
            _ => {}
        }
    }
    true
}

/// `Options: Inlining false, Optimization false, ...` (JIT block).
///
/// Each value is parsed as a JSON literal; values that are not valid JSON are
/// kept as text.
pub fn options_line(text: &str) -> Option<BTreeMap<String, PropValue>> {
    let caps = OPTIONS_REGEX.captures(text)?;
    let mut options = BTreeMap::new();
    for entry in caps["rest"].split(',').map(str::trim) {
        if let Some(entry_caps) = ENTRY_REGEX.captures(entry) {
            let value = serde_json::from_str::<PropValue>(&entry_caps["value"])
                .unwrap_or_else(|_| PropValue::Text(entry_caps["value"].to_string()));
            options.insert(entry_caps["key"].to_string(), value);
        }
    }
    Some(options)
}

/// `Timing: Generation 0.340 ms, Inlining 0.000 ms, ...` (JIT block).
pub fn timing_line(text: &str) -> Option<BTreeMap<String, f64>> {
    let caps = TIMING_REGEX.captures(text)?;
    let mut timing = BTreeMap::new();
    for entry in caps["rest"].split(',').map(str::trim) {
        if let Some(entry_caps) = ENTRY_REGEX.captures(entry)
            && let Ok(value) = strip_ms(&entry_caps["value"]).parse::<f64>()
        {
            timing.insert(entry_caps["key"].to_string(), value);
        }
    }
    Some(timing)
}

/// `Settings: work_mem = '4MB', search_path = 'public, s1'`
pub fn settings_line(text: &str) -> Option<BTreeMap<String, String>> {
    let caps = SETTINGS_REGEX.captures(text)?;
    let mut settings = BTreeMap::new();
    for entry in split_balanced(&caps["rest"], ',') {
        if let Some(entry_caps) = SETTING_ENTRY_REGEX.captures(entry.trim()) {
            settings.insert(
                entry_caps["key"].to_string(),
                entry_caps["value"].trim_matches('\'').to_string(),
            );
        }
    }
    Some(settings)
}

/// `(Full-sort|Pre-sorted) Groups: <n> Sort Method(s): <list>
///  Average Memory: <n>kB Peak Memory: <n>kB`
///
/// The phrase order is fixed; reordered dialects fall through to the generic
/// fallback.
pub fn sort_groups_line(text: &str) -> Option<(SortGroupsKind, SortGroups)> {
    let caps = SORT_GROUPS_REGEX.captures(text)?;
    let kind = if &caps["kind"] == "Full-sort" {
        SortGroupsKind::FullSort
    } else {
        SortGroupsKind::PreSorted
    };
    let groups = SortGroups {
        group_count: caps["count"].parse().ok()?,
        sort_methods_used: caps["methods"]
            .split(',')
            .map(|m| m.trim().to_string())
            .collect(),
        sort_space_memory: SortSpaceMemory {
            average_sort_space_used: caps["average"].parse().ok()?,
            peak_sort_space_used: caps["peak"].parse().ok()?,
        },
    };
    Some((kind, groups))
}

/// Generic fallback: splits on the first `": "`, strips a trailing `" ms"`
/// unit, coerces the value to a number when the whole string parses, and
/// title-cases keys that mention a time or runtime.
pub fn fallback_pair(text: &str) -> Option<(String, PropValue)> {
    let (key, value) = text.split_once(": ")?;
    if value.is_empty() {
        return None;
    }
    let stripped = strip_ms(value);
    let value = match stripped.parse::<f64>() {
        Ok(number) => PropValue::Number(number),
        Err(_) => PropValue::Text(stripped.to_string()),
    };
    let lowered = key.to_lowercase();
    let key = if lowered.contains("runtime") || lowered.contains("time") {
        title_case(key)
    } else {
        key.to_string()
    };
    Some((key, value))
}

/// Runs the extractor chain against a plan node, in priority order.
pub fn apply_node_property(node: &mut PlanNode, text: &str) {
    if let Some(sort) = sort_line(text) {
        node.sort_method = Some(sort.method);
        node.sort_space_used = sort.space_used;
        node.sort_space_type = Some(sort.space_type);
        return;
    }
    if let Some((kind, keys)) = sort_key_line(text) {
        match kind {
            SortKeyKind::Sort => node.sort_key = Some(keys),
            SortKeyKind::Presorted => node.presorted_key = Some(keys),
        }
        return;
    }
    if apply_buffers(node, text) {
        return;
    }
    if apply_wal(node, text) {
        return;
    }
    if apply_io_timings(node, text) {
        return;
    }
    if let Some(options) = options_line(text) {
        node.extra.insert(
            "Options".to_string(),
            PropValue::Map(options),
        );
        return;
    }
    if let Some(timing) = timing_line(text) {
        let timing = timing
            .into_iter()
            .map(|(k, v)| (k, PropValue::Number(v)))
            .collect();
        node.extra.insert("Timing".to_string(), PropValue::Map(timing));
        return;
    }
    if let Some(settings) = settings_line(text) {
        let settings = settings
            .into_iter()
            .map(|(k, v)| (k, PropValue::Text(v)))
            .collect();
        node.extra.insert("Settings".to_string(), PropValue::Map(settings));
        return;
    }
    if let Some((kind, groups)) = sort_groups_line(text) {
        match kind {
            SortGroupsKind::FullSort => node.full_sort_groups = Some(groups),
            SortGroupsKind::PreSorted => node.pre_sorted_groups = Some(groups),
        }
        return;
    }
    if let Some((key, value)) = fallback_pair(text) {
        node.extra.insert(key, value);
    } else {
        tracing::debug!(line = text, "property line without key/value separator dropped");
    }
}

/// Runs the worker-side chain: the sort extractor first, then a raw
/// title-cased key/value capture. Worker properties without a `": "`
/// separator are dropped.
pub fn apply_worker_property(worker: &mut Worker, text: &str) {
    if let Some(sort) = sort_line(text) {
        worker.sort_method = Some(sort.method);
        worker.sort_space_used = sort.space_used;
        worker.sort_space_type = Some(sort.space_type);
        return;
    }
    let Some((key, value)) = text.split_once(": ") else {
        tracing::debug!(line = text, "worker property without key/value separator dropped");
        return;
    };
    if value.is_empty() {
        return;
    }
    worker
        .extra
        .insert(title_case(key), PropValue::Text(value.to_string()));
}

/// Runs the JIT-side chain: options, timing, then the generic fallback.
pub fn apply_jit_property(jit: &mut JitInfo, text: &str) {
    if let Some(options) = options_line(text) {
        jit.options = Some(options);
        return;
    }
    if let Some(timing) = timing_line(text) {
        jit.timing = Some(timing);
        return;
    }
    if let Some((key, value)) = fallback_pair(text) {
        jit.extra.insert(key, value);
    }
}

/// Strips a trailing " ms" unit.
fn strip_ms(value: &str) -> &str {
    let trimmed = value.trim_end();
    match trimmed.strip_suffix("ms") {
        Some(rest) => rest.trim_end(),
        None => trimmed,
    }
}

/// Uppercases the first letter of each whitespace-separated word.
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(capitalize_first)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Uppercases the first letter and lowercases the rest.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests;
