//! Line Grammar / Node Factory - classification of logical plan lines.
//!
//! Each logical line is classified into exactly one of the line dialects
//! understood by the tree builder. Patterns are compiled once and tried in a
//! fixed precedence order: empty / comment header, sub-plan and CTE markers
//! (which win over the operator grammar), operator declarations, worker
//! lines, trigger lines, the JIT marker, and finally generic property lines.
//!
//! The combined cost/actual grammar of operator lines has three alternative
//! branches (estimate followed by actuals, estimate only, actuals only).
//! Each branch carries its own named-capture prefix (`ea_`/`aa_`, `eo_`,
//! `ao_`) and the branches are coalesced by name after the match.

use crate::explain::plan::{JoinKind, ParentRelationship, PlanNode, Trigger};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// One classified logical line.
#[derive(Debug)]
pub enum Line {
    /// Blank line, or a line too short to carry content.
    Empty,
    /// Comment/header line ("QUERY ...", "---...", "# ...").
    Header,
    /// Operator declaration; the node is already populated with operator
    /// metadata and cost/actual statistics.
    Node(PlanNode),
    /// "SubPlan n" / "InitPlan n (returns ...)" marker.
    SubPlanMarker {
        relationship: ParentRelationship,
        label: String,
    },
    /// "CTE <name>" marker.
    CteMarker { label: String },
    /// "Worker n: ..." per-worker statistics line.
    Worker(WorkerLine),
    /// "Trigger <name>: time=... calls=..." line.
    Trigger(Trigger),
    /// "JIT:" block marker.
    Jit,
    /// Anything else: a generic property line, trimmed.
    Property(String),
}

/// Parsed contents of a worker line.
#[derive(Debug)]
pub struct WorkerLine {
    pub number: u64,
    /// Present only when the timed actual clause matched.
    pub actual: Option<WorkerActual>,
    /// Remainder of the line after the actual clause.
    pub rest: String,
}

#[derive(Debug)]
pub struct WorkerActual {
    pub startup_time: f64,
    pub total_time: f64,
    pub rows: u64,
    pub loops: u64,
}

fn estimate_clause(tag: &str) -> String {
    format!(
        r"\(cost=(?P<{tag}_startup>\d+\.\d+)\.\.(?P<{tag}_total>\d+\.\d+)\s+rows=(?P<{tag}_rows>\d+)\s+width=(?P<{tag}_width>\d+)\)"
    )
}

fn actual_clause(tag: &str) -> String {
    format!(
        r"(?:actual\s+time=(?P<{tag}_time_start>\d+\.\d+)\.\.(?P<{tag}_time_end>\d+\.\d+)\s+rows=(?P<{tag}_rows>\d+)\s+loops=(?P<{tag}_loops>\d+)|actual\s+rows=(?P<{tag}_rows_only>\d+)\s+loops=(?P<{tag}_loops_only>\d+)|(?P<{tag}_never>never\s+executed))"
    )
}

static NODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let estimate_and_actual = format!(r"(?:{}\s+\({}\))", estimate_clause("ea"), actual_clause("aa"));
    let estimate_only = format!(r"(?:{})", estimate_clause("eo"));
    let actual_only = format!(r"(?:\({}\))", actual_clause("ao"));
    let pattern = format!(
        r"^(?:\s*->\s*|\s*)(?P<node_type>[^\r\n\t\f\v:(]*?)\s*(?:{estimate_and_actual}|{estimate_only}|{actual_only})\s*$"
    );
    Regex::new(&pattern).expect("valid regex")
});

static SUBPLAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*((?:Sub|Init)Plan)\s*(?:\d+\s*)?\s*(?:\(returns.*\)\s*)?$")
        .expect("valid regex")
});

static CTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*CTE\s+(?P<name>\S+)\s*$").expect("valid regex"));

static TRIGGER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Trigger\s+(?P<name>.*):\s+time=(?P<time>\d+\.\d+)\s+calls=(?P<calls>\d+)\s*$")
        .expect("valid regex")
});

static WORKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"^\s*Worker\s+(?P<number>\d+):\s+(?:{})?(?P<rest>.*?)\s*$",
        actual_clause("wa")
    );
    Regex::new(&pattern).expect("valid regex")
});

static JIT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*JIT:\s*$").expect("valid regex"));

// Operator-string decomposition, tried in order; first match wins.
static SCAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:Parallel\s+)?(?:Seq\sScan|Tid.*Scan|Bitmap\s+Heap\s+Scan|(?:Async\s+)?Foreign\s+Scan|Update|Insert|Delete))\son\s(\S+)(?:\s+(\S+))?$",
    )
    .expect("valid regex")
});

static BITMAP_INDEX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Bitmap\s+Index\s+Scan)\son\s(\S+)$").expect("valid regex"));

static INDEX_SCAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:Parallel\s+)?Index(?:\sOnly)?\sScan(?:\sBackward)?)\susing\s(\S+)\son\s(\S+)(?:\s+(\S+))?$",
    )
    .expect("valid regex")
});

static CTE_SCAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(CTE\sScan)\son\s(\S+)(?:\s+(\S+))?$").expect("valid regex"));

static FUNCTION_SCAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Function\sScan)\son\s(\S+)(?:\s+(\S+))?$").expect("valid regex")
});

static SUBQUERY_SCAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Subquery\sScan)\son\s(.+)$").expect("valid regex"));

static JOIN_MODIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)\s+(Full|Left|Right|Anti)\s+Join$").expect("valid regex"));

/// Classifies one indentation-stripped logical line.
pub fn classify(line: &str) -> Line {
    if line.trim().is_empty() {
        return Line::Empty;
    }
    let trimmed_start = line.trim_start();
    if trimmed_start.starts_with("QUERY")
        || trimmed_start.starts_with("---")
        || trimmed_start.starts_with('#')
    {
        return Line::Header;
    }

    let sub = SUBPLAN_REGEX.captures(line);
    let cte = CTE_REGEX.captures(line);

    if sub.is_none()
        && cte.is_none()
        && let Some(node) = parse_node_line(line)
    {
        return Line::Node(node);
    }
    if let Some(caps) = sub {
        let relationship = if &caps[1] == "InitPlan" {
            ParentRelationship::InitPlan
        } else {
            ParentRelationship::SubPlan
        };
        let label = caps[0].trim().to_string();
        return Line::SubPlanMarker {
            relationship,
            label,
        };
    }
    if let Some(caps) = cte {
        return Line::CteMarker {
            label: format!("CTE {}", &caps["name"]),
        };
    }
    if let Some(worker) = parse_worker_line(line) {
        return Line::Worker(worker);
    }
    if let Some(trigger) = parse_trigger_line(line) {
        return Line::Trigger(trigger);
    }
    if JIT_REGEX.is_match(line) {
        return Line::Jit;
    }

    let trimmed = line.trim();
    if trimmed.chars().count() >= 2 {
        Line::Property(trimmed.to_string())
    } else {
        Line::Empty
    }
}

/// Parses an operator-declaration line, or returns None if the line does not
/// carry the mandatory cost/actual statistics.
pub fn parse_node_line(line: &str) -> Option<PlanNode> {
    let caps = NODE_REGEX.captures(line)?;
    let kind = caps.name("node_type").map_or("", |m| m.as_str());
    let mut node = make_node(kind);

    if let (Some(startup), Some(total)) = (
        cap_f64(&caps, &["ea_startup", "eo_startup"]),
        cap_f64(&caps, &["ea_total", "eo_total"]),
    ) {
        node.startup_cost = Some(startup);
        node.total_cost = Some(total);
        node.plan_rows = cap_u64(&caps, &["ea_rows", "eo_rows"]);
        node.plan_width = cap_u64(&caps, &["ea_width", "eo_width"]);
    }

    if let (Some(start), Some(end)) = (
        cap_f64(&caps, &["aa_time_start", "ao_time_start"]),
        cap_f64(&caps, &["aa_time_end", "ao_time_end"]),
    ) {
        node.actual_startup_time = Some(start);
        node.actual_total_time = Some(end);
    }

    if let Some(rows) = cap_u64(&caps, &["aa_rows", "aa_rows_only", "ao_rows", "ao_rows_only"]) {
        node.actual_rows = Some(rows);
        node.actual_loops = cap_u64(&caps, &["aa_loops", "aa_loops_only", "ao_loops", "ao_loops_only"]);
    }

    // "never executed" wins over any partial actual match.
    if cap_present(&caps, &["aa_never", "ao_never"]) {
        node.actual_loops = Some(0);
        node.actual_rows = Some(0);
        node.actual_total_time = Some(0.0);
    }

    Some(node)
}

/// Builds a node from the raw operator-type string, decomposing relation,
/// index, function and CTE names, the parallel prefix and the join modifier.
fn make_node(kind: &str) -> PlanNode {
    let mut node = PlanNode::new(kind);

    if let Some(caps) = SCAN_REGEX.captures(kind) {
        node.node_type = caps[1].to_string();
        node.relation = Some(caps[2].to_string());
        if let Some(alias) = caps.get(3) {
            node.alias = Some(alias.as_str().to_string());
        }
    } else if let Some(caps) = BITMAP_INDEX_REGEX.captures(kind) {
        node.node_type = caps[1].to_string();
        node.index = Some(caps[2].to_string());
    } else if let Some(caps) = INDEX_SCAN_REGEX.captures(kind) {
        node.node_type = caps[1].to_string();
        node.index = Some(caps[2].to_string());
        node.relation = Some(caps[3].to_string());
        if let Some(alias) = caps.get(4) {
            node.alias = Some(alias.as_str().to_string());
        }
    } else if let Some(caps) = CTE_SCAN_REGEX.captures(kind) {
        node.node_type = caps[1].to_string();
        node.cte_name = Some(caps[2].to_string());
        if let Some(alias) = caps.get(3) {
            node.alias = Some(alias.as_str().to_string());
        }
    } else if let Some(caps) = FUNCTION_SCAN_REGEX.captures(kind) {
        node.node_type = caps[1].to_string();
        node.function_name = Some(caps[2].to_string());
        if let Some(alias) = caps.get(3) {
            node.alias = Some(alias.as_str().to_string());
        }
    } else if let Some(caps) = SUBQUERY_SCAN_REGEX.captures(kind) {
        node.node_type = caps[1].to_string();
        node.relation = Some(caps[2].to_string());
    }

    if let Some(rest) = node.node_type.strip_prefix("Parallel ").map(str::to_string) {
        node.node_type = rest;
        node.parallel_aware = true;
    }

    let modifier = JOIN_MODIFIER_REGEX
        .captures(&node.node_type)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()));
    if let Some((base, modifier)) = modifier {
        node.join_type = JoinKind::from_modifier(&modifier);
        node.node_type = format!("{base} Join");
    }

    node
}

/// Parses a "Worker n: ..." line.
pub fn parse_worker_line(line: &str) -> Option<WorkerLine> {
    let caps = WORKER_REGEX.captures(line)?;
    let number = caps.name("number")?.as_str().parse().ok()?;

    let actual = match (
        cap_f64(&caps, &["wa_time_start"]),
        cap_f64(&caps, &["wa_time_end"]),
    ) {
        (Some(startup_time), Some(total_time)) => Some(WorkerActual {
            startup_time,
            total_time,
            rows: cap_u64(&caps, &["wa_rows"]).unwrap_or(0),
            loops: cap_u64(&caps, &["wa_loops"]).unwrap_or(0),
        }),
        _ => None,
    };

    Some(WorkerLine {
        number,
        actual,
        rest: caps.name("rest").map_or(String::new(), |m| m.as_str().to_string()),
    })
}

/// Parses a "Trigger <name>: time=... calls=..." line.
pub fn parse_trigger_line(line: &str) -> Option<Trigger> {
    let caps = TRIGGER_REGEX.captures(line)?;
    Some(Trigger {
        name: caps["name"].to_string(),
        relation: None,
        time: caps["time"].parse().ok()?,
        calls: caps["calls"].parse().ok()?,
    })
}

fn cap_f64(caps: &Captures<'_>, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| caps.name(name))
        .and_then(|m| m.as_str().parse().ok())
}

fn cap_u64(caps: &Captures<'_>, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .find_map(|name| caps.name(name))
        .and_then(|m| m.as_str().parse().ok())
}

fn cap_present(caps: &Captures<'_>, names: &[&str]) -> bool {
    names.iter().any(|name| caps.name(name).is_some())
}

#[cfg(test)]
mod tests;
