//! The nvidia-smi query protocol: the batched command sent to each host and the
//! parser for what comes back.

use std::collections::{BTreeSet, HashMap, HashSet};

use gpuwatch_common::{memory_used_pct, GpuSample};

use crate::error::CollectError;

/// Echoed between the GPU and process sections of the combined command.
pub const SECTION_SPLIT: &str = "|||SECTION_SPLIT|||";

pub const GPU_QUERY: &str = "nvidia-smi --query-gpu=uuid,index,name,temperature.gpu,utilization.gpu,memory.used,memory.total,power.draw,power.limit --format=csv,noheader,nounits";

pub const PROCESS_QUERY: &str = "nvidia-smi --query-compute-apps=gpu_uuid,pid,process_name,used_gpu_memory --format=csv,noheader,nounits";

const GPU_FIELDS: usize = 9;
const PROCESS_FIELDS: usize = 4;

/// Owner shown for a pid that `ps` did not resolve.
pub const UNKNOWN_USER: &str = "unknown";

/// Both queries in one round trip.
pub fn combined_command() -> String {
    format!("{GPU_QUERY} ; echo '{SECTION_SPLIT}' ; {PROCESS_QUERY}")
}

pub fn owner_lookup_command(pids: &[u32]) -> String {
    let list = pids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("ps -o pid=,user= -p {list}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuRecord {
    pub uuid: String,
    pub index: u32,
    pub name: String,
    pub temperature_c: u32,
    pub utilization_pct: u32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub power_draw_w: u32,
    pub power_limit_w: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub gpu_uuid: String,
    pub pid: u32,
    pub process_name: String,
    pub used_memory_mb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub gpus: Vec<GpuRecord>,
    /// Compute processes per GPU uuid, in reported order.
    pub processes: HashMap<String, Vec<ProcessRecord>>,
    /// Distinct pids across all GPUs, ascending.
    pub pids: Vec<u32>,
    /// Lines that were dropped as malformed or duplicate.
    pub skipped: usize,
}

/// Parse the output of [`combined_command`].
pub fn parse_combined(raw: &str) -> Result<ParsedQuery, CollectError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CollectError::EmptyResponse);
    }

    let (gpu_section, process_section) = raw.split_once(SECTION_SPLIT).unwrap_or((raw, ""));
    let mut parsed = ParsedQuery::default();

    let mut seen = HashSet::new();
    for line in non_blank(gpu_section) {
        match parse_gpu_line(line) {
            Some(gpu) if seen.insert(gpu.uuid.clone()) => parsed.gpus.push(gpu),
            _ => {
                tracing::debug!(line, "skipping GPU line");
                parsed.skipped += 1;
            }
        }
    }
    if parsed.gpus.is_empty() {
        return Err(CollectError::NoGpus);
    }

    let mut pids = BTreeSet::new();
    for line in non_blank(process_section) {
        let Some(record) = parse_process_line(line) else {
            tracing::debug!(line, "skipping process line");
            parsed.skipped += 1;
            continue;
        };
        pids.insert(record.pid);
        parsed
            .processes
            .entry(record.gpu_uuid.clone())
            .or_default()
            .push(record);
    }
    parsed.pids = pids.into_iter().collect();

    Ok(parsed)
}

/// Parse `ps -o pid=,user=` output into a pid to user map.
pub fn parse_owners(raw: &str) -> HashMap<u32, String> {
    raw.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse().ok()?;
            let user = parts.next()?;
            Some((pid, user.to_string()))
        })
        .collect()
}

/// One sample per GPU record, in reported order.
pub fn assemble(parsed: &ParsedQuery, owners: &HashMap<u32, String>) -> Vec<GpuSample> {
    parsed
        .gpus
        .iter()
        .map(|gpu| {
            let entries: Vec<String> = parsed
                .processes
                .get(&gpu.uuid)
                .map(|procs| {
                    procs
                        .iter()
                        .map(|p| {
                            let user = owners.get(&p.pid).map_or(UNKNOWN_USER, String::as_str);
                            let name: String = p.process_name.split_whitespace().collect();
                            format!("{user}({name},{}M)", p.used_memory_mb)
                        })
                        .collect()
                })
                .unwrap_or_default();

            GpuSample {
                index: gpu.index.to_string(),
                name: gpu.name.clone(),
                temperature_c: gpu.temperature_c,
                utilization_pct: gpu.utilization_pct,
                memory_used_mb: gpu.memory_used_mb,
                memory_total_mb: gpu.memory_total_mb,
                memory_used_pct: memory_used_pct(gpu.memory_used_mb, gpu.memory_total_mb),
                power_draw_w: gpu.power_draw_w,
                power_limit_w: gpu.power_limit_w,
                process_count: entries.len(),
                process_summary: entries.join(" "),
            }
        })
        .collect()
}

fn non_blank(section: &str) -> impl Iterator<Item = &str> {
    section.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Drops a line only when it is short or its uuid or index is unusable. MIG
/// partitions report `[N/A]` utilization, so readings never reject a GPU.
fn parse_gpu_line(line: &str) -> Option<GpuRecord> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < GPU_FIELDS || parts[0].is_empty() {
        return None;
    }
    Some(GpuRecord {
        uuid: parts[0].to_string(),
        index: parts[1].parse().ok()?,
        name: parts[2].to_string(),
        temperature_c: reading_u32(parts[3]),
        utilization_pct: reading_u32(parts[4]),
        memory_used_mb: reading(parts[5]),
        memory_total_mb: reading(parts[6]),
        power_draw_w: reading_u32(parts[7]),
        power_limit_w: reading_u32(parts[8]),
    })
}

/// `gpu_uuid, pid, process_name, used_memory`; the name may itself contain commas.
fn parse_process_line(line: &str) -> Option<ProcessRecord> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < PROCESS_FIELDS {
        return None;
    }
    let last = parts.len() - 1;
    Some(ProcessRecord {
        gpu_uuid: parts[0].to_string(),
        pid: parts[1].parse().ok()?,
        process_name: parts[2..last].join(","),
        used_memory_mb: reading(parts[last]),
    })
}

/// Truncated numeric reading. `[N/A]`, `[Not Supported]` and other
/// unreadable values count as zero.
fn reading(field: &str) -> u64 {
    parse_float_trunc(field).unwrap_or(0)
}

fn reading_u32(field: &str) -> u32 {
    reading(field).min(u32::MAX as u64) as u32
}

fn parse_float_trunc(field: &str) -> Option<u64> {
    let v: f64 = field.parse().ok()?;
    (v.is_finite() && v >= 0.0).then(|| v.trunc() as u64)
}
