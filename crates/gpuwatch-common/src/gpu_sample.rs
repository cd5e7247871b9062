use serde::{Deserialize, Serialize};

/// `index` value carried by the placeholder sample of a failed host.
pub const ERROR_INDEX: &str = "Err";

/// One GPU as published to readers. Field names follow the nvidia-smi query
/// keys the dashboard already consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpuSample {
    pub index: String,
    pub name: String,
    #[serde(rename = "temperature.gpu")]
    pub temperature_c: u32,
    #[serde(rename = "utilization.gpu")]
    pub utilization_pct: u32,
    #[serde(rename = "memory.used")]
    pub memory_used_mb: u64,
    #[serde(rename = "memory.total")]
    pub memory_total_mb: u64,
    #[serde(rename = "memory")]
    pub memory_used_pct: u32,
    #[serde(rename = "power.draw")]
    pub power_draw_w: u32,
    #[serde(rename = "enforced.power.limit")]
    pub power_limit_w: u32,
    #[serde(rename = "user_processes")]
    pub process_summary: String,
    #[serde(rename = "users")]
    pub process_count: usize,
}

impl GpuSample {
    /// Zeroed placeholder standing in for a host that could not be sampled.
    pub fn placeholder(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index: ERROR_INDEX.to_string(),
            name: name.into(),
            temperature_c: 0,
            utilization_pct: 0,
            memory_used_mb: 0,
            memory_total_mb: 0,
            memory_used_pct: 0,
            power_draw_w: 0,
            power_limit_w: 0,
            process_summary: message.into(),
            process_count: 0,
        }
    }
}

/// Rounded share of `total` in use, in whole percent. Zero when `total` is zero.
pub fn memory_used_pct(used_mb: u64, total_mb: u64) -> u32 {
    if total_mb == 0 {
        return 0;
    }
    let pct = (used_mb as f64 / total_mb as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u32
}

/// Everything a single cycle learned about one host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostResult {
    pub hostname: String,
    pub gpus: Vec<GpuSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResult {
    pub fn ok(hostname: impl Into<String>, gpus: Vec<GpuSample>) -> Self {
        Self {
            hostname: hostname.into(),
            gpus,
            error: None,
        }
    }

    /// A failed host keeps its slot with a single placeholder GPU so readers
    /// can index `gpus[0]` without special-casing.
    pub fn failed(
        hostname: impl Into<String>,
        marker: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            hostname: hostname.into(),
            gpus: vec![GpuSample::placeholder(marker, message.clone())],
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_used_pct() {
        assert_eq!(memory_used_pct(1000, 8000), 13);
        assert_eq!(memory_used_pct(0, 8000), 0);
        assert_eq!(memory_used_pct(8000, 8000), 100);
        assert_eq!(memory_used_pct(512, 0), 0);
        // nvidia-smi can briefly report used above total
        assert_eq!(memory_used_pct(9000, 8000), 100);
    }

    #[test]
    fn test_wire_field_names() {
        let sample = GpuSample {
            index: "0".to_string(),
            name: "A100".to_string(),
            temperature_c: 45,
            utilization_pct: 10,
            memory_used_mb: 1000,
            memory_total_mb: 8000,
            memory_used_pct: 13,
            power_draw_w: 50,
            power_limit_w: 300,
            process_summary: String::new(),
            process_count: 0,
        };
        let v = serde_json::to_value(HostResult::ok("gpu-01", vec![sample])).unwrap();
        let gpu = &v["gpus"][0];
        assert_eq!(v["hostname"], "gpu-01");
        assert!(v.get("error").is_none());
        assert_eq!(gpu["index"], "0");
        assert_eq!(gpu["temperature.gpu"], 45);
        assert_eq!(gpu["utilization.gpu"], 10);
        assert_eq!(gpu["memory.used"], 1000);
        assert_eq!(gpu["memory.total"], 8000);
        assert_eq!(gpu["memory"], 13);
        assert_eq!(gpu["power.draw"], 50);
        assert_eq!(gpu["enforced.power.limit"], 300);
        assert_eq!(gpu["user_processes"], "");
        assert_eq!(gpu["users"], 0);
    }

    #[test]
    fn test_failed_host_has_single_placeholder() {
        let r = HostResult::failed("gpu-02", "Connection Error", "connection refused");
        assert!(r.is_error());
        assert_eq!(r.gpus.len(), 1);
        let gpu = &r.gpus[0];
        assert_eq!(gpu.index, ERROR_INDEX);
        assert_eq!(gpu.name, "Connection Error");
        assert_eq!(gpu.process_summary, "connection refused");
        assert_eq!(gpu.memory_used_pct, 0);
        assert_eq!(gpu.process_count, 0);
    }
}
