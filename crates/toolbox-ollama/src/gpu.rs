//! GPU memory probes

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use toolbox_models::GpuReport;

/// Source of GPU name and memory usage, in mebibytes
#[async_trait]
pub trait GpuProbe: Send + Sync {
    /// Current report, or `None` when no GPU could be queried
    async fn probe(&self) -> Option<GpuReport>;
}

/// Probe for hosts without a supported GPU
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGpuProbe;

#[async_trait]
impl GpuProbe for NoGpuProbe {
    async fn probe(&self) -> Option<GpuReport> {
        None
    }
}

/// Queries `nvidia-smi`, reporting the GPU with the most memory
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    program: String,
}

impl NvidiaSmiProbe {
    pub const QUERY_ARGS: [&'static str; 2] = [
        "--query-gpu=name,memory.total,memory.used",
        "--format=csv,noheader,nounits",
    ];

    pub fn new() -> Self {
        Self::with_program("nvidia-smi")
    }

    /// Use a specific executable instead of `nvidia-smi` from `PATH`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GpuProbe for NvidiaSmiProbe {
    async fn probe(&self) -> Option<GpuReport> {
        let output = match Command::new(&self.program)
            .args(Self::QUERY_ARGS)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!("GPU probe {} unavailable: {}", self.program, e);
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                "GPU probe {} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `name, total, used` CSV rows and keep the largest GPU
///
/// Rows that do not parse are skipped.
pub fn parse_nvidia_smi(output: &str) -> Option<GpuReport> {
    output
        .lines()
        .filter_map(|line| {
            // the name itself may contain commas
            let mut fields = line.rsplitn(3, ',');
            let used_mb = fields.next()?.trim().parse().ok()?;
            let total_mb = fields.next()?.trim().parse().ok()?;
            let name = fields.next()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(GpuReport {
                name: name.to_string(),
                total_mb,
                used_mb,
            })
        })
        .max_by_key(|report| report.total_mb)
}
