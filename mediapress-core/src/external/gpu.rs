//! Free VRAM query through `nvidia-smi`.

use std::process::{Command, Stdio};

/// Free memory of the first GPU in MiB, or `None` when `nvidia-smi` is
/// unavailable or prints something unexpected.
#[must_use]
pub fn query_free_vram_mib() -> Option<u64> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=memory.free", "--format=csv,noheader,nounits"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let parsed = parse_free_vram(&String::from_utf8_lossy(&out.stdout));
            log::debug!("nvidia-smi reports free VRAM: {:?} MiB", parsed);
            parsed
        }
        Ok(out) => {
            log::debug!("nvidia-smi exited with {}", out.status);
            None
        }
        Err(e) => {
            log::debug!("nvidia-smi not available: {}", e);
            None
        }
    }
}

/// Parses the first line of `nvidia-smi --query-gpu=memory.free` output.
fn parse_free_vram(stdout: &str) -> Option<u64> {
    stdout.lines().next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_vram() {
        assert_eq!(parse_free_vram("7892\n"), Some(7892));
        assert_eq!(parse_free_vram(" 2048 \n1024\n"), Some(2048));
        assert_eq!(parse_free_vram(""), None);
        assert_eq!(parse_free_vram("[N/A]"), None);
    }
}
