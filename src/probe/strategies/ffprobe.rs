use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::deadline::{kill_child, wait_child};
use crate::probe::{DurationProbe, DEFAULT_PROBE_TIMEOUT};

/// Runs the ffprobe CLI and reads the first video stream's duration.
///
/// The child is killed once `timeout` passes.
pub struct FfprobeProbe {
    bin: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
}

impl FfprobeProbe {
    pub fn new(bin: &str) -> Self {
        Self::with_timeout(bin, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(bin: &str, timeout: Duration) -> Self {
        Self {
            bin: bin.to_string(),
            timeout,
        }
    }
}

impl DurationProbe for FfprobeProbe {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, path: &Path) -> Result<Option<f64>> {
        let bin = which::which(&self.bin)
            .map_err(|_| anyhow!("{} not found on PATH", self.bin))?;
        let mut child = Command::new(bin)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {}", self.bin))?;

        // Drain stdout off-thread so a large listing cannot stall the child.
        let Some(mut stdout) = child.stdout.take() else {
            kill_child(&mut child);
            return Err(anyhow!("{} stdout unavailable", self.bin));
        };
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let status = wait_child(&mut child, self.timeout)
            .with_context(|| format!("wait for {}", self.bin))?
            .ok_or_else(|| anyhow!("{} killed after {:?}", self.bin, self.timeout))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", self.bin, status));
        }
        let stdout = reader
            .join()
            .map_err(|_| anyhow!("{} output reader panicked", self.bin))?
            .with_context(|| format!("read {} output", self.bin))?;
        parse_video_duration(&stdout)
    }
}

fn parse_video_duration(json: &[u8]) -> Result<Option<f64>> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(json).context("parse ffprobe json output")?;
    let Some(stream) = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    else {
        return Ok(None);
    };
    match stream.duration.as_deref() {
        Some(raw) => {
            let secs: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid stream duration '{}'", raw))?;
            Ok(Some(secs))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_video_stream() {
        let json = br#"{"streams":[
            {"index":0,"codec_type":"audio","duration":"9.500000"},
            {"index":1,"codec_type":"video","duration":"4.266667"},
            {"index":2,"codec_type":"video","duration":"1.0"}
        ]}"#;
        let secs = parse_video_duration(json).unwrap().unwrap();
        assert!((secs - 4.266667).abs() < 1e-9);
    }

    #[test]
    fn no_video_stream_is_no_answer() {
        let json = br#"{"streams":[{"codec_type":"audio","duration":"3.0"}]}"#;
        assert_eq!(parse_video_duration(json).unwrap(), None);
        assert_eq!(parse_video_duration(b"{}").unwrap(), None);
    }

    #[test]
    fn video_stream_without_duration_is_no_answer() {
        let json = br#"{"streams":[{"codec_type":"video"}]}"#;
        assert_eq!(parse_video_duration(json).unwrap(), None);
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_video_duration(b"not json").is_err());
        let json = br#"{"streams":[{"codec_type":"video","duration":"N/A"}]}"#;
        assert!(parse_video_duration(json).is_err());
    }

    #[test]
    fn missing_binary_is_an_error() {
        let probe = FfprobeProbe::new("ffprobe-does-not-exist-on-this-host");
        assert!(probe.probe(Path::new("/tmp/whatever.mp4")).is_err());
    }

    #[cfg(unix)]
    fn fake_ffprobe(dir: &Path, body: &str) -> Result<std::path::PathBuf> {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-ffprobe");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body))?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
        Ok(script)
    }

    #[cfg(unix)]
    #[test]
    fn reads_duration_from_the_cli() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = fake_ffprobe(
            dir.path(),
            r#"echo '{"streams":[{"codec_type":"video","duration":"2.5"}]}'"#,
        )?;
        let probe = FfprobeProbe::new(script.to_str().unwrap());
        assert_eq!(probe.probe(Path::new("/tmp/whatever.mp4"))?, Some(2.5));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn hung_cli_is_killed_at_the_deadline() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pid_file = dir.path().join("pid");
        let script = fake_ffprobe(
            dir.path(),
            &format!("echo $$ > {}\nexec sleep 5", pid_file.display()),
        )?;
        let probe = FfprobeProbe::with_timeout(script.to_str().unwrap(), Duration::from_millis(200));

        let started = std::time::Instant::now();
        assert!(probe.probe(Path::new("/tmp/whatever.mp4")).is_err());
        assert!(started.elapsed() < Duration::from_secs(3));

        let pid = std::fs::read_to_string(&pid_file)?;
        let alive = Path::new("/proc").join(pid.trim()).exists();
        assert!(!alive, "ffprobe child {} still running", pid.trim());
        Ok(())
    }
}
