mod common;

use std::sync::Arc;

use civic_triage::probe::strategies::{FfprobeProbe, HeaderProbe, SizeHeuristicProbe};
use civic_triage::probe::{DurationProbe, ProbeSettings};
use civic_triage::{
    DurationConfidence, DurationPolicy, DurationProber, DurationVerdict, UploadedMedia,
};

use common::{dir_entries, gif_bytes, synthetic_mp4};

fn scratch_settings(dir: &std::path::Path) -> ProbeSettings {
    ProbeSettings {
        temp_dir: Some(dir.to_path_buf()),
        ..ProbeSettings::default()
    }
}

#[test]
fn mp4_header_duration_is_measured() -> anyhow::Result<()> {
    let scratch = tempfile::tempdir()?;
    let prober = DurationProber::with_default_strategies(&scratch_settings(scratch.path()));
    let mut media =
        UploadedMedia::from_bytes("clip.mp4", Some("video/mp4"), synthetic_mp4(1000, 4500))?;

    let estimate = prober.probe_duration(&mut media);

    assert_eq!(estimate.confidence, DurationConfidence::Measured);
    let secs = estimate.seconds().unwrap();
    assert!((secs - 4.5).abs() < 0.05, "got {}", secs);
    assert_eq!(dir_entries(scratch.path()), 0, "temporary copies must be removed");
    Ok(())
}

#[test]
fn gif_clip_duration_sums_frame_delays() -> anyhow::Result<()> {
    let scratch = tempfile::tempdir()?;
    let prober = DurationProber::with_default_strategies(&scratch_settings(scratch.path()));
    let mut media =
        UploadedMedia::from_bytes("drive.gif", Some("video/gif"), gif_bytes(&[1; 30], 100))?;

    let estimate = prober.probe_duration(&mut media);

    let secs = estimate.seconds().unwrap();
    assert!((secs - 3.0).abs() < 0.15, "got {}", secs);
    assert_eq!(
        DurationPolicy::default().evaluate(&estimate),
        DurationVerdict::Accepted(secs)
    );
    assert_eq!(dir_entries(scratch.path()), 0);
    Ok(())
}

#[test]
fn undecodable_small_file_falls_back_to_size_estimate() -> anyhow::Result<()> {
    let scratch = tempfile::tempdir()?;
    let settings = ProbeSettings {
        assumed_bytes_per_sec: 1000,
        ..scratch_settings(scratch.path())
    };
    let prober = DurationProber::with_default_strategies(&settings);
    let mut media = UploadedMedia::from_bytes("noise.webm", Some("video/webm"), vec![0x5a; 2500])?;

    let estimate = prober.probe_duration(&mut media);

    assert_eq!(estimate.confidence, DurationConfidence::Estimated);
    assert_eq!(estimate.seconds(), Some(2.5));
    assert_eq!(dir_entries(scratch.path()), 0);
    Ok(())
}

#[test]
fn large_undecodable_file_is_unknown_and_accepted_unverified() -> anyhow::Result<()> {
    let scratch = tempfile::tempdir()?;
    let settings = ProbeSettings {
        assumed_bytes_per_sec: 100,
        ..scratch_settings(scratch.path())
    };
    let prober = DurationProber::with_default_strategies(&settings);
    // 4000 bytes at 100 B/s is 40 s, beyond the 10 s heuristic ceiling.
    let mut media = UploadedMedia::from_bytes("noise.avi", Some("video/avi"), vec![0x5a; 4000])?;

    let estimate = prober.probe_duration(&mut media);

    assert!(!estimate.is_known());
    assert_eq!(
        DurationPolicy::default().evaluate(&estimate),
        DurationVerdict::AcceptedUnverified
    );
    assert_eq!(dir_entries(scratch.path()), 0);
    Ok(())
}

#[test]
fn upload_stays_readable_after_probing() -> anyhow::Result<()> {
    let prober = DurationProber::new(
        vec![
            Arc::new(HeaderProbe) as Arc<dyn DurationProbe>,
            Arc::new(SizeHeuristicProbe::new(1024 * 1024, 10.0)),
        ],
        &ProbeSettings::default(),
    );
    let bytes = synthetic_mp4(600, 4200);
    let mut media = UploadedMedia::from_bytes("clip.mp4", Some("video/mp4"), bytes.clone())?;

    assert_eq!(prober.probe_duration(&mut media).seconds(), Some(7.0));
    assert_eq!(
        DurationPolicy::default().evaluate(&prober.probe_duration(&mut media)),
        DurationVerdict::Rejected(7.0)
    );

    let copy = media.materialize(".mp4", None)?;
    assert_eq!(std::fs::read(copy.path())?, bytes);
    Ok(())
}

#[cfg(unix)]
#[test]
fn hung_ffprobe_is_gone_when_the_cascade_moves_on() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};

    let scratch = tempfile::tempdir()?;
    let bin_dir = tempfile::tempdir()?;
    let pid_file = bin_dir.path().join("pid");
    let script = bin_dir.path().join("ffprobe");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho $$ > {}\nexec sleep 5\n", pid_file.display()),
    )?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

    let settings = ProbeSettings {
        timeout: Duration::from_millis(100),
        ffprobe_bin: script.to_string_lossy().into_owned(),
        ..scratch_settings(scratch.path())
    };
    let strategies: Vec<Arc<dyn DurationProbe>> = vec![
        Arc::new(FfprobeProbe::with_timeout(&settings.ffprobe_bin, settings.timeout)),
        Arc::new(HeaderProbe),
    ];
    let prober = DurationProber::new(strategies, &settings);
    let mut media =
        UploadedMedia::from_bytes("clip.mp4", Some("video/mp4"), synthetic_mp4(1000, 2000))?;

    let started = Instant::now();
    let estimate = prober.probe_duration(&mut media);

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(estimate.seconds(), Some(2.0));
    let pid = std::fs::read_to_string(&pid_file)?;
    assert!(
        !std::path::Path::new("/proc").join(pid.trim()).exists(),
        "ffprobe child {} outlived the cascade",
        pid.trim()
    );
    assert_eq!(dir_entries(scratch.path()), 0);
    Ok(())
}
