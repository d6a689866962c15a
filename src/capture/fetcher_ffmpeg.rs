// src/capture/fetcher_ffmpeg.rs
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam::channel;

use crate::capture::FrameFetcher;
use crate::core::{CaptureError, CaptureResult};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Grabs one frame per call by running `ffmpeg` against the RTSP stream.
pub struct FfmpegFetcher {
    binary: String,
    stream_path: String,
    timeout: Duration,
}

impl FfmpegFetcher {
    pub fn new(binary: &str, stream_path: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            stream_path: stream_path.to_string(),
            timeout,
        }
    }

    pub fn stream_url(&self, address: &str) -> String {
        stream_url(address, &self.stream_path)
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-nostdin",
            "-loglevel", "error",
            "-rtsp_transport", "tcp",
            "-i", url,
            "-frames:v", "1",
            "-f", "image2pipe",
            "-vcodec", "mjpeg",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
        cmd
    }
}

pub fn stream_url(address: &str, stream_path: &str) -> String {
    format!(
        "rtsp://{}/{}",
        address.trim().trim_end_matches('/'),
        stream_path.trim_start_matches('/')
    )
}

/// Kills and reaps the child on every exit path.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
        }
        let _ = self.0.wait();
    }
}

impl FrameFetcher for FfmpegFetcher {
    fn fetch(&self, address: &str) -> CaptureResult<Vec<u8>> {
        let url = self.stream_url(address);

        let mut child = ChildGuard(
            self.command(&url)
                .spawn()
                .map_err(|e| CaptureError::unreachable(address, format!("spawn {}: {}", self.binary, e)))?,
        );

        let Some(mut stdout) = child.0.stdout.take() else {
            return Err(CaptureError::unreachable(address, "ffmpeg stdout not captured"));
        };

        // Read on a helper thread so the wall-clock timeout also covers a
        // stream that never delivers a frame.
        let (tx, rx) = channel::bounded(1);
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let res = stdout.read_to_end(&mut bytes).map(|_| bytes);
            let _ = tx.send(res);
        });

        let bytes = match rx.recv_timeout(self.timeout) {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(CaptureError::unreachable(address, format!("read: {}", e))),
            Err(_) => {
                return Err(CaptureError::unreachable(
                    address,
                    format!("no frame within {}s", self.timeout.as_secs()),
                ));
            }
        };

        let status = child
            .0
            .wait()
            .map_err(|e| CaptureError::unreachable(address, format!("wait: {}", e)))?;
        if !status.success() {
            return Err(CaptureError::unreachable(
                address,
                format!("ffmpeg exited with {}", status),
            ));
        }

        validate_frame(address, bytes)
    }
}

fn validate_frame(address: &str, bytes: Vec<u8>) -> CaptureResult<Vec<u8>> {
    if bytes.is_empty() {
        return Err(CaptureError::unreachable(address, "empty frame"));
    }
    if !bytes.starts_with(&JPEG_SOI) {
        return Err(CaptureError::unreachable(address, "output is not a JPEG frame"));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_joins_cleanly() {
        assert_eq!(stream_url("192.168.1.69", "11"), "rtsp://192.168.1.69/11");
        assert_eq!(stream_url("cam:554/", "/live/ch0"), "rtsp://cam:554/live/ch0");
    }

    #[test]
    fn frame_validation() {
        assert!(validate_frame("cam", Vec::new()).is_err());
        assert!(validate_frame("cam", b"GIF89a".to_vec()).is_err());
        assert_eq!(
            validate_frame("cam", vec![0xFF, 0xD8, 0xFF, 0xE0]).unwrap(),
            vec![0xFF, 0xD8, 0xFF, 0xE0]
        );
    }

    #[test]
    fn missing_binary_is_unreachable() {
        let fetcher = FfmpegFetcher::new(
            "/nonexistent/ffmpeg-for-tests",
            "11",
            Duration::from_secs(1),
        );

        let err = fetcher.fetch("10.0.0.5").unwrap_err();
        assert!(matches!(err, CaptureError::SourceUnreachable { .. }));
    }

    #[cfg(unix)]
    fn scripted(dir: &std::path::Path, body: &str, timeout: Duration) -> FfmpegFetcher {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        FfmpegFetcher::new(path.to_str().unwrap(), "11", timeout)
    }

    #[cfg(unix)]
    #[test]
    fn hanging_stream_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = scripted(dir.path(), "exec sleep 30", Duration::from_secs(1));

        let started = std::time::Instant::now();
        let err = fetcher.fetch("10.0.0.5").unwrap_err();

        assert!(matches!(err, CaptureError::SourceUnreachable { .. }));
        assert!(err.to_string().contains("no frame within 1s"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = scripted(dir.path(), "printf '\\377\\330'\nexit 1", Duration::from_secs(5));

        let err = fetcher.fetch("10.0.0.5").unwrap_err();

        assert!(matches!(err, CaptureError::SourceUnreachable { .. }));
        assert!(err.to_string().contains("exited with"));
    }

    #[cfg(unix)]
    #[test]
    fn valid_frame_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = scripted(dir.path(), "printf '\\377\\330\\377\\331'", Duration::from_secs(5));

        let frame = fetcher.fetch("10.0.0.5").unwrap();

        assert_eq!(frame, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }
}
