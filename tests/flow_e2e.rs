mod common;

use std::sync::Arc;
use std::time::Duration;

use framelift::core::{Clock, ManualClock};
use framelift::relay::{FtpRelay, RelayCredentials};
use framelift::testing::ftp::FakeFtpServer;
use framelift::testing::mocks::FAKE_JPEG;

use common::{Harness, source};

#[test]
fn e2e_capture_store_relay_with_toggle() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = FakeFtpServer::start("cam", "secret");
    let h = Harness::with_relay(
        dir.path(),
        vec![source(1, "192.168.1.69", 5)],
        Arc::new(FtpRelay::new(Duration::from_secs(5))),
        server.credentials(),
    );

    // t = 0
    assert_eq!(h.step(), vec![1]);
    assert_eq!(std::fs::read(dir.path().join("2024/05/01/1_000000.jpeg"))?, FAKE_JPEG);
    assert_eq!(server.file("/2024/05/01/1_000000.jpeg").as_deref(), Some(FAKE_JPEG));

    // t = 1 .. 4
    for _ in 0..4 {
        h.advance(1);
        assert!(h.step().is_empty());
    }

    // t = 5
    h.advance(1);
    assert_eq!(h.step(), vec![1]);
    assert!(dir.path().join("2024/05/01/1_000005.jpeg").exists());
    assert!(server.file("/2024/05/01/1_000005.jpeg").is_some());

    // t = 6: disabled, t = 10 would have been due
    h.advance(1);
    h.scheduler.disable(1);
    h.advance(4);
    assert!(h.step().is_empty());
    assert!(!dir.path().join("2024/05/01/1_000010.jpeg").exists());

    assert_eq!(server.files().len(), 2);
    assert_eq!(server.count_commands("MKD"), 3, "day chain created once");

    let status = h.scheduler.status();
    assert_eq!(status[0].cycles, 2);
    assert_eq!(status[0].relay_failures, 0);

    Ok(())
}

#[test]
fn e2e_without_credentials_stores_locally_only() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let h = Harness::new(dir.path(), vec![source(1, "192.168.1.69", 5)]);

    assert_eq!(h.step(), vec![1]);

    assert!(dir.path().join("2024/05/01/1_000000.jpeg").exists());
    assert!(h.relay.uploads().is_empty());
    let status = h.scheduler.status();
    assert_eq!(status[0].failures, 0);
    assert_eq!(status[0].relay_failures, 0);
    assert!(status[0].last_error.is_none());

    Ok(())
}

#[test]
fn e2e_relay_failure_keeps_local_frame() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = FakeFtpServer::start("cam", "secret");
    let mut creds = server.credentials();
    creds.password = "wrong".into();
    let h = Harness::with_relay(
        dir.path(),
        vec![source(1, "192.168.1.69", 5)],
        Arc::new(FtpRelay::new(Duration::from_secs(5))),
        creds,
    );

    assert_eq!(h.step(), vec![1]);

    assert!(dir.path().join("2024/05/01/1_000000.jpeg").exists());
    assert!(server.files().is_empty());
    let status = h.scheduler.status();
    assert_eq!(status[0].relay_failures, 1);
    assert_eq!(status[0].failures, 0);

    // next interval tries again
    h.advance(5);
    assert_eq!(h.step(), vec![1]);
    assert_eq!(h.scheduler.status()[0].relay_failures, 2);

    Ok(())
}

#[test]
fn e2e_mock_relay_sees_dated_segments() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let creds = RelayCredentials {
        address: "archive.example:21".into(),
        user: "cam".into(),
        password: "secret".into(),
    };
    let h = Harness::with_credentials(dir.path(), vec![source(4, "10.0.0.4", 60)], creds);

    h.clock.set(ManualClock::at_local(2024, 12, 31, 23, 59, 59).now());
    assert_eq!(h.step(), vec![4]);
    h.advance(60);
    assert_eq!(h.step(), vec![4]);

    let uploads = h.relay.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].address, "archive.example:21");
    assert_eq!(uploads[0].segments, vec!["2024", "12", "31"]);
    assert_eq!(uploads[0].filename, "4_235959.jpeg");
    assert_eq!(uploads[1].segments, vec!["2025", "01", "01"]);
    assert_eq!(uploads[1].filename, "4_000059.jpeg");

    Ok(())
}
