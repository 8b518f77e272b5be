//! End-to-end: a real `Supervisor` run against an in-process fake FTP server,
//! exercising allocation, the worker/supervisor message protocol, and
//! write-coalescing together.

mod common;

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ftpdl_core::ftp::FtpConnectOptions;
use ftpdl_core::supervisor::{Outcome, Supervisor, SupervisorConfig};

fn connect_opts(port: u16) -> FtpConnectOptions {
    FtpConnectOptions {
        server: "127.0.0.1".into(),
        port,
        username: "anonymous".into(),
        password: "password".into(),
        enable_tls: false,
        connect_timeout: Duration::from_secs(5),
    }
}

#[test]
fn downloads_a_multi_segment_file_byte_for_byte() {
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let server = common::fake_ftp_server::start(body.clone());

    let dir = tempfile::tempdir().unwrap();
    let local_path = dir.path().join("file.bin");

    let config = SupervisorConfig {
        remote_path: "/file.bin".into(),
        local_path: local_path.clone(),
        connect_opts: connect_opts(server.port),
        concurrent_connections: 4,
        min_blocks_per_segment: 1,
        max_blocks_per_segment: 4,
        initial_blocksize: 16_384,
        kill_speed: 0.0,
    };

    let mut supervisor = Supervisor::new(config).unwrap();
    let abort = AtomicBool::new(false);
    let outcome = supervisor.run(&abort, |_ctx| {}).unwrap();

    assert_eq!(outcome, Outcome::Completed);
    let downloaded = std::fs::read(&local_path).unwrap();
    assert_eq!(downloaded, body);
    assert!(!supervisor.blockmap_path().exists());
}

#[test]
fn aborting_mid_download_preserves_the_blockmap_for_resume() {
    let body: Vec<u8> = vec![7u8; 500_000];
    let server = common::fake_ftp_server::start(body);

    let dir = tempfile::tempdir().unwrap();
    let local_path = dir.path().join("file.bin");

    let config = SupervisorConfig {
        remote_path: "/file.bin".into(),
        local_path: local_path.clone(),
        connect_opts: connect_opts(server.port),
        concurrent_connections: 2,
        min_blocks_per_segment: 1,
        max_blocks_per_segment: 2,
        initial_blocksize: 16_384,
        kill_speed: 0.0,
    };

    let mut supervisor = Supervisor::new(config).unwrap();
    let abort = AtomicBool::new(true);
    let outcome = supervisor.run(&abort, |_ctx| {}).unwrap();

    assert_eq!(outcome, Outcome::Aborted);
    assert!(supervisor.blockmap_path().exists());
}
