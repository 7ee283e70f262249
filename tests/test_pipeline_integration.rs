// Integration test: discovery, parallel aggregation, merge and report on disk
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tgenstats::aggregate::ParsePolicy;
use tgenstats::config::Config;
use tgenstats::dispatch::{CancelToken, Dispatcher, TaskResult};
use tgenstats::report::{merge, read_report, write_report, OutputCompression, ReportMerger};
use tgenstats::source::{compile_patterns, find_sources, DEFAULT_PATTERN};
use tgenstats::TgenError;

fn host_line(name: &str) -> String {
    format!(
        "2017-07-25 18:23:19 1501006999.000000 [message] [tgen-main.c:99] [_tgenmain_run] \
         Initializing traffic generator on host {name} process id 4242\n"
    )
}

fn complete_line(direction: &str, bytes: u64, times: [i64; 5]) -> String {
    format!(
        "2017-07-25 18:23:20 1501007000.000000 [message] [tgen-transfer.c:363] [_tgentransfer_log] \
         [transfer-complete] transport TCP,12,localhost:127.0.0.1:46878,server1:10.0.0.1:8888 transfer \
         (transfer5k-1-client-GET-{bytes}-server1-0-error=NONE) total-bytes-read={bytes} total-bytes-write=0 \
         payload-bytes-{direction}={bytes}/{bytes} (100.00%) msecs-to-command={} msecs-to-response={} \
         msecs-to-first-byte={} msecs-to-last-byte={} msecs-to-checksum={}\n",
        times[0], times[1], times[2], times[3], times[4]
    )
}

fn error_line(bytes: u64, code: &str) -> String {
    format!(
        "2017-07-25 18:23:21 1501007001.000000 [message] [tgen-transfer.c:363] [_tgentransfer_log] \
         [transfer-error] transport TCP,13,localhost:127.0.0.1:46879,server1:10.0.0.1:8888 transfer \
         (transfer5k-2-client-GET-{bytes}-server1-0-error={code}) total-bytes-read=0 total-bytes-write=0 \
         payload-bytes-read={bytes}/{bytes} (100.00%)\n"
    )
}

fn noise_line() -> &'static str {
    "2017-07-25 18:23:22 1501007002.000000 [info] [tgen-main.c:200] [_tgenmain_heartbeat] heartbeat\n"
}

fn xz_available() -> bool {
    Command::new("xz")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Lay out a shadow-style hosts directory with a mix of client, server and
/// unnamed logs
fn build_hosts_dir(root: &Path) {
    let relay7 = root.join("relay7");
    let client2 = root.join("client2");
    let server1 = root.join("server1");
    let anon = root.join("anon");
    for dir in [&relay7, &client2, &server1, &anon] {
        fs::create_dir_all(dir).unwrap();
    }

    fs::write(
        relay7.join("stdout-relay7.tgen.1000.log"),
        host_line("relay7")
            + noise_line()
            + &complete_line("read", 1024, [1000, 1100, 1200, 1500, 1600]),
    )
    .unwrap();

    let client2_log = host_line("client2")
        + &error_line(512, "TIMEOUT")
        + &complete_line("read", 2048, [0, 10, 20, 40, 50])
        + "garbage transfer-complete\n"
        + &error_line(512, "TIMEOUT")
        + &error_line(1024, "PROXY");
    fs::write(
        client2.join("stdout-client2.tgen.1000.log.zst"),
        zstd::encode_all(client2_log.as_bytes(), 3).unwrap(),
    )
    .unwrap();

    fs::write(
        server1.join("stdout-server1.tgen.1000.log"),
        host_line("server1")
            + &complete_line("write", 1024, [1, 2, 3, 4, 5])
            + &complete_line("read", 1024, [1, 2, 3, 4, 5]),
    )
    .unwrap();

    fs::write(
        anon.join("stdout-anon.tgen.1000.log"),
        complete_line("read", 10, [1, 2, 3, 4, 5]),
    )
    .unwrap();

    // Not a tgen log, must not be picked up
    fs::write(relay7.join("stdout-relay7.tor.1000.log"), host_line("bogus")).unwrap();
}

#[test]
fn test_end_to_end_report() {
    let temp_dir = TempDir::new().unwrap();
    let hosts = temp_dir.path().join("hosts");
    build_hosts_dir(&hosts);

    let config = Config::default();
    let patterns = compile_patterns(&config.discovery.patterns).unwrap();
    let sources = find_sources(hosts.to_str().unwrap(), &patterns).unwrap();
    assert_eq!(sources.len(), 4);

    let dispatcher = Dispatcher::new(3, config.task_options());
    let mut merger = ReportMerger::new();
    let delivered = dispatcher
        .run(sources, &CancelToken::new(), |report| merger.push_report(report))
        .unwrap();
    assert_eq!(delivered, 4);

    let aggregate = merger.finish();
    assert_eq!(aggregate.named_sources, 2);
    assert_eq!(aggregate.unnamed_sources, 1);
    assert_eq!(aggregate.discarded_sources, 1);
    assert_eq!(aggregate.failed_sources, 0);
    assert_eq!(aggregate.total_success, 2);
    assert_eq!(aggregate.total_errors, 3);
    assert_eq!(
        aggregate.nodes.keys().collect::<Vec<_>>(),
        vec!["client2", "relay7"]
    );

    let relay7 = &aggregate.nodes["relay7"];
    assert_eq!(relay7.success_count, 1);
    assert_eq!(relay7.error_count, 0);
    assert!((relay7.first_byte[&1024][0] - 0.2).abs() < 1e-9);
    assert!((relay7.last_byte[&1024][0] - 0.5).abs() < 1e-9);

    let client2 = &aggregate.nodes["client2"];
    assert_eq!(client2.errors["TIMEOUT"], vec![512, 512]);
    assert_eq!(client2.errors["PROXY"], vec![1024]);
    assert_eq!(client2.error_count, 3);
    assert!((client2.first_byte[&2048][0] - 0.02).abs() < 1e-9);

    // Round trip through the compressed report on disk
    let out = temp_dir.path().join("out");
    let path = write_report(&aggregate, &out, OutputCompression::Zstd).unwrap();
    assert_eq!(read_report(&path).unwrap(), aggregate);
}

#[test]
fn test_fail_policy_marks_source_failed() {
    let temp_dir = TempDir::new().unwrap();
    let hosts = temp_dir.path().join("hosts");
    build_hosts_dir(&hosts);

    let mut config = Config::default();
    config.parsing.policy = ParsePolicy::Fail;
    let patterns = compile_patterns(&config.discovery.patterns).unwrap();
    let sources = find_sources(hosts.to_str().unwrap(), &patterns).unwrap();

    let reports = Dispatcher::new(2, config.task_options())
        .run_all(sources, &CancelToken::new())
        .unwrap();

    let failed: Vec<_> = reports
        .iter()
        .filter_map(|r| match &r.result {
            TaskResult::Failed(e) => Some((r.source.to_string(), e)),
            _ => None,
        })
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].0.ends_with("stdout-client2.tgen.1000.log.zst"));
    assert!(matches!(failed[0].1, TgenError::Parse { line: 4, .. }));

    let aggregate = merge(reports.into_iter().map(|r| (r.source, r.result)));
    assert_eq!(aggregate.failed_sources, 1);
    assert_eq!(aggregate.nodes.len(), 1);
}

#[test]
fn test_same_host_in_two_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("tgen.a.log"),
        host_line("relay7") + &complete_line("read", 100, [0, 1, 2, 3, 4]),
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("tgen.b.log"),
        host_line("relay7") + &error_line(100, "READ") + &error_line(100, "READ"),
    )
    .unwrap();

    let patterns = compile_patterns(&[DEFAULT_PATTERN.to_string()]).unwrap();
    let sources = find_sources(temp_dir.path().to_str().unwrap(), &patterns).unwrap();

    // Sequential so that merge order is submission order
    let reports = Dispatcher::new(1, Config::default().task_options())
        .run_all(sources, &CancelToken::new())
        .unwrap();
    let aggregate = merge(reports.into_iter().map(|r| (r.source, r.result)));

    assert_eq!(aggregate.nodes.len(), 1);
    assert_eq!(aggregate.nodes["relay7"].error_count, 2);
    assert_eq!(aggregate.nodes["relay7"].success_count, 0);
    assert_eq!(aggregate.total_success, 1);
    assert_eq!(aggregate.total_errors, 2);
    assert_eq!(aggregate.named_sources, 2);
}

#[test]
fn test_xz_sources_and_report() {
    if !xz_available() {
        eprintln!("xz not installed, skipping");
        return;
    }
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("tgen.client.log");
    fs::write(
        &log,
        host_line("client9") + &complete_line("read", 5120, [100, 200, 300, 400, 500]),
    )
    .unwrap();
    assert!(Command::new("xz").arg(&log).status().unwrap().success());

    let patterns = compile_patterns(&[DEFAULT_PATTERN.to_string()]).unwrap();
    let sources = find_sources(temp_dir.path().to_str().unwrap(), &patterns).unwrap();
    assert_eq!(sources.len(), 1);

    let reports = Dispatcher::new(1, Config::default().task_options())
        .run_all(sources, &CancelToken::new())
        .unwrap();
    let aggregate = merge(reports.into_iter().map(|r| (r.source, r.result)));
    assert_eq!(aggregate.nodes["client9"].success_count, 1);

    let out = temp_dir.path().join("out");
    let path = write_report(&aggregate, &out, OutputCompression::Xz).unwrap();
    assert!(path.to_string_lossy().ends_with("stats.tgen.json.xz"));
    assert_eq!(read_report(&path).unwrap(), aggregate);
}
