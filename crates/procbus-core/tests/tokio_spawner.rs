//! Real child processes through `TokioProcessSpawner`.
#![cfg(unix)]

use std::collections::BTreeMap;
use std::time::Duration;

use procbus_core::domain::{
    ChildStream, ExitReport, ProcessDefinition, ProcessName, RunId, SpawnError,
};
use procbus_core::impls::TokioProcessSpawner;
use procbus_core::ports::{ChildEvent, ChildEventKind, ProcessSpawner, SpawnRequest};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Collected {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    errors: Vec<String>,
    exit: Option<ExitReport>,
}

async fn collect(rx: &mut mpsc::Receiver<ChildEvent>) -> Collected {
    let mut out = Collected::default();
    let all = async {
        while let Some(event) = rx.recv().await {
            assert_eq!(event.run, RunId::new(1));
            match event.kind {
                ChildEventKind::Output {
                    stream: ChildStream::Stdout,
                    data,
                } => out.stdout.extend(data),
                ChildEventKind::Output {
                    stream: ChildStream::Stderr,
                    data,
                } => out.stderr.extend(data),
                ChildEventKind::Error(e) => out.errors.push(e),
                ChildEventKind::Exit(report) => {
                    out.exit = Some(report);
                    break;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), all)
        .await
        .expect("child did not exit in time");
    out
}

fn request(def: &ProcessDefinition) -> SpawnRequest {
    SpawnRequest::new(ProcessName::new("t"), RunId::new(1), def)
}

#[tokio::test]
async fn shell_mode_captures_both_pipes_and_exit_code() {
    let mut def = ProcessDefinition::new("echo out; echo err 1>&2; exit 3");
    def.shell = true;
    let (tx, mut rx) = mpsc::channel(16);

    let child = TokioProcessSpawner::new().spawn(request(&def), tx).unwrap();
    assert!(child.pid() > 0);

    let got = collect(&mut rx).await;
    assert_eq!(got.stdout, b"out\n");
    assert_eq!(got.stderr, b"err\n");
    assert_eq!(got.exit, Some(ExitReport::code(3)));
}

#[tokio::test]
async fn stdin_is_fed_until_closed() {
    let def = ProcessDefinition::new("/bin/cat");
    let (tx, mut rx) = mpsc::channel(16);

    let mut child = TokioProcessSpawner::new().spawn(request(&def), tx).unwrap();
    child.write_stdin(b"ping\n".to_vec()).unwrap();
    child.close_stdin();

    let got = collect(&mut rx).await;
    assert_eq!(got.stdout, b"ping\n");
    assert_eq!(got.exit, Some(ExitReport::code(0)));
    assert!(child.write_stdin(b"late".to_vec()).is_err());
}

#[tokio::test]
async fn signal_by_name_is_reported_on_exit() {
    let def = ProcessDefinition::new("/bin/sleep").with_args(["30"]);
    let (tx, mut rx) = mpsc::channel(16);

    let child = TokioProcessSpawner::new().spawn(request(&def), tx).unwrap();
    child.signal("SIGTERM").unwrap();

    let got = collect(&mut rx).await;
    assert_eq!(got.exit, Some(ExitReport::signal("SIGTERM")));
}

#[tokio::test]
async fn env_replaces_the_inherited_environment() {
    let mut def = ProcessDefinition::new("echo \"$PROCBUS_TEST-$HOME\"");
    def.shell = true;
    def.env = Some(BTreeMap::from([("PROCBUS_TEST".to_string(), "set".to_string())]));
    let (tx, mut rx) = mpsc::channel(16);

    TokioProcessSpawner::new().spawn(request(&def), tx).unwrap();

    let got = collect(&mut rx).await;
    assert_eq!(got.stdout, b"set-\n");
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let def = ProcessDefinition::new("/nonexistent/procbus-test-binary");
    let (tx, _rx) = mpsc::channel(16);

    let err = TokioProcessSpawner::new()
        .spawn(request(&def), tx)
        .err()
        .unwrap();
    assert!(matches!(err, SpawnError::Io { .. }));
}
