use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn run_msh(command: &str) -> Output {
    let home = tempfile::tempdir().expect("create temp home");
    Command::new(env!("CARGO_BIN_EXE_msh"))
        .env("XDG_STATE_HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env("XDG_DATA_HOME", home.path())
        .args(["-c", command])
        .output()
        .expect("failed to execute msh")
}

#[test]
fn two_stage_pipeline() {
    let output = run_msh("echo hi | tr a-z A-Z");
    assert!(output.status.success(), "command failed: {:?}", output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "HI\n");
}

#[test]
fn three_stage_pipeline() {
    let output = run_msh("printf 'b\\na\\nc\\n' | sort | head -n 1");
    assert!(output.status.success(), "command failed: {:?}", output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a\n");
}

#[test]
fn quoted_words_stay_whole() {
    let output = run_msh("echo 'a  b' \"c|d\"");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a  b c|d\n");
}

#[test]
fn status_of_the_last_stage() {
    assert_eq!(Some(3), run_msh("sh -c 'exit 3'").status.code());
    assert_eq!(Some(0), run_msh("false | true").status.code());
    assert_eq!(Some(1), run_msh("true | false").status.code());
}

#[test]
fn unknown_command_is_reported() {
    let output = run_msh("badcommand123");
    assert_eq!(Some(127), output.status.code());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("msh: command not found: badcommand123"),
        "stderr: {stderr}"
    );
}

#[test]
fn unknown_command_mid_pipeline_stops_the_rest() {
    let started = Instant::now();
    // a surviving first stage would hold stderr open for 30s
    let output = run_msh("sleep 30 | badcommand123 | cat");
    assert_eq!(Some(127), output.status.code());
    assert!(output.stdout.is_empty());
    assert!(started.elapsed() < Duration::from_secs(10));
}

fn read_pid(path: &Path) -> Option<Pid> {
    let text = std::fs::read_to_string(path).ok()?;
    text.trim().parse().ok().map(Pid::from_raw)
}

/// Alive and not a zombie.
fn running(pid: Pid) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

#[test]
fn interrupt_reaches_every_stage() {
    let home = tempfile::tempdir().expect("create temp home");
    let first = home.path().join("first.pid");
    let second = home.path().join("second.pid");
    let line = format!(
        "sh -c 'echo $$ > {}; exec sleep 30' | sh -c 'echo $$ > {}; exec sleep 30'",
        first.display(),
        second.display()
    );
    let mut child = Command::new(env!("CARGO_BIN_EXE_msh"))
        .env("XDG_STATE_HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env("XDG_DATA_HOME", home.path())
        .args(["-c", &line])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to execute msh");

    let deadline = Instant::now() + Duration::from_secs(10);
    let pids = loop {
        if let (Some(a), Some(b)) = (read_pid(&first), read_pid(&second)) {
            break [a, b];
        }
        assert!(Instant::now() < deadline, "stages never started");
        sleep(Duration::from_millis(20));
    };

    let started = Instant::now();
    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).expect("interrupt msh");
    let status = loop {
        if let Some(status) = child.try_wait().expect("wait for msh") {
            break status;
        }
        if started.elapsed() > Duration::from_secs(10) {
            let _ = child.kill();
            panic!("msh did not stop after SIGINT");
        }
        sleep(Duration::from_millis(20));
    };
    assert_eq!(Some(130), status.code());

    for pid in pids {
        let deadline = Instant::now() + Duration::from_secs(5);
        while running(pid) {
            assert!(Instant::now() < deadline, "stage {pid} still running");
            sleep(Duration::from_millis(20));
        }
    }
}

#[test]
fn parse_errors_are_reported() {
    let output = run_msh("echo a | | echo b");
    assert_eq!(Some(1), output.status.code());
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("msh: "));
}
