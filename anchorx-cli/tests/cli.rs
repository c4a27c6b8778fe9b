use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

fn anchorx() -> Command {
    Command::new(env!("CARGO_BIN_EXE_anchorx"))
}

#[test]
fn demo_prints_single_chain() {
    let dir = TempDir::new().unwrap();
    let out = anchorx()
        .current_dir(dir.path())
        .args(["-q", "demo", "--backend", "emulated"])
        .output()
        .expect("run anchorx demo");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Number of chains: 1"));
    assert!(stdout.contains("score=61 count=8"));
}

#[test]
fn chain_reads_tsv_and_writes_results() {
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, "#group\tref\tquery\tspan").unwrap();
    for k in 0..6 {
        writeln!(input, "read7\t{}\t{}\t20", 5000 + k * 20, 300 + k * 20).unwrap();
    }
    let output = NamedTempFile::new().unwrap();

    let status = anchorx()
        .args(["-q", "--threads", "2", "chain", "--input"])
        .arg(input.path())
        .arg("--output")
        .arg(output.path())
        .status()
        .expect("run anchorx chain");
    assert!(status.success());

    let text = std::fs::read_to_string(output.path()).unwrap();
    let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(rows, vec!["read7\t0\t120\t6\t+\t5000\t5100\t300\t400"]);
}

#[test]
fn missing_input_fails_with_suggestion() {
    let out = anchorx()
        .args(["-q", "chain", "--input", "/nonexistent/anchors.tsv"])
        .output()
        .expect("run anchorx chain");
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("File not found"));
}
