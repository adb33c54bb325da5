use expectrl::{Eof, Expect};
use std::process::Command;
use std::time::{Duration, Instant};

fn leer(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_leer"));
    cmd.args(args);
    cmd
}

#[test]
fn pty_e2e_shows_command_output_and_ctrl_c_exits() {
    let cmd = leer(&["-n", "0.5", "expr", "20000", "+", "22222"]);
    let mut session = expectrl::Session::spawn(cmd).expect("spawn pty");
    session.set_expect_timeout(Some(Duration::from_secs(8)));
    session.expect("42222").expect("command output on screen");
    session.send("\u{3}").expect("send ctrl-c");
    session.expect(Eof).expect("session exited");
}

#[test]
fn pty_e2e_scroll_keys_do_not_exit() {
    let cmd = leer(&["-n", "1", "-l", "seq", "200"]);
    let mut session = expectrl::Session::spawn(cmd).expect("spawn pty");
    session.set_expect_timeout(Some(Duration::from_secs(8)));
    session.expect("Every 1s: seq 200").expect("header drawn");
    session.send("G").expect("send G");
    session.expect("200").expect("bottom shown");
    session.send("g").expect("send g");
    session.send("j").expect("send j");
    session.send(" ").expect("send space");
    session.send("\u{3}").expect("send ctrl-c");
    session.expect(Eof).expect("session exited");
}

#[test]
fn pty_e2e_ctrl_c_interrupts_long_running_command() {
    let cmd = leer(&["-n", "1", "sleep", "30"]);
    let mut session = expectrl::Session::spawn(cmd).expect("spawn pty");
    session.set_expect_timeout(Some(Duration::from_secs(8)));
    session.expect("running").expect("run in progress");

    let pressed = Instant::now();
    session.send("\u{3}").expect("send ctrl-c");
    session.expect(Eof).expect("session exited");
    assert!(pressed.elapsed() < Duration::from_secs(5));
}
