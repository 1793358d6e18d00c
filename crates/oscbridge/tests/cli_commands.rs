#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};

use serde_json::Value;

fn oscbridge() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_oscbridge"));
    command.arg("--log-level").arg("error").arg("--format").arg("json");
    command
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

struct Server {
    child: Child,
    stdout: BufReader<ChildStdout>,
    address: String,
}

impl Server {
    fn start(boards: &[&str]) -> Self {
        let mut command = oscbridge();
        command
            .arg("serve")
            .arg("--bind")
            .arg("127.0.0.1")
            .arg("--port")
            .arg("0");
        for board in boards {
            command.arg("--board").arg(board);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");
        let mut stdout = BufReader::new(child.stdout.take().expect("stdout should be piped"));

        let status = read_json_line(&mut stdout);
        assert_eq!(status["event"], "listening");
        let address = status["address"]
            .as_str()
            .expect("listening line should carry an address")
            .to_string();
        Self {
            child,
            stdout,
            address,
        }
    }

    fn next_event(&mut self) -> Value {
        read_json_line(&mut self.stdout)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn read_json_line(reader: &mut BufReader<ChildStdout>) -> Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("stdout should be readable");
    serde_json::from_str(&line).expect("stdout line should be JSON")
}

#[test]
fn encode_then_decode() {
    let output = oscbridge()
        .arg("encode")
        .arg("/appled/0/state 1")
        .arg("/system/name \"Make Kit\"")
        .output()
        .expect("encode should run");
    assert!(output.status.success());
    let encoded = &json_lines(&output.stdout)[0];
    assert_eq!(encoded["bundle"], true);
    let hex = encoded["hex"].as_str().expect("hex should be a string");
    assert!(hex.starts_with("2362756e646c6500"));

    let output = oscbridge()
        .arg("decode")
        .arg(hex)
        .output()
        .expect("decode should run");
    assert!(output.status.success());
    let decoded = &json_lines(&output.stdout)[0];
    assert_eq!(decoded["messages"][0]["address"], "/appled/0/state");
    assert_eq!(decoded["messages"][0]["arguments"][0]["value"], 1);
    assert_eq!(decoded["messages"][1]["arguments"][0]["value"], "Make Kit");
}

#[test]
fn single_message_is_not_a_bundle() {
    let output = oscbridge()
        .arg("encode")
        .arg("/digitalin/2/value 1")
        .output()
        .expect("encode should run");
    let encoded = &json_lines(&output.stdout)[0];
    assert_eq!(encoded["bundle"], false);
    assert_eq!(
        encoded["hex"],
        "2f6469676974616c696e2f322f76616c756500002c69000000000001"
    );
}

#[test]
fn decode_reports_bad_input() {
    let output = oscbridge()
        .arg("decode")
        .arg("abc")
        .output()
        .expect("decode should run");
    assert_eq!(output.status.code(), Some(64));

    let output = oscbridge()
        .arg("decode")
        .arg("00000000")
        .output()
        .expect("decode should run");
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn xml_renders_oscpacket() {
    let output = oscbridge()
        .arg("xml")
        .arg("--source")
        .arg("192.168.0.200")
        .arg("/analogin/0/value 512")
        .output()
        .expect("xml should run");
    assert!(output.status.success());
    let doc = &json_lines(&output.stdout)[0];
    assert_eq!(doc["kind"], "OSCPACKET");
    assert!(doc["document"]
        .as_str()
        .expect("document should be a string")
        .contains("<ARGUMENT TYPE=\"i\" VALUE=\"512\"/>"));
}

#[test]
fn listen_sees_greeting() {
    let server = Server::start(&["/dev/ttyACM0:usb"]);

    let output = oscbridge()
        .arg("listen")
        .arg(&server.address)
        .arg("--count")
        .arg("2")
        .output()
        .expect("listen should run");
    assert!(output.status.success());

    let docs = json_lines(&output.stdout);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["kind"], "cross-domain-policy");
    assert_eq!(docs[1]["kind"], "BOARD_ARRIVAL");
    assert!(docs[1]["document"]
        .as_str()
        .expect("document should be a string")
        .contains("LOCATION=\"/dev/ttyACM0\""));
}

#[test]
fn send_reaches_board_transport() {
    let mut server = Server::start(&[]);

    let output = oscbridge()
        .arg("send")
        .arg(&server.address)
        .arg("--to")
        .arg("192.168.0.200")
        .arg("--port")
        .arg("10000")
        .arg("/appled/0/state 1")
        .output()
        .expect("send should run");
    assert!(output.status.success());
    assert_eq!(json_lines(&output.stdout)[0]["event"], "sent");

    let forwarded = server.next_event();
    assert_eq!(forwarded["event"], "forwarded");
    assert_eq!(forwarded["destination"], "192.168.0.200:10000");
    assert_eq!(forwarded["messages"][0]["address"], "/appled/0/state");
}

#[test]
fn send_to_closed_port_is_transport_error() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("probe should bind");
        probe.local_addr().expect("probe has address").port()
    };
    let output = oscbridge()
        .arg("send")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--to")
        .arg("x")
        .arg("/a")
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_oscbridge"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("oscbridge {}", env!("CARGO_PKG_VERSION")));
}
