//! End-to-end worker tests over real ZeroMQ IPC sockets

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use powerhose_worker::{
    ExitReason, Job, RegistrationError, RegistrationState, WorkerConfig, WorkerNode,
    WorkerNodeBuilder, ZmqTransport,
};

/// REP socket answering PING and REMOVE until told to stop
struct FakeDispatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Vec<Vec<u8>>>>,
}

impl FakeDispatcher {
    fn start(endpoint: &str, answer: bool) -> Self {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::REP).unwrap();
        socket.set_linger(0).unwrap();
        socket.bind(endpoint).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while !stop.load(Ordering::Acquire) {
                    if socket.poll(zmq::POLLIN, 20).unwrap() == 0 {
                        continue;
                    }
                    let request = socket.recv_bytes(0).unwrap();
                    seen.push(request.clone());
                    if !answer {
                        // A REP socket that never answers keeps every later request queued
                        continue;
                    }
                    let reply: &[u8] = if request.starts_with(b"PING") {
                        b"PONG"
                    } else if request.starts_with(b"REMOVE") {
                        b"REMOVED"
                    } else {
                        b"ERROR"
                    };
                    socket.send(reply, 0).unwrap();
                }
                seen
            })
        };

        Self {
            stop,
            thread: Some(thread),
        }
    }

    fn shutdown(mut self) -> Vec<Vec<u8>> {
        self.stop.store(true, Ordering::Release);
        self.thread
            .take()
            .map(|thread| thread.join().unwrap())
            .unwrap_or_default()
    }
}

fn config(dir: &tempfile::TempDir) -> WorkerConfig {
    let mut config = WorkerConfig::new(
        format!("ipc://{}/front.ipc", dir.path().display()),
        format!("ipc://{}/worker-$WID.ipc", dir.path().display()),
    );
    config.timeout_seconds = 0.3;
    config.heartbeat.interval_seconds = 0.05;
    config.shutdown_grace_ms = 10;
    config
}

fn echo(job: Job) -> anyhow::Result<Vec<u8>> {
    Ok(job.data.into_bytes())
}

#[test]
fn test_worker_serves_jobs_over_ipc() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let dispatcher = FakeDispatcher::start(&config.endpoint, true);

    let node = WorkerNodeBuilder::new(config, echo)
        .process_id(4242)
        .build(ZmqTransport::new())
        .unwrap();
    let identity = node.identity().address().to_string();
    let socket_file = node.identity().ipc_path().unwrap().to_path_buf();
    assert_eq!(identity, format!("ipc://{}/worker-4242.ipc", dir.path().display()));

    let runner = {
        let node = node.clone();
        thread::spawn(move || node.run())
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while node.state() != RegistrationState::Running && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(node.state(), RegistrationState::Running);

    let context = zmq::Context::new();
    let sender = context.socket(zmq::REQ).unwrap();
    sender.set_linger(0).unwrap();
    sender.set_rcvtimeo(5000).unwrap();
    sender.connect(&identity).unwrap();

    let mut request = b"JOB:::".to_vec();
    request.extend(Job::new("over the wire").to_payload());
    sender.send(request, 0).unwrap();
    assert_eq!(sender.recv_bytes(0).unwrap(), b"JOBRES:::over the wire".to_vec());

    sender.send(&b"FOO:::bar"[..], 0).unwrap();
    assert_eq!(sender.recv_bytes(0).unwrap(), b"ERROR:::".to_vec());
    drop(sender);

    node.stop();
    assert_eq!(runner.join().unwrap().unwrap(), ExitReason::Stopped);
    assert_eq!(node.state(), RegistrationState::Stopped);
    assert!(!socket_file.exists(), "IPC socket file left behind");

    let seen = dispatcher.shutdown();
    let expected_ping = format!("PING:::{identity}").into_bytes();
    assert_eq!(seen.first(), Some(&expected_ping));
    assert_eq!(
        seen.last(),
        Some(&format!("REMOVE:::{identity}").into_bytes())
    );
}

#[test]
fn test_register_without_reply_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let dispatcher = FakeDispatcher::start(&config.endpoint, false);

    let node = WorkerNode::new(config, echo, ZmqTransport::new()).unwrap();

    let started = Instant::now();
    assert_eq!(node.register(), Err(RegistrationError::NoReply));
    assert!(started.elapsed() >= Duration::from_millis(250));

    // The relaxed REQ socket accepts a new request after the timeout
    assert_eq!(node.register(), Err(RegistrationError::NoReply));

    node.stop();
    assert_eq!(node.state(), RegistrationState::Stopped);
    dispatcher.shutdown();
}

#[test]
fn test_worker_without_dispatcher_fails_to_run() {
    let dir = tempfile::tempdir().unwrap();
    let node = WorkerNode::new(config(&dir), echo, ZmqTransport::new()).unwrap();
    let socket_file = node.identity().ipc_path().unwrap().to_path_buf();

    let result = node.run();
    assert!(result.is_err());
    assert_eq!(node.state(), RegistrationState::Stopped);
    assert!(!socket_file.exists());
}
