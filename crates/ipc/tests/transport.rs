//! End-to-end exercises of the Unix-domain transport against the stub
//! renderer server.

use std::time::Duration;

use yomi_ipc::testing::{StubRendererServer, StubServerConfig};
use yomi_ipc::{IPC_PROTOCOL_VERSION, IpcClientFactory, IpcError, UdsClientFactory};

fn service(tag: &str) -> String {
	format!("renderer-transport-test-{}-{tag}", std::process::id())
}

const CALL_DEADLINE: Duration = Duration::from_millis(100);

#[tokio::test]
async fn call_roundtrip_records_the_command() {
	let service = service("roundtrip");
	let server = StubRendererServer::spawn(&service).await.unwrap();

	let factory = UdsClientFactory::new();
	let mut client = factory.new_client(&service, "").await.unwrap();
	assert!(client.connected());
	assert_eq!(client.last_error(), None);
	assert_eq!(client.server_protocol_version(), IPC_PROTOCOL_VERSION);

	let reply = client.call(b"candidates", CALL_DEADLINE).await.unwrap();
	assert!(reply.is_empty());
	assert_eq!(server.received(), vec![b"candidates".to_vec()]);
}

#[tokio::test]
async fn absent_server_reads_as_not_connected() {
	let factory = UdsClientFactory::new();
	let client = factory.new_client(&service("absent"), "").await.unwrap();

	assert!(!client.connected());
	assert_eq!(client.last_error(), Some(IpcError::NotConnected));
}

#[tokio::test]
async fn hello_silence_reads_as_timeout() {
	let service = service("mute");
	let _server = StubRendererServer::spawn_with(
		&service,
		StubServerConfig {
			send_hello: false,
			..StubServerConfig::default()
		},
	)
	.await
	.unwrap();

	let factory = UdsClientFactory::with_connect_timeout(Duration::from_millis(50));
	let client = factory.new_client(&service, "").await.unwrap();

	assert!(!client.connected());
	assert_eq!(client.last_error(), Some(IpcError::Timeout));
}

#[tokio::test]
async fn unanswered_call_times_out() {
	let service = service("no-reply");
	let _server = StubRendererServer::spawn_with(
		&service,
		StubServerConfig {
			reply: false,
			..StubServerConfig::default()
		},
	)
	.await
	.unwrap();

	let factory = UdsClientFactory::new();
	let mut client = factory.new_client(&service, "").await.unwrap();
	assert!(client.connected());

	let got = client.call(b"cmd", Duration::from_millis(50)).await;
	assert_eq!(got, Err(IpcError::Timeout));
	assert_eq!(client.last_error(), Some(IpcError::Timeout));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn peer_verification_accepts_the_real_binary() {
	let service = service("peer-ok");
	let _server = StubRendererServer::spawn(&service).await.unwrap();

	// The stub runs inside this test process, so the expected path is the
	// test binary itself.
	let own_exe = std::env::current_exe().unwrap();
	let factory = UdsClientFactory::new();
	let client = factory
		.new_client(&service, own_exe.to_str().unwrap())
		.await
		.unwrap();
	assert!(client.connected());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn peer_verification_rejects_a_foreign_binary() {
	let service = service("peer-bad");
	let _server = StubRendererServer::spawn(&service).await.unwrap();

	let factory = UdsClientFactory::new();
	let client = factory
		.new_client(&service, "/definitely/not/the/renderer")
		.await
		.unwrap();

	assert!(!client.connected());
	assert_eq!(client.last_error(), Some(IpcError::ServerPathMismatch));
}

#[tokio::test(flavor = "multi_thread")]
async fn terminate_stops_the_server() {
	let service = service("terminate");
	let server = StubRendererServer::spawn(&service).await.unwrap();

	let factory = UdsClientFactory::new();
	assert!(factory.terminate_server(&service).await);

	// The stub processes the frame asynchronously.
	for _ in 0..50 {
		if server.was_terminated() {
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert!(server.was_terminated());
}

#[tokio::test]
async fn terminate_without_a_server_is_a_no_op() {
	let factory = UdsClientFactory::new();
	assert!(!factory.terminate_server(&service("terminate-absent")).await);
}
