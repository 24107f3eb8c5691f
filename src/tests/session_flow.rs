// Session Flow Tests
// A real node on a loopback port, driven through PeerClient

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use crate::api::Metrics;
use crate::chain::LocalChain;
use crate::config::NodeConfig;
use crate::directory::{PeerDirectory, PeerSchema, PeerStore};
use crate::discovery;
use crate::handshake::{
    generate_nonce, HandshakeIdentity, HandshakeValidator, LocalIdentity, NodeVersion,
};
use crate::rpc::{RpcDispatcher, RpcResponse};
use crate::transport::{self, PeerClient, TransportContext, TransportError};
use crate::types::{Broadhash, PeerRecord, PeerState};

const NETHASH: &str = "198f2b61a8eb95fbeed58b8216780b68f697f26b849acf00c8c93bb9b24f783d";
const OTHER_NETHASH: &str = "da3ed6a45429278bac2666961289ca17ad86595d33b31037615d4b8e8f158bba";

/// A running node and the handles tests need to inspect it
pub struct TestNode {
    pub addr: SocketAddr,
    pub nonce: String,
    pub store: Arc<PeerDirectory>,
    pub chain: Arc<LocalChain>,
    pub metrics: Arc<Metrics>,
    _dir: TempDir,
}

impl TestNode {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let config = Arc::new(NodeConfig {
            nethash: NETHASH.to_string(),
            min_version: "0.1.0".to_string(),
            discovery_flush_secs: 1,
            ..NodeConfig::default()
        });

        let nonce = generate_nonce();
        let validator = Arc::new(HandshakeValidator::new(LocalIdentity {
            nethash: config.nethash.clone(),
            min_version: config.min_node_version().unwrap(),
            nonce: nonce.clone(),
            port: config.ws_port,
        }));

        let store = Arc::new(
            PeerDirectory::open(dir.path(), Arc::new(PeerSchema::default())).unwrap(),
        );
        let chain = Arc::new(LocalChain::genesis(
            Broadhash::from_hex(NETHASH).unwrap(),
            config.initial_height,
        ));
        let metrics = Arc::new(Metrics::new());

        let dyn_store: Arc<dyn PeerStore> = store.clone();
        let (discovery_tx, discovery_rx) = discovery::channel();
        tokio::spawn(discovery::run_discovery(
            discovery_rx,
            dyn_store.clone(),
            metrics.clone(),
            config.discovery_flush_secs,
        ));

        let ctx = Arc::new(TransportContext {
            config: config.clone(),
            validator,
            dispatcher: Arc::new(RpcDispatcher::new(dyn_store, chain.clone())),
            metrics: metrics.clone(),
            discovery: discovery_tx,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(transport::run_server(listener, ctx));

        Self {
            addr,
            nonce,
            store,
            chain,
            metrics,
            _dir: dir,
        }
    }

    /// Open a session with a valid identity advertising `port`
    pub async fn connect(&self, port: u16) -> PeerClient {
        PeerClient::connect(self.addr, Some(peer_query(NETHASH, "0.9.0", port)))
            .await
            .unwrap()
    }

    /// Poll the directory until it holds `count` peers or the deadline passes
    pub async fn wait_for_peers(&self, count: usize) -> Vec<PeerRecord> {
        for _ in 0..50 {
            let peers = self.store.list().unwrap();
            if peers.len() >= count {
                return peers;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.store.list().unwrap()
    }
}

fn peer_query(nethash: &str, version: &str, port: u16) -> String {
    HandshakeIdentity {
        nethash: nethash.to_string(),
        version: version.parse::<NodeVersion>().unwrap(),
        nonce: generate_nonce(),
        port,
        self_probe: false,
    }
    .to_query()
}

fn expect_rejected(result: Result<PeerClient, TransportError>) -> String {
    match result {
        Err(TransportError::HandshakeRejected(reason)) => reason,
        Err(other) => panic!("expected handshake rejection, got {}", other),
        Ok(_) => panic!("expected handshake rejection, session was accepted"),
    }
}

// =============================================================================
// HANDSHAKE GATING
// =============================================================================

pub mod handshake_gating {
    use super::*;

    #[tokio::test]
    async fn test_connection_without_identity_is_rejected() {
        let node = TestNode::start().await;

        let reason = expect_rejected(PeerClient::connect(node.addr, None).await);
        assert!(reason.contains("no identity"));
        assert_eq!(
            node.metrics.handshakes_rejected.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_valid_identity_is_accepted() {
        let node = TestNode::start().await;

        let mut client = node.connect(4002).await;
        assert_eq!(client.remote(), node.addr);
        assert_eq!(client.call("ping").await.unwrap(), RpcResponse::ping());
        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_network_is_rejected_and_not_recorded() {
        let node = TestNode::start().await;

        let query = peer_query(OTHER_NETHASH, "0.9.0", 4002);
        let reason = expect_rejected(PeerClient::connect(node.addr, Some(query)).await);
        assert!(reason.contains("network mismatch"));

        // Give discovery more than one flush interval
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(node.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_old_version_is_rejected() {
        let node = TestNode::start().await;

        let query = peer_query(NETHASH, "0.0.9", 4002);
        let reason = expect_rejected(PeerClient::connect(node.addr, Some(query)).await);
        assert!(reason.contains("incompatible version"));
    }

    #[tokio::test]
    async fn test_own_nonce_is_rejected() {
        let node = TestNode::start().await;

        let query = HandshakeIdentity {
            nethash: NETHASH.to_string(),
            version: "0.9.0".parse().unwrap(),
            nonce: node.nonce.clone(),
            port: 4002,
            self_probe: false,
        }
        .to_query();

        let reason = expect_rejected(PeerClient::connect(node.addr, Some(query)).await);
        assert!(reason.contains("own nonce"));
    }

    #[tokio::test]
    async fn test_self_probe_is_served_but_never_recorded() {
        let node = TestNode::start().await;

        let query = HandshakeIdentity {
            nethash: NETHASH.to_string(),
            version: "0.9.0".parse().unwrap(),
            nonce: node.nonce.clone(),
            port: 4002,
            self_probe: true,
        }
        .to_query();

        let mut client = PeerClient::connect(node.addr, Some(query)).await.unwrap();
        assert!(client.call("status").await.unwrap().is_success());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(node.store.list().unwrap().is_empty());
    }
}

// =============================================================================
// RPC CALLS
// =============================================================================

pub mod rpc_calls {
    use super::*;

    #[tokio::test]
    async fn test_ping_back_to_back() {
        let node = TestNode::start().await;
        let mut client = node.connect(4002).await;

        for _ in 0..100 {
            assert_eq!(client.call("ping").await.unwrap(), RpcResponse::ping());
        }
    }

    #[tokio::test]
    async fn test_list_back_to_back() {
        let node = TestNode::start().await;
        node.store
            .insert_batch(&[PeerRecord {
                ip: "10.0.0.7".to_string(),
                ws_port: 5000,
                state: PeerState::Disconnected,
                height: 12,
                os: Some("linux".to_string()),
                version: Some("0.9.0".to_string()),
                clock: None,
                broadhash: None,
            }])
            .unwrap();

        let mut client = node.connect(4002).await;
        for _ in 0..100 {
            match client.call("list").await.unwrap() {
                RpcResponse::List(list) => {
                    assert!(list.success);
                    assert!(list.peers.iter().any(|p| p.ip == "10.0.0.7"));
                }
                other => panic!("expected list response, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_height_and_status_agree() {
        let node = TestNode::start().await;
        let mut client = node.connect(4002).await;

        let height = client.call("height").await.unwrap();
        let status = client.call("status").await.unwrap();
        assert_eq!(height.height_value(), Some(1));
        assert_eq!(status.height_value(), Some(1));

        match status {
            RpcResponse::Status(status) => assert_eq!(status.broadhash, NETHASH),
            other => panic!("expected status response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_follows_chain_tip() {
        let node = TestNode::start().await;
        let mut client = node.connect(4002).await;

        let tip = Broadhash([7u8; 32]);
        node.chain.update(42, tip).await;

        assert_eq!(client.call("height").await.unwrap(), RpcResponse::height(42));
        assert_eq!(
            client.call("status").await.unwrap(),
            RpcResponse::status(42, tip.to_hex())
        );
    }

    #[tokio::test]
    async fn test_unknown_procedure_fails_without_closing_session() {
        let node = TestNode::start().await;
        let mut client = node.connect(4002).await;

        match client.call("blocks").await.unwrap() {
            RpcResponse::Failure(failure) => {
                assert!(!failure.success);
                assert_eq!(failure.code, "UnknownProcedure");
            }
            other => panic!("expected failure response, got {:?}", other),
        }

        assert_eq!(client.call("ping").await.unwrap(), RpcResponse::ping());
    }

    #[tokio::test]
    async fn test_concurrent_sessions() {
        let node = Arc::new(TestNode::start().await);

        let mut handles = Vec::new();
        for i in 0..8u16 {
            let node = node.clone();
            handles.push(tokio::spawn(async move {
                let mut client = node.connect(6000 + i).await;
                for _ in 0..10 {
                    assert!(client.call("status").await.unwrap().is_success());
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}

// =============================================================================
// DISCOVERY
// =============================================================================

pub mod discovery_flow {
    use super::*;

    #[tokio::test]
    async fn test_accepted_peer_is_recorded() {
        let node = TestNode::start().await;
        let _client = node.connect(4002).await;

        let peers = node.wait_for_peers(1).await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].ip, "127.0.0.1");
        assert_eq!(peers[0].ws_port, 4002);
        assert_eq!(peers[0].state, PeerState::Connected);
        assert_eq!(peers[0].version.as_deref(), Some("0.9.0"));
    }

    #[tokio::test]
    async fn test_recorded_peer_is_listed_to_next_session() {
        let node = TestNode::start().await;
        let _first = node.connect(4002).await;
        node.wait_for_peers(1).await;

        let mut second = node.connect(4003).await;
        match second.call("list").await.unwrap() {
            RpcResponse::List(list) => {
                assert!(list.peers.iter().any(|p| p.ws_port == 4002));
            }
            other => panic!("expected list response, got {:?}", other),
        }
    }
}
