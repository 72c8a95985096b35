//! Resource-tree traversal order, the request header contract and
//! per-request failure accounting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::{timeout, Duration};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_loadgen::{
    LoadGeneratorBuilder, NodeListener, Resource, ResourceInfo, TreeListener, Transport,
};

fn builder_for(server: &MockServer) -> LoadGeneratorBuilder {
    let address = server.address();
    LoadGeneratorBuilder::new()
        .host(address.ip().to_string())
        .port(address.port())
        .transport(Transport::Http1)
}

#[derive(Default)]
struct NodeOrder {
    paths: Mutex<Vec<String>>,
    statuses: Mutex<Vec<u16>>,
}

impl NodeListener for NodeOrder {
    fn on_node(&self, info: &ResourceInfo) {
        self.paths
            .lock()
            .unwrap()
            .push(info.path.clone().unwrap_or_default());
        self.statuses.lock().unwrap().push(info.status.unwrap_or(0));
    }
}

/// Records how many node events had fired when the tree event arrived.
struct TreeAfterNodes {
    order: Arc<NodeOrder>,
    trees: AtomicUsize,
    nodes_seen_at_tree: AtomicUsize,
}

impl TreeListener for TreeAfterNodes {
    fn on_tree(&self, _info: &ResourceInfo) {
        self.trees.fetch_add(1, Ordering::SeqCst);
        self.nodes_seen_at_tree
            .store(self.order.paths.lock().unwrap().len(), Ordering::SeqCst);
    }
}

// --- Scenario: resource tree ---

#[tokio::test]
async fn waterfall_tree_fires_nodes_in_declared_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let order = Arc::new(NodeOrder::default());
    let tree = Arc::new(TreeAfterNodes {
        order: order.clone(),
        trees: AtomicUsize::new(0),
        nodes_seen_at_tree: AtomicUsize::new(0),
    });

    let generator = builder_for(&server)
        .users(1)
        .workers(1)
        .iterations(1)
        .resource(
            Resource::new("/").children(vec![
                Resource::new("/1").children(vec![Resource::new("/11")])
            ]),
        )
        .node_listener(order.clone())
        .tree_listener(tree.clone())
        .build()
        .unwrap();

    timeout(Duration::from_secs(5), generator.begin())
        .await
        .unwrap()
        .expect("run should succeed");

    // Parents drain before their children complete, so node events keep
    // the declared order down the waterfall.
    assert_eq!(*order.paths.lock().unwrap(), vec!["/", "/1", "/11"]);
    assert!(order.statuses.lock().unwrap().iter().all(|s| *s == 200));

    // The tree event fired exactly once, strictly after every node event.
    assert_eq!(tree.trees.load(Ordering::SeqCst), 1);
    assert_eq!(tree.nodes_seen_at_tree.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn group_roots_issue_children_without_a_request_of_their_own() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let order = Arc::new(NodeOrder::default());

    let generator = builder_for(&server)
        .users(1)
        .workers(1)
        .iterations(1)
        .resource(Resource::group(vec![
            Resource::new("/a"),
            Resource::new("/b"),
        ]))
        .node_listener(order.clone())
        .build()
        .unwrap();

    timeout(Duration::from_secs(5), generator.begin())
        .await
        .unwrap()
        .expect("run should succeed");

    // The group itself issues nothing.
    assert_eq!(generator.requests_issued(), 2);
    let mut paths = order.paths.lock().unwrap().clone();
    paths.sort();
    assert_eq!(paths, vec!["/a", "/b"]);
}

// --- Header contract ---

#[tokio::test]
async fn requests_carry_timing_and_session_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .and(header_exists("X-Download"))
        .and(header_exists("After-Send-Time"))
        .and(header_exists("Cookie"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
        .expect(1)
        .mount(&server)
        .await;

    let generator = builder_for(&server)
        .users(1)
        .workers(1)
        .iterations(1)
        .resource(Resource::new("/download").response_length(64))
        .build()
        .unwrap();

    timeout(Duration::from_secs(5), generator.begin())
        .await
        .unwrap()
        .expect("run should succeed");

    // wiremock verifies the header expectations when the server drops.
}

#[tokio::test]
async fn request_bodies_and_response_bytes_are_accounted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 256]))
        .mount(&server)
        .await;

    #[derive(Default)]
    struct Bytes {
        sent: AtomicU64,
        received: AtomicU64,
    }
    impl NodeListener for Bytes {
        fn on_node(&self, info: &ResourceInfo) {
            self.sent.store(info.bytes_sent, Ordering::SeqCst);
            self.received.store(info.bytes_received, Ordering::SeqCst);
        }
    }
    let bytes = Arc::new(Bytes::default());

    let generator = builder_for(&server)
        .users(1)
        .workers(1)
        .iterations(1)
        .resource(
            Resource::new("/upload")
                .method(reqwest::Method::POST)
                .request_length(128),
        )
        .node_listener(bytes.clone())
        .build()
        .unwrap();

    timeout(Duration::from_secs(5), generator.begin())
        .await
        .unwrap()
        .expect("run should succeed");

    assert_eq!(bytes.sent.load(Ordering::SeqCst), 128);
    assert_eq!(bytes.received.load(Ordering::SeqCst), 256);
}

// --- Per-path statistics ---

#[tokio::test]
async fn response_times_are_tracked_per_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let generator = builder_for(&server)
        .users(1)
        .workers(1)
        .iterations(2)
        .resource(Resource::new("/index").children(vec![Resource::new("/style.css")]))
        .build()
        .unwrap();

    timeout(Duration::from_secs(5), generator.begin())
        .await
        .unwrap()
        .expect("run should succeed");

    let summaries = generator.response_time_summaries();
    let paths: Vec<_> = summaries.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, vec!["/index", "/style.css"]);
    assert!(summaries.iter().all(|(_, s)| s.count == 2));

    let latency = generator.latency_summary().unwrap();
    assert_eq!(latency.count, 4);
}

// --- Failure accounting ---

#[tokio::test]
async fn transport_failures_complete_the_subtree() {
    // Nothing listens on this port; connections are refused.
    let order = Arc::new(NodeOrder::default());
    let tree = Arc::new(TreeAfterNodes {
        order: order.clone(),
        trees: AtomicUsize::new(0),
        nodes_seen_at_tree: AtomicUsize::new(0),
    });

    let generator = LoadGeneratorBuilder::new()
        .host("127.0.0.1")
        .port(9)
        .transport(Transport::Http1)
        .users(1)
        .workers(1)
        .iterations(1)
        .resource(Resource::new("/").children(vec![Resource::new("/child")]))
        .node_listener(order.clone())
        .tree_listener(tree.clone())
        .build()
        .unwrap();

    let result = timeout(Duration::from_secs(10), generator.begin())
        .await
        .expect("failed requests must not stall the run");

    // Per-request errors never fail the run.
    assert!(result.is_ok());
    assert_eq!(generator.failures(), 1);
    assert!(order.paths.lock().unwrap().is_empty());
    // The subtree still completed: the tree event fired once.
    assert_eq!(tree.trees.load(Ordering::SeqCst), 1);
    // Failed requests record nothing.
    assert!(generator.latency_summary().is_none());
}

#[tokio::test]
async fn http_errors_count_as_failures_only_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let lenient = builder_for(&server)
        .users(1)
        .workers(1)
        .iterations(1)
        .resource(Resource::new("/"))
        .build()
        .unwrap();
    lenient.begin().await.expect("run should succeed");
    assert_eq!(lenient.failures(), 0);
    assert_eq!(lenient.latency_summary().unwrap().count, 1);

    let strict = builder_for(&server)
        .users(1)
        .workers(1)
        .iterations(1)
        .resource(Resource::new("/"))
        .fail_on_http_error(true)
        .build()
        .unwrap();
    strict.begin().await.expect("per-request failures never fail the run");
    assert_eq!(strict.failures(), 1);
    assert!(strict.latency_summary().is_none());
}
