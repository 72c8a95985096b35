//! Resource trees: the immutable description of what each iteration issues.
//!
//! A [`Resource`] is one HTTP request plus optional children. A node with no
//! path is a group: it contributes no request of its own but its children
//! are still issued. Children start once the parent response has begun and
//! run in parallel with the parent body drain, modelling browser-style
//! waterfalls; a group issues its children immediately.

use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use reqwest::header::COOKIE;
use reqwest::Method;
use tracing::debug;

use crate::errors::RequestFailure;
use crate::handler::{ResultHandler, SampleMode};
use crate::listeners::RequestEvent;

/// Header asking the test server to echo a body of exactly that many bytes.
pub const DOWNLOAD_HEADER: &str = "X-Download";

/// Header carrying the monotonic nanosecond timestamp taken at send, read
/// back on completion so latency is computed independently of the client's
/// internal timing.
pub const AFTER_SEND_TIME_HEADER: &str = "After-Send-Time";

/// One node of the request tree.
#[derive(Debug, Clone)]
pub struct Resource {
    path: Option<String>,
    method: Method,
    response_length: u64,
    request_length: u64,
    children: Vec<Resource>,
}

impl Resource {
    /// A request node. The path should start with `/`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            method: Method::GET,
            response_length: 0,
            request_length: 0,
            children: Vec::new(),
        }
    }

    /// A grouping node with no request of its own.
    pub fn group(children: Vec<Resource>) -> Self {
        Self {
            path: None,
            method: Method::GET,
            response_length: 0,
            request_length: 0,
            children,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Requested response body length in bytes; 0 leaves the server default.
    pub fn response_length(mut self, bytes: u64) -> Self {
        self.response_length = bytes;
        self
    }

    /// Request body length in zero-bytes.
    pub fn request_length(mut self, bytes: u64) -> Self {
        self.request_length = bytes;
        self
    }

    pub fn children(mut self, children: Vec<Resource>) -> Self {
        self.children = children;
        self
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Post-order traversal over the subtree.
    pub fn walk<F: FnMut(&Resource)>(&self, visitor: &mut F) {
        for child in &self.children {
            child.walk(visitor);
        }
        visitor(self);
    }

    /// Number of nodes in the subtree that issue a request.
    pub fn count_resources(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |resource| {
            if resource.path.is_some() {
                count += 1;
            }
        });
        count
    }

    /// Issue every request of this subtree.
    ///
    /// Resolves once the whole subtree has a terminal outcome, returning the
    /// info of this node. Node events for descendants fire inside the
    /// recursion; the caller fires the tree event after this resolves.
    pub(crate) fn issue<'a>(&'a self, ctx: &'a IssueContext<'a>) -> BoxFuture<'a, ResourceInfo> {
        async move {
            match self.path.as_deref() {
                None => {
                    let mut info = ResourceInfo::new(None, self.method.clone());
                    let children = join_all(self.children.iter().map(|c| c.issue(ctx))).await;
                    info.failed = children.iter().any(|c| c.failed);
                    info
                }
                Some(path) => self.issue_request(path, ctx).await,
            }
        }
        .boxed()
    }

    async fn issue_request<'a>(&'a self, path: &'a str, ctx: &'a IssueContext<'a>) -> ResourceInfo {
        let mut info = ResourceInfo::new(Some(path.to_string()), self.method.clone());
        let event = RequestEvent {
            worker_id: ctx.worker_id,
            method: self.method.clone(),
            path: path.to_string(),
        };

        info.request_start = ctx.now_nanos();

        let url = format!("{}{}", ctx.base_url, path);
        let mut builder = ctx
            .client
            .request(self.method.clone(), &url)
            .header(AFTER_SEND_TIME_HEADER, info.request_start)
            .header(COOKIE, ctx.session_cookie);
        if self.response_length > 0 {
            builder = builder.header(DOWNLOAD_HEADER, self.response_length);
        }
        if self.request_length > 0 {
            info.bytes_sent = self.request_length;
            builder = builder.body(vec![0u8; self.request_length as usize]);
        }

        let request = match builder.build() {
            Ok(request) => request,
            Err(error) => {
                let failure = RequestFailure::from_reqwest(&error);
                ctx.handler.on_request_failure(&event, &failure);
                info.failed = true;
                return info;
            }
        };
        ctx.handler.on_request_begin(&event, &request);

        match ctx.client.execute(request).await {
            Ok(mut response) => {
                info.response_begin = ctx.now_nanos();
                info.status = Some(response.status().as_u16());
                let headers = response.headers().clone();
                // The response has begun: the first observable point after
                // the request was fully sent.
                ctx.handler.on_request_commit(&event);

                // The parent drains its body while the children run; the
                // node event fires as soon as the parent itself is done, so
                // node events keep declaration order down the waterfall.
                let parent = async move {
                    let mut received = 0u64;
                    while let Ok(Some(chunk)) = response.chunk().await {
                        received += chunk.len() as u64;
                    }
                    info.bytes_received = received;
                    info.response_end = ctx.now_nanos();
                    let status = info.status.unwrap_or(0);
                    info.failed = ctx.handler.on_exchange_complete(&event, status, &headers);
                    if !info.failed {
                        ctx.handler.on_node_complete(&info, ctx.mode);
                    }
                    info
                };
                let children = join_all(self.children.iter().map(|c| c.issue(ctx)));

                let (mut info, child_infos) = tokio::join!(parent, children);
                info.failed |= child_infos.iter().any(|c| c.failed);
                info
            }
            Err(error) => {
                let failure = RequestFailure::from_reqwest(&error);
                ctx.handler.on_request_failure(&event, &failure);
                debug!(
                    worker_id = ctx.worker_id,
                    path = %path,
                    category = %failure.category,
                    "request failed, completing subtree without children"
                );
                info.failed = true;
                info
            }
        }
    }
}

/// Timing and outcome of one in-flight resource occurrence.
///
/// Timestamps are monotonic nanoseconds from the engine epoch. Latency is
/// the time to first response byte, response time the time to the last.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub path: Option<String>,
    pub method: Method,
    pub request_start: u64,
    pub response_begin: u64,
    pub response_end: u64,
    pub status: Option<u16>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub failed: bool,
}

impl ResourceInfo {
    fn new(path: Option<String>, method: Method) -> Self {
        Self {
            path,
            method,
            request_start: 0,
            response_begin: 0,
            response_end: 0,
            status: None,
            bytes_sent: 0,
            bytes_received: 0,
            failed: false,
        }
    }

    /// Time from request submission to first response byte, in nanoseconds.
    pub fn latency(&self) -> u64 {
        self.response_begin.saturating_sub(self.request_start)
    }

    /// Time from request submission to last response byte, in nanoseconds.
    pub fn response_time(&self) -> u64 {
        self.response_end.saturating_sub(self.request_start)
    }
}

/// Everything a subtree issue needs, borrowed from the owning runner.
pub(crate) struct IssueContext<'a> {
    pub client: &'a reqwest::Client,
    pub base_url: &'a str,
    pub session_cookie: &'a str,
    pub handler: &'a ResultHandler,
    pub mode: SampleMode,
    pub worker_id: usize,
    pub epoch: Instant,
}

impl IssueContext<'_> {
    pub fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}
