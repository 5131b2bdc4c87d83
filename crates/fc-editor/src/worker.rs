//! Background worker for pure computations.
//!
//! The worker never touches the live scene. It receives owned Document
//! copies, computes layout suggestions, SVG strings or statistics, and sends
//! the result back tagged with the request's kind and sequence number. A
//! newer request of the same kind supersedes older ones: their responses are
//! dropped on arrival rather than cancelled.

use fc_core::id::NodeId;
use fc_core::layout::{LayoutConfig, suggest_layout};
use fc_core::model::{Document, Point};
use fc_core::stats::{DiagramStats, compute_stats};
use fc_render::svg::{SvgOptions, document_to_svg};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    Layout,
    Svg,
    Stats,
}

#[derive(Debug, Clone)]
pub enum WorkRequest {
    Layout(Document, LayoutConfig),
    Svg(Document),
    Stats(Document),
}

impl WorkRequest {
    pub fn kind(&self) -> WorkKind {
        match self {
            WorkRequest::Layout(..) => WorkKind::Layout,
            WorkRequest::Svg(_) => WorkKind::Svg,
            WorkRequest::Stats(_) => WorkKind::Stats,
        }
    }

    fn compute(self) -> WorkResult {
        match self {
            WorkRequest::Layout(doc, config) => WorkResult::Layout(suggest_layout(&doc, &config)),
            WorkRequest::Svg(doc) => WorkResult::Svg(document_to_svg(&doc, &SvgOptions::default())),
            WorkRequest::Stats(doc) => WorkResult::Stats(compute_stats(&doc)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkResult {
    Layout(Vec<(NodeId, Point)>),
    Svg(String),
    Stats(DiagramStats),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkResponse {
    pub kind: WorkKind,
    pub seq: u64,
    pub result: WorkResult,
}

pub struct Worker {
    requests: Option<Sender<(u64, WorkRequest)>>,
    responses: Receiver<WorkResponse>,
    thread: Option<JoinHandle<()>>,
    next_seq: u64,
    latest: HashMap<WorkKind, u64>,
}

impl Worker {
    pub fn spawn() -> std::io::Result<Self> {
        let (req_tx, req_rx) = mpsc::channel::<(u64, WorkRequest)>();
        let (resp_tx, resp_rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("fc-worker".into())
            .spawn(move || {
                for (seq, request) in req_rx {
                    let kind = request.kind();
                    let result = request.compute();
                    log::trace!("worker finished {kind:?} #{seq}");
                    if resp_tx.send(WorkResponse { kind, seq, result }).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            requests: Some(req_tx),
            responses: resp_rx,
            thread: Some(thread),
            next_seq: 1,
            latest: HashMap::new(),
        })
    }

    /// Queue a request. Returns its sequence number, or `None` if the worker
    /// has stopped.
    pub fn submit(&mut self, request: WorkRequest) -> Option<u64> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let kind = request.kind();
        self.requests.as_ref()?.send((seq, request)).ok()?;
        self.latest.insert(kind, seq);
        Some(seq)
    }

    fn is_current(&self, response: &WorkResponse) -> bool {
        self.latest.get(&response.kind) == Some(&response.seq)
    }

    /// All responses that have arrived and are still current.
    pub fn poll(&mut self) -> Vec<WorkResponse> {
        let arrived: Vec<_> = self.responses.try_iter().collect();
        arrived
            .into_iter()
            .filter(|r| {
                let current = self.is_current(r);
                if !current {
                    log::debug!("dropping stale {:?} response #{}", r.kind, r.seq);
                }
                current
            })
            .collect()
    }

    /// Block until a current response arrives or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Option<WorkResponse> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if self.is_current(&response) => return Some(response),
                Ok(response) => log::debug!("dropping stale {:?} response #{}", response.kind, response.seq),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.requests = None;
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("worker thread panicked");
        }
    }
}
