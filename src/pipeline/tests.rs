use crate::batch::BatchEnvelope;
use crate::client::{BatchClient, BatchStreamConfig};
use crate::transport::{BatchTransport, TransportError};
use crate::types::{CallDescriptor, ItemPayload, ItemResult};
use crate::{BoxStream, Error, PipelineOptions, Result};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

type Responder = dyn Fn(usize, usize) -> (u16, String) + Send + Sync;

/// In-memory batch endpoint: answers every part of an envelope with the
/// status/body chosen by `respond(batch_seq, item_index)`.
struct ScriptedTransport {
    respond: Box<Responder>,
    chunk_size: usize,
    latency: Duration,
    fail_batches: Vec<usize>,
    sent: Mutex<Vec<(Instant, BatchEnvelope)>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

/// Counts a batch as in flight from `send` until its body stream is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    fn new(respond: impl Fn(usize, usize) -> (u16, String) + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            chunk_size: 7,
            latency: Duration::ZERO,
            fail_batches: Vec::new(),
            sent: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn ok_json() -> Self {
        Self::new(|seq, i| (200, json!({"batch": seq, "item": i}).to_string()))
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn failing(mut self, seq: usize) -> Self {
        self.fail_batches.push(seq);
        self
    }

    fn envelopes(&self) -> Vec<BatchEnvelope> {
        self.sent.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    fn sent_at(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    fn body_for(&self, envelope: &BatchEnvelope) -> String {
        let mut out = String::from("--batch_resp\r\n");
        for (i, _) in envelope.parts.iter().enumerate() {
            let (status, body) = (self.respond)(envelope.seq, i);
            out.push_str(&format!(
                "Content-Type: application/http\r\nContent-ID: <response-item-{}>\r\n\r\nHTTP/1.1 {} X\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n--batch_resp",
                i, status, body
            ));
            if i + 1 < envelope.parts.len() {
                out.push_str("\r\n");
            }
        }
        out.push_str("--\r\n");
        out
    }
}

#[async_trait::async_trait]
impl BatchTransport for ScriptedTransport {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<BoxStream<'static, Bytes>> {
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), envelope.clone()));
        let guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.fail_batches.contains(&envelope.seq) {
            return Err(Error::Transport(TransportError::Status {
                status: 503,
                body: "unavailable".into(),
            }));
        }

        let body = self.body_for(envelope).into_bytes();
        let chunks: Vec<Result<Bytes>> = body
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let latency = self.latency;
        let body = futures::stream::iter(chunks).then(move |chunk| {
            let _held = &guard;
            async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency / 10).await;
                }
                chunk
            }
        });
        Ok(Box::pin(body))
    }
}

fn client(transport: Arc<ScriptedTransport>, cfg: BatchStreamConfig) -> BatchClient {
    BatchClient::builder()
        .access_token("test-token")
        .config(cfg)
        .transport(transport)
        .build()
        .unwrap()
}

fn abc() -> Vec<CallDescriptor> {
    vec![
        CallDescriptor::get("https://api.example.com/a"),
        CallDescriptor::get("https://api.example.com/b"),
        CallDescriptor::post("https://api.example.com/c", json!({"x": 1})),
    ]
}

fn calls(n: usize) -> Vec<CallDescriptor> {
    (0..n)
        .map(|i| CallDescriptor::get(format!("https://api.example.com/{}", i)))
        .collect()
}

async fn run(
    client: &BatchClient,
    input: Vec<CallDescriptor>,
    options: PipelineOptions,
) -> Vec<Result<ItemResult>> {
    client
        .pipeline(futures::stream::iter(input), options)
        .unwrap()
        .collect()
        .await
}

#[tokio::test]
async fn test_three_descriptors_one_batch() {
    let transport = Arc::new(ScriptedTransport::ok_json());
    let client = client(transport.clone(), BatchStreamConfig::new());
    let results = run(&client, abc(), PipelineOptions::new().batch_size(3)).await;

    let envelopes = transport.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].parts.len(), 3);
    assert_eq!(envelopes[0].bearer_token(), Some("test-token"));
    assert!(envelopes[0].parts[2]
        .body
        .starts_with("POST https://api.example.com/c\nContent-Type: application/json"));

    assert_eq!(results.len(), 3);
    let indexes: BTreeSet<_> = results
        .into_iter()
        .map(|r| r.unwrap())
        .map(|r| {
            assert_eq!(r.status, Some(200));
            assert!(r.json().is_some());
            r.index.unwrap()
        })
        .collect();
    assert_eq!(indexes, BTreeSet::from([0, 1, 2]));
}

#[tokio::test]
async fn test_failed_item_is_suppressed_when_filtering() {
    let transport = Arc::new(ScriptedTransport::new(|_, i| {
        if i == 1 {
            (500, r#"{"error":"backend"}"#.to_string())
        } else {
            (200, r#"{"ok":true}"#.to_string())
        }
    }));
    let client = client(transport, BatchStreamConfig::new());

    let filtered = run(
        &client,
        abc(),
        PipelineOptions::new().batch_size(3).filter_errors(true),
    )
    .await;
    assert_eq!(filtered.len(), 2);
    assert!(filtered
        .iter()
        .all(|r| r.as_ref().unwrap().index != Some(1)));

    let unfiltered = run(&client, abc(), PipelineOptions::new().batch_size(3)).await;
    assert_eq!(unfiltered.len(), 3);
    let failed: Vec<_> = unfiltered
        .iter()
        .map(|r| r.as_ref().unwrap())
        .filter(|r| r.status == Some(500))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].json(), Some(&json!({"error": "backend"})));
}

#[tokio::test]
async fn test_undecodable_body_is_reported_inline() {
    let transport = Arc::new(ScriptedTransport::new(|_, i| {
        if i == 0 {
            (200, "not-json".to_string())
        } else {
            (200, "{}".to_string())
        }
    }));
    let client = client(transport, BatchStreamConfig::new().with_batch_size(3));

    let results = run(&client, abc(), PipelineOptions::new()).await;
    assert_eq!(results.len(), 3);
    let bad: Vec<_> = results
        .iter()
        .map(|r| r.as_ref().unwrap())
        .filter(|r| r.is_undecodable())
        .collect();
    assert_eq!(bad.len(), 1);
    match &bad[0].payload {
        ItemPayload::Undecodable { body, error } => {
            assert_eq!(body, "not-json");
            assert!(!error.is_empty());
        }
        other => panic!("unexpected payload {:?}", other),
    }

    let filtered = run(&client, abc(), PipelineOptions::new().filter_errors(true)).await;
    assert_eq!(filtered.len(), 2);
}

#[tokio::test]
async fn test_many_batches_cover_every_item_once() {
    let transport = Arc::new(ScriptedTransport::ok_json());
    let client = client(transport.clone(), BatchStreamConfig::new());
    let results = run(&client, calls(7), PipelineOptions::new().batch_size(3)).await;

    let sizes: Vec<_> = transport.envelopes().iter().map(|e| e.parts.len()).collect();
    assert_eq!(sizes.iter().sum::<usize>(), 7);
    assert_eq!(sizes.len(), 3);

    let indexes: BTreeSet<_> = results
        .into_iter()
        .map(|r| r.unwrap().index.unwrap())
        .collect();
    assert_eq!(indexes, (0..7).collect::<BTreeSet<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_batches_are_capped() {
    let transport = Arc::new(ScriptedTransport::ok_json().with_latency(Duration::from_millis(50)));
    let client = client(
        transport.clone(),
        BatchStreamConfig::new().with_parallel_requests(2),
    );
    let results = run(&client, calls(12), PipelineOptions::new().batch_size(2)).await;

    assert_eq!(results.len(), 12);
    assert_eq!(transport.envelopes().len(), 6);
    let max = transport.max_in_flight.load(Ordering::SeqCst);
    assert!(max >= 1 && max <= 2, "max in flight was {}", max);
    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_quota_delays_dispatch() {
    let transport = Arc::new(ScriptedTransport::ok_json());
    let cfg = BatchStreamConfig::new()
        .with_user_quota(4)
        .with_user_quota_time(Duration::from_secs(1));
    let client = client(transport.clone(), cfg);

    let start = Instant::now();
    let results = run(&client, calls(6), PipelineOptions::new().batch_size(2)).await;
    assert_eq!(results.len(), 6);

    let sent = transport.sent_at();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].duration_since(start) < Duration::from_millis(1));
    assert!(sent[1].duration_since(start) < Duration::from_millis(1));
    assert!(sent[2].duration_since(start) >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_transport_failure_only_fails_its_batch() {
    let transport = Arc::new(ScriptedTransport::ok_json().failing(1));
    let client = client(transport, BatchStreamConfig::new());
    let results = run(&client, calls(6), PipelineOptions::new().batch_size(2)).await;

    let errors: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], Err(Error::Transport(_))));

    let indexes: BTreeSet<_> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|r| r.index.unwrap())
        .collect();
    assert_eq!(indexes, BTreeSet::from([0, 1, 4, 5]));
}

#[tokio::test]
async fn test_framing_error_aborts_the_batch() {
    let transport = Arc::new(ScriptedTransport::new(|_, i| {
        if i == 0 {
            (200, "{}\r\n--batch_leak".to_string())
        } else {
            (200, "{}".to_string())
        }
    }));
    let client = client(transport, BatchStreamConfig::new());
    let results = run(&client, abc(), PipelineOptions::new().batch_size(3)).await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::Framing { .. })));
}

#[tokio::test]
async fn test_cost_above_quota_is_rejected_up_front() {
    let transport = Arc::new(ScriptedTransport::ok_json());
    let client = client(transport.clone(), BatchStreamConfig::new().with_user_quota(50));

    let err = client
        .pipeline(
            futures::stream::iter(calls(3)),
            PipelineOptions::new().batch_size(10).quota_cost_per_item(6),
        )
        .err()
        .unwrap();
    assert!(matches!(err, Error::Configuration { .. }));

    let err = client
        .pipeline(futures::stream::iter(calls(3)), PipelineOptions::new().batch_size(0))
        .err()
        .unwrap();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(transport.envelopes().is_empty());
}

#[tokio::test]
async fn test_empty_input() {
    let transport = Arc::new(ScriptedTransport::ok_json());
    let client = client(transport.clone(), BatchStreamConfig::new());
    let results = run(&client, Vec::new(), PipelineOptions::new()).await;
    assert!(results.is_empty());
    assert!(transport.envelopes().is_empty());
}

#[tokio::test]
async fn test_decode_response_offsets_indexes() {
    let body = "--b\r\nContent-Type: application/http\r\nContent-ID: <response-item-1>\r\n\r\nHTTP/1.1 200 OK\r\n\r\n[1]\r\n--b--\r\n";
    let stream: BoxStream<'static, Bytes> =
        Box::pin(futures::stream::iter(vec![Ok::<Bytes, Error>(
            Bytes::from_static(body.as_bytes()),
        )]));
    let items: Vec<_> = super::decode_response(stream, 200, false)
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    let item = items[0].as_ref().unwrap();
    assert_eq!(item.index, Some(201));
    assert_eq!(item.json(), Some(&json!([1])));
}

#[tokio::test]
async fn test_undecodable_body_keeps_bare_line_feeds() {
    let body = "--b\nContent-Type: application/http\nContent-ID: <response-item-0>\n\nHTTP/1.1 200 OK\n\nnot\njson\n--b--\n";
    let stream: BoxStream<'static, Bytes> =
        Box::pin(futures::stream::iter(vec![Ok::<Bytes, Error>(
            Bytes::from_static(body.as_bytes()),
        )]));
    let items: Vec<_> = super::decode_response(stream, 0, false).collect().await;
    assert_eq!(items.len(), 1);
    match &items[0].as_ref().unwrap().payload {
        ItemPayload::Undecodable { body, .. } => assert_eq!(body, "not\njson"),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_mid_body_transport_error_keeps_its_kind() {
    let chunks = vec![
        Ok(Bytes::from_static(
            b"--b\r\nContent-Type: application/http\r\nContent-ID: <response-item-0>\r\n",
        )),
        Err(Error::Transport(TransportError::Other("connection reset".into()))),
    ];
    let stream: BoxStream<'static, Bytes> = Box::pin(futures::stream::iter(chunks));
    let items: Vec<_> = super::decode_response(stream, 0, false).collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(Error::Transport(_))));
}
