//! Arrow IPC streaming execution.
//!
//! [`StreamingExecutor::stream_execute`] runs a filtered statement on a
//! blocking worker and hands back a [`FrameStream`] of Arrow IPC stream
//! frames:
//!
//! 1. the schema message,
//! 2. one frame per record batch,
//! 3. the end-of-stream marker.
//!
//! Concatenated, the frames form a valid Arrow IPC stream.
//!
//! # Back-pressure and cancellation
//!
//! Frames cross a channel of capacity one, so the worker never runs more than
//! one frame ahead of the consumer. The worker holds the connection guard for
//! the whole statement. Dropping the [`FrameStream`] before the end-of-stream
//! frame cancels the worker at its next frame boundary, which releases the
//! cursor and the connection, and logs the abort at `warn` level in the span
//! the stream was created in.

use crate::error::{EngineError, Result};
use crate::filter::{filter, FilterVerdict};
use crate::session::EngineSession;
use arrow::ipc::writer::StreamWriter;
use bytes::Bytes;
use duckdb::Connection;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Span};

/// Media type of an Arrow IPC stream.
pub const ARROW_STREAM_CONTENT_TYPE: &str = "application/vnd.apache.arrow.stream";

/// Frames buffered between the worker and the consumer.
const FRAME_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Default)]
struct ProgressInner {
    produced: AtomicU64,
    delivered: AtomicU64,
    finished: AtomicBool,
    aborted: AtomicBool,
}

/// Shared counters describing one stream's progress.
#[derive(Debug, Clone, Default)]
pub struct StreamProgress {
    inner: Arc<ProgressInner>,
}

impl StreamProgress {
    /// Frames handed to the channel by the worker.
    pub fn frames_produced(&self) -> u64 {
        self.inner.produced.load(Ordering::SeqCst)
    }

    /// Frames received by the consumer.
    pub fn frames_delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::SeqCst)
    }

    /// Whether the worker produced the end-of-stream frame.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Whether the consumer went away before the end of the stream.
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }
}

/// Ordered Arrow IPC frames of one statement's result.
///
/// Finite and not restartable.
pub struct FrameStream {
    rx: mpsc::Receiver<Result<Bytes>>,
    cancel: CancellationToken,
    progress: StreamProgress,
    span: Span,
    completed: bool,
}

impl FrameStream {
    /// Token that stops the worker when cancelled.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> StreamProgress {
        self.progress.clone()
    }
}

impl Stream for FrameStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.completed {
            return Poll::Ready(None);
        }
        if this.cancel.is_cancelled() {
            this.rx.close();
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                this.progress.inner.delivered.fetch_add(1, Ordering::SeqCst);
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.completed = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.completed = true;
                if this.progress.is_finished() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(EngineError::Stream(
                        "worker stopped before the end of the stream".into(),
                    ))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.cancel.cancel();
        self.progress.inner.aborted.store(true, Ordering::SeqCst);
        let delivered = self.progress.frames_delivered();
        self.span.in_scope(|| {
            warn!(frames_delivered = delivered, "Streaming query aborted by client");
        });
    }
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("progress", &self.progress)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("completed", &self.completed)
            .finish()
    }
}

/// Executes statements and streams their results as Arrow IPC frames.
#[derive(Debug, Clone)]
pub struct StreamingExecutor {
    session: Arc<EngineSession>,
}

impl StreamingExecutor {
    pub fn new(session: Arc<EngineSession>) -> Self {
        Self { session }
    }

    /// Initialize the session if needed, filter `sql` and start streaming it.
    ///
    /// Failures to prepare or execute the statement are returned here,
    /// before any frame exists. Later failures arrive as an error item that
    /// ends the stream.
    pub async fn stream_execute(&self, sql: &str) -> Result<FrameStream> {
        self.session.ensure_initialized().await?;

        let verdict = filter(sql, true);
        if let FilterVerdict::Rejected { category, .. } = &verdict {
            info!(category = %category, "Statement rejected by filter");
        }
        let statement = verdict.statement().to_string();

        let guard = self.session.connection().await;
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (started_tx, started_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let progress = StreamProgress::default();
        let span = Span::current();

        let worker = FrameWorker {
            tx,
            cancel: cancel.clone(),
            progress: progress.clone(),
        };
        let worker_span = span.clone();
        tokio::task::spawn_blocking(move || {
            worker_span.in_scope(|| worker.run(&guard, &statement, started_tx))
        });

        match started_rx.await {
            Ok(Ok(())) => Ok(FrameStream {
                rx,
                cancel,
                progress,
                span,
                completed: false,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::Internal(
                "streaming worker exited before starting".into(),
            )),
        }
    }
}

/// The blocking half of a stream.
struct FrameWorker {
    tx: mpsc::Sender<Result<Bytes>>,
    cancel: CancellationToken,
    progress: StreamProgress,
}

impl FrameWorker {
    fn run(self, conn: &Connection, sql: &str, started: oneshot::Sender<Result<()>>) {
        let mut stmt = match conn.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => {
                let _ = started.send(Err(e.into()));
                return;
            }
        };
        let batches = match stmt.query_arrow([]) {
            Ok(batches) => batches,
            Err(e) => {
                let _ = started.send(Err(e.into()));
                return;
            }
        };
        let schema = batches.get_schema();
        let mut writer = match StreamWriter::try_new(Vec::new(), &schema) {
            Ok(writer) => writer,
            Err(e) => {
                let _ = started.send(Err(e.into()));
                return;
            }
        };
        if started.send(Ok(())).is_err() {
            return;
        }

        if !self.emit(&mut writer) {
            return;
        }

        for batch in batches {
            if let Err(e) = writer.write(&batch) {
                self.fail(e.into());
                return;
            }
            if !self.emit(&mut writer) {
                return;
            }
        }

        if let Err(e) = writer.finish() {
            self.fail(e.into());
            return;
        }
        // Mark before the send so the consumer sees it once the channel closes.
        self.progress.inner.finished.store(true, Ordering::SeqCst);
        if self.emit(&mut writer) {
            debug!(
                frames = self.progress.frames_produced(),
                "Streaming query finished"
            );
        }
    }

    /// Send whatever the writer has buffered as one frame. Returns `false`
    /// once the consumer is gone.
    fn emit(&self, writer: &mut StreamWriter<Vec<u8>>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let frame = Bytes::from(std::mem::take(writer.get_mut()));
        if self.tx.blocking_send(Ok(frame)).is_err() {
            return false;
        }
        self.progress.inner.produced.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn fail(&self, e: EngineError) {
        error!(error = %e, "Streaming query failed");
        let _ = self.tx.blocking_send(Err(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::executor::QueryExecutor;
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::SchemaRef;
    use arrow::record_batch::RecordBatch;
    use arrow::ipc::reader::StreamReader;
    use futures_util::StreamExt;
    use std::io::Cursor;
    use std::time::Duration;

    const END_OF_STREAM: [u8; 8] = [0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0];

    fn session() -> (Arc<EngineSession>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let session = EngineSession::open(SessionConfig::offline(dir.path())).unwrap();
        (Arc::new(session), dir)
    }

    async fn collect_frames(stream: FrameStream) -> Vec<Bytes> {
        stream.map(|frame| frame.unwrap()).collect().await
    }

    fn decode(frames: &[Bytes]) -> (SchemaRef, Vec<RecordBatch>) {
        let body: Vec<u8> = frames.iter().flat_map(|f| f.iter().copied()).collect();
        let reader = StreamReader::try_new(Cursor::new(body), None).unwrap();
        let schema = reader.schema();
        let batches = reader.map(|b| b.unwrap()).collect();
        (schema, batches)
    }

    #[tokio::test]
    async fn test_frames_form_valid_ipc_stream() {
        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session);
        let stream = executor
            .stream_execute("SELECT range AS n FROM range(5000)")
            .await
            .unwrap();
        let progress = stream.progress();
        let frames = collect_frames(stream).await;

        assert!(frames.len() >= 3);
        assert_eq!(frames.last().unwrap().as_ref(), &END_OF_STREAM);
        assert!(progress.is_finished());
        assert!(!progress.is_aborted());
        assert_eq!(progress.frames_delivered(), frames.len() as u64);

        let (schema, batches) = decode(&frames);
        assert_eq!(schema.field(0).name(), "n");
        let mut values = Vec::new();
        for batch in batches {
            let column = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap();
            values.extend(column.values().iter().copied());
        }
        assert_eq!(values, (0..5000).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_first_frame_is_schema_only() {
        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session);
        let mut stream = executor
            .stream_execute("SELECT 1::BIGINT AS a, 'x' AS b")
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let reader = StreamReader::try_new(Cursor::new(first.to_vec()), None).unwrap();
        let schema = reader.schema();
        let names: Vec<&String> = schema.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let rest: Vec<Bytes> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(rest.last().unwrap().as_ref(), &END_OF_STREAM);
    }

    #[tokio::test]
    async fn test_empty_result_still_has_schema() {
        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session);
        let stream = executor
            .stream_execute("SELECT range AS n FROM range(0)")
            .await
            .unwrap();
        let frames = collect_frames(stream).await;
        assert_eq!(frames.len(), 2);

        let (schema, batches) = decode(&frames);
        assert_eq!(schema.fields().len(), 1);
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_statement_streams_replacement_row() {
        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session);
        let stream = executor.stream_execute("PRAGMA version").await.unwrap();
        let frames = collect_frames(stream).await;

        let (_, batches) = decode(&frames);
        assert_eq!(batches.len(), 1);
        let column = batches[0]
            .column_by_name("error")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(column.len(), 1);
        assert_eq!(column.value(0), "Using PRAGMA is disabled");
    }

    #[tokio::test]
    async fn test_error_reported_before_first_frame() {
        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session.clone());
        let err = executor
            .stream_execute("SELECT * FROM no_such_table")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)), "{err:?}");

        // The connection was released.
        let rows = QueryExecutor::new(session).execute("SELECT 1 AS a").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_stream_releases_connection() {
        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session.clone());
        let mut stream = executor
            .stream_execute("SELECT range AS n FROM range(1000000)")
            .await
            .unwrap();
        let progress = stream.progress();
        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        let rows = tokio::time::timeout(
            Duration::from_secs(30),
            QueryExecutor::new(session).execute("SELECT 42 AS answer"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(rows.rows[0]["answer"], serde_json::json!(42));

        assert!(progress.is_aborted());
        assert!(!progress.is_finished());
        assert_eq!(progress.frames_delivered(), 2);
        assert!(progress.frames_produced() <= progress.frames_delivered() + 2);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dropping_stream_logs_abort() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session);
        let mut stream = executor
            .stream_execute("SELECT range AS n FROM range(1000000)")
            .await
            .unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        let output = logs.contents();
        let line = output
            .lines()
            .find(|l| l.contains("Streaming query aborted by client"))
            .unwrap_or_else(|| panic!("no abort entry in:\n{output}"));
        assert!(line.contains("WARN"), "{line}");
        assert!(line.contains("frames_delivered=1"), "{line}");
    }

    #[tokio::test]
    async fn test_completed_stream_logs_no_abort() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session);
        let stream = executor.stream_execute("SELECT 1 AS a").await.unwrap();
        collect_frames(stream).await;

        assert!(!logs.contents().contains("aborted"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_handle_ends_stream() {
        let (session, _dir) = session();
        let executor = StreamingExecutor::new(session.clone());
        let mut stream = executor
            .stream_execute("SELECT range AS n FROM range(1000000)")
            .await
            .unwrap();
        stream.next().await.unwrap().unwrap();

        stream.cancel_handle().cancel();
        assert!(stream.next().await.is_none());
        let progress = stream.progress();
        drop(stream);
        assert!(progress.is_aborted());

        let rows = tokio::time::timeout(
            Duration::from_secs(30),
            QueryExecutor::new(session).execute("SELECT 1 AS a"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queries_wait_for_active_stream() {
        let (session, _dir) = session();
        let streaming = StreamingExecutor::new(session.clone());
        let stream = streaming
            .stream_execute("SELECT range AS n FROM range(20000)")
            .await
            .unwrap();

        let executor = QueryExecutor::new(session);
        let pending = tokio::spawn(async move { executor.execute("SELECT 7 AS x").await });

        let frames = collect_frames(stream).await;
        let total: usize = decode(&frames).1.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 20000);

        let rows = pending.await.unwrap().unwrap();
        assert_eq!(rows.rows[0]["x"], serde_json::json!(7));
    }
}
