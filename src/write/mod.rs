//! Asynchronous buffered write pipeline.
//!
//! The pipeline runs two cooperating workers. The *buffer worker* collects
//! line protocol records and emits a [`Batch`] when the batch size is
//! reached, the flush timer fires, or a flush is requested. The *write
//! worker* consumes batches, consults the bounded retry queue, applies the
//! exponential backoff gate, and sends batches through a [`BatchWriter`].
//! Failed retryable batches are re-queued and re-sent by one-shot retry
//! timers until they succeed, expire, or exhaust their retries.

mod queue;
mod service;

pub use service::{Batch, BatchWriter, WriteService};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::options::WriteOptions;
use crate::point::Point;
use queue::RetryQueue;

/// Callback notified of each retryable write failure with the batch
/// payload, the error, and the retry attempts performed so far (0 when the
/// first write failed). Return `false` to discard the batch instead of
/// retrying it.
pub type WriteFailedCallback = Arc<dyn Fn(&str, &Error, u32) -> bool + Send + Sync>;

struct InfoRequest {
    reply: oneshot::Sender<usize>,
}

struct Workers {
    buffer_stop_tx: mpsc::Sender<()>,
    write_stop_tx: mpsc::Sender<()>,
    buffer_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

/// Non-blocking write API.
///
/// Records are buffered and shipped in the background; call [`flush`] to
/// force pending records out and [`close`] before dropping the API so the
/// workers shut down cleanly.
///
/// [`flush`]: WriteApi::flush
/// [`close`]: WriteApi::close
pub struct WriteApi {
    options: WriteOptions,
    buffer_tx: mpsc::Sender<String>,
    flush_tx: mpsc::Sender<()>,
    buffer_info_tx: mpsc::Sender<InfoRequest>,
    write_info_tx: mpsc::Sender<InfoRequest>,
    err_rx: Option<mpsc::Receiver<Error>>,
    err_read: Arc<AtomicBool>,
    failed_cb: Arc<Mutex<Option<WriteFailedCallback>>>,
    workers: Option<Workers>,
}

impl WriteApi {
    /// Start the pipeline on top of the given batch writer.
    pub fn with_service<S: BatchWriter>(service: S, options: WriteOptions) -> Self {
        let service = Arc::new(service);
        let (buffer_tx, buffer_rx) = mpsc::channel(1);
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let (buffer_info_tx, buffer_info_rx) = mpsc::channel(1);
        let (write_info_tx, write_info_rx) = mpsc::channel(1);
        let (buffer_stop_tx, buffer_stop_rx) = mpsc::channel(1);
        let (write_stop_tx, write_stop_rx) = mpsc::channel(1);
        let (write_tx, write_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = mpsc::channel(1);

        let err_read = Arc::new(AtomicBool::new(false));
        let failed_cb: Arc<Mutex<Option<WriteFailedCallback>>> = Arc::new(Mutex::new(None));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let buffer = BufferWorker {
            batch_size: options.batch_size,
            flush_interval_ms: options.flush_interval_ms,
            max_retry_time_ms: options.max_retry_time_ms,
            buffer: Vec::with_capacity(options.batch_size + 1),
            write_tx: write_tx.clone(),
            in_flight: Arc::clone(&in_flight),
        };
        let buffer_handle = tokio::spawn(buffer.run(buffer_rx, flush_rx, buffer_stop_rx, buffer_info_rx));

        let worker = WriteWorker {
            service,
            options: options.clone(),
            queue: RetryQueue::new(options.retry_queue_capacity()),
            retry_delay: 0,
            retry_attempts: 0,
            write_tx,
            in_flight,
            failed_cb: Arc::clone(&failed_cb),
            retry_timer: None,
        };
        let write_handle = tokio::spawn(worker.run(
            write_rx,
            write_stop_rx,
            write_info_rx,
            err_tx,
            Arc::clone(&err_read),
        ));

        Self {
            options,
            buffer_tx,
            flush_tx,
            buffer_info_tx,
            write_info_tx,
            err_rx: Some(err_rx),
            err_read,
            failed_cb,
            workers: Some(Workers {
                buffer_stop_tx,
                write_stop_tx,
                buffer_handle,
                write_handle,
            }),
        }
    }

    /// Append one line protocol record to the write buffer.
    ///
    /// The record is terminated with a newline if it does not already carry
    /// one. Suspends while the buffer worker is busy (backpressure).
    pub async fn write_record(&self, line: impl Into<String>) -> Result<()> {
        let mut line = line.into();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.buffer_tx.send(line).await.map_err(|_| Error::Closed)
    }

    /// Encode a point (merging the configured default tags) and append it
    /// to the write buffer. Encoding failures surface here synchronously.
    pub async fn write_point(&self, point: &Point) -> Result<()> {
        let mut line = String::new();
        point.write_line_protocol(&mut line, self.options.precision, &self.options.default_tags)?;
        self.buffer_tx.send(line).await.map_err(|_| Error::Closed)
    }

    /// Force all pending records out and wait until both the record buffer
    /// and the in-flight batch channel are empty. Batches parked in the
    /// retry queue are not waited for.
    pub async fn flush(&self) -> Result<()> {
        self.flush_tx.send(()).await.map_err(|_| Error::Closed)?;
        self.wait_for_flushing().await
    }

    async fn wait_for_flushing(&self) -> Result<()> {
        loop {
            let (reply, rx) = oneshot::channel();
            self.buffer_info_tx
                .send(InfoRequest { reply })
                .await
                .map_err(|_| Error::Closed)?;
            if rx.await.map_err(|_| Error::Closed)? == 0 {
                break;
            }
            debug!("waiting for record buffer to drain");
            sleep(Duration::from_millis(1)).await;
        }
        loop {
            let (reply, rx) = oneshot::channel();
            self.write_info_tx
                .send(InfoRequest { reply })
                .await
                .map_err(|_| Error::Closed)?;
            if rx.await.map_err(|_| Error::Closed)? == 0 {
                break;
            }
            debug!("waiting for in-flight batches to drain");
            sleep(Duration::from_millis(1)).await;
        }
        Ok(())
    }

    /// Take the channel of asynchronous write errors.
    ///
    /// Call this before writing for errors to be collected. The channel is
    /// bounded to one slot: it must be drained, otherwise subsequent errors
    /// are dropped with a warning after a nonblocking send attempt. Returns
    /// `None` once the receiver has already been taken.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<Error>> {
        self.err_read.store(true, Ordering::Relaxed);
        self.err_rx.take()
    }

    /// Install a callback invoked for every retryable write failure.
    /// Returning `false` discards the failed batch instead of retrying it.
    pub fn set_write_failed_callback<F>(&self, cb: F)
    where
        F: Fn(&str, &Error, u32) -> bool + Send + Sync + 'static,
    {
        *self.failed_cb.lock() = Some(Arc::new(cb));
    }

    /// Flush outstanding records, stop both workers and release the
    /// channels. Idempotent; writes after close fail with [`Error::Closed`].
    pub async fn close(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };
        if let Err(e) = self.flush().await {
            debug!(error = %e, "flush during close failed");
        }
        let _ = workers.buffer_stop_tx.send(()).await;
        let _ = workers.buffer_handle.await;
        let _ = workers.write_stop_tx.send(()).await;
        let _ = workers.write_handle.await;
        // sever the worker channels so later writes fail fast
        let (closed_tx, _) = mpsc::channel(1);
        self.buffer_tx = closed_tx;
        let (closed_tx, _) = mpsc::channel(1);
        self.flush_tx = closed_tx;
    }
}

struct BufferWorker {
    batch_size: usize,
    flush_interval_ms: u64,
    max_retry_time_ms: u64,
    buffer: Vec<String>,
    write_tx: mpsc::Sender<Batch>,
    in_flight: Arc<AtomicUsize>,
}

impl BufferWorker {
    async fn run(
        mut self,
        mut line_rx: mpsc::Receiver<String>,
        mut flush_rx: mpsc::Receiver<()>,
        mut stop_rx: mpsc::Receiver<()>,
        mut info_rx: mpsc::Receiver<InfoRequest>,
    ) {
        info!("buffer worker started");
        let idle = Duration::from_millis(self.flush_interval_ms.max(1));
        let flush_timer = sleep(idle);
        tokio::pin!(flush_timer);
        loop {
            tokio::select! {
                line = line_rx.recv() => match line {
                    Some(line) => {
                        self.buffer.push(line);
                        if self.buffer.len() >= self.batch_size {
                            self.flush_buffer().await;
                            flush_timer.as_mut().reset(Instant::now() + idle);
                        }
                    }
                    None => break,
                },
                () = &mut flush_timer, if self.flush_interval_ms > 0 => {
                    self.flush_buffer().await;
                    flush_timer.as_mut().reset(Instant::now() + idle);
                }
                signal = flush_rx.recv() => match signal {
                    Some(()) => {
                        self.flush_buffer().await;
                        flush_timer.as_mut().reset(Instant::now() + idle);
                    }
                    None => break,
                },
                _ = stop_rx.recv() => break,
                req = info_rx.recv() => match req {
                    Some(req) => {
                        let _ = req.reply.send(self.buffer.len());
                    }
                    None => break,
                },
            }
        }
        self.flush_buffer().await;
        info!("buffer worker finished");
    }

    async fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        debug!(lines = self.buffer.len(), "sending batch");
        let payload = self.buffer.concat();
        self.buffer.clear();
        let batch = Batch::new(payload, self.max_retry_time_ms);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.write_tx.send(batch).await.is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!("write worker is gone, dropping batch");
        }
    }
}

struct WriteWorker<S: BatchWriter> {
    service: Arc<S>,
    options: WriteOptions,
    queue: RetryQueue,
    retry_delay: u64,
    retry_attempts: u32,
    write_tx: mpsc::Sender<Batch>,
    in_flight: Arc<AtomicUsize>,
    failed_cb: Arc<Mutex<Option<WriteFailedCallback>>>,
    retry_timer: Option<JoinHandle<()>>,
}

impl<S: BatchWriter> WriteWorker<S> {
    async fn run(
        mut self,
        mut write_rx: mpsc::Receiver<Batch>,
        mut stop_rx: mpsc::Receiver<()>,
        mut info_rx: mpsc::Receiver<InfoRequest>,
        err_tx: mpsc::Sender<Error>,
        err_read: Arc<AtomicBool>,
    ) {
        info!("write worker started");
        loop {
            tokio::select! {
                batch = write_rx.recv() => match batch {
                    Some(batch) => {
                        let result = self.send_batch(batch).await;
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        if let Err(e) = result {
                            if err_read.load(Ordering::Relaxed) && err_tx.try_send(e).is_err() {
                                warn!("cannot deliver async write error, channel is not read");
                            }
                        }
                    }
                    None => break,
                },
                _ = stop_rx.recv() => {
                    info!("write worker: received stop");
                    break;
                }
                req = info_rx.recv() => match req {
                    Some(req) => {
                        let _ = req.reply.send(self.in_flight.load(Ordering::SeqCst));
                    }
                    None => break,
                },
            }
        }
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        info!("write worker finished");
    }

    /// Handle one incoming batch: expire the queue front, honor the
    /// queued-before-new rule and the backoff gate, write, and update the
    /// retry state. Incoming batches with `attempts > 0` are retry
    /// deliveries from a one-shot timer.
    async fn send_batch(&mut self, mut batch: Batch) -> Result<()> {
        debug!(id = batch.id, attempts = batch.attempts, "write worker: received write request");
        let retrying = self.retry_attempts > 0;
        let now = Instant::now();

        // discard expired batches at the front of the retry queue
        loop {
            let front_id = match self.queue.first() {
                Some(front) if front.expires_at <= now => front.id,
                _ => break,
            };
            warn!("write worker: oldest batch in retry queue expired, discarding");
            if front_id == batch.id {
                batch.evicted = true;
            }
            self.queue.remove_if_first(front_id);
        }

        // a retry delivery whose batch has been dropped from the queue
        // (expired or evicted on overflow) must not be written
        let queued_delivery = self.queue.contains(batch.id);
        if batch.attempts > 0 && !queued_delivery {
            debug!(id = batch.id, "write worker: scheduled batch no longer queued");
            batch.evicted = true;
        }

        // while retrying, fresh batches queue up behind the backlog
        if retrying && batch.attempts == 0 && !queued_delivery && !batch.evicted {
            warn!("write worker: cannot write before emptying retry queue, storing batch to queue");
            if self.queue.push(batch) {
                warn!("write worker: retry buffer full, discarding oldest batch");
            }
            return Err(Error::RetryQueueBusy);
        }

        // backoff gate: wait out the retry delay since the last attempt
        if self.retry_delay > 0 {
            if let Some(last) = self.service.last_write_attempt() {
                let ready_at = last + Duration::from_millis(self.retry_delay);
                if now < ready_at {
                    let wait_ms = (ready_at - now).as_millis() as u64;
                    warn!(wait_ms, "write worker: cannot write yet");
                    if batch.attempts == 0 && !queued_delivery && !batch.evicted {
                        if self.queue.push(batch) {
                            warn!("write worker: retry buffer full, discarding oldest batch");
                        }
                    } else if queued_delivery && !batch.evicted {
                        // keep the queued batch alive; its timer already fired
                        self.schedule_retry(batch);
                    }
                    return Err(Error::BackoffActive(wait_ms));
                }
            }
        }

        // pick the batch to write: the arriving one, or the queue front
        // when the arriving batch was invalidated mid-retry
        let current = if batch.evicted {
            match self.queue.first() {
                Some(front) if retrying => front.clone(),
                _ => return Ok(()),
            }
        } else {
            batch
        };

        match self.service.write_batch(&current).await {
            Ok(()) => {
                self.retry_delay = 0;
                self.retry_attempts = 0;
                self.queue.remove_if_first(current.id);
                if !self.queue.is_empty() {
                    self.retry_delay = 1;
                    let next = self.queue.first().cloned();
                    if let Some(next) = next {
                        self.schedule_retry(next);
                    }
                }
                Ok(())
            }
            Err(err) if self.options.max_retries != 0 && err.is_retryable() => {
                error!(error = %err, "write error, batch kept for retrying");
                self.retry_delay = match err.retry_after() {
                    Some(secs) => secs * 1000,
                    None => self.compute_retry_delay(self.retry_attempts),
                };

                let cb = self.failed_cb.lock().clone();
                if let Some(cb) = cb {
                    if !cb(&current.lines, &err, current.attempts) {
                        warn!("callback rejected batch, discarding");
                        self.queue.remove_if_first(current.id);
                        return Err(err);
                    }
                }

                let next_attempts = current.attempts + 1;
                if current.attempts == self.options.max_retries {
                    warn!("reached maximum number of retries, discarding batch");
                    self.queue.remove_if_first(current.id);
                } else {
                    if self.queue.first().map(|f| f.id) == Some(current.id) {
                        if let Some(front) = self.queue.first_mut() {
                            front.attempts = next_attempts;
                        }
                    } else {
                        let mut queued = current.clone();
                        queued.attempts = next_attempts;
                        if self.queue.push(queued) {
                            warn!("retry buffer full, discarding oldest batch");
                        }
                    }
                    let mut again = current;
                    again.attempts = next_attempts;
                    self.schedule_retry(again);
                }
                self.retry_attempts += 1;
                debug!(delay_ms = self.retry_delay, "write worker: next wait for write");
                Err(Error::WriteFailed {
                    attempts: next_attempts,
                    source: Box::new(err),
                })
            }
            Err(err) => {
                error!(error = %err, "write error");
                Err(Error::WriteFailed {
                    attempts: current.attempts,
                    source: Box::new(err),
                })
            }
        }
    }

    /// Arm a one-shot timer that re-sends `batch` on the write channel
    /// after the current retry delay.
    fn schedule_retry(&mut self, batch: Batch) {
        debug!(id = batch.id, delay_ms = self.retry_delay, "write worker: scheduling retry");
        let delay = Duration::from_millis(self.retry_delay);
        let write_tx = self.write_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        self.retry_timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            debug!("write worker: writing scheduled batch");
            in_flight.fetch_add(1, Ordering::SeqCst);
            if write_tx.send(batch).await.is_err() {
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }));
    }

    /// Retry delay for the given number of consecutive retryable failures:
    /// uniform in `[retry_interval * base^n, retry_interval * base^(n+1))`,
    /// clamped to `max_retry_interval`.
    fn compute_retry_delay(&self, attempts: u32) -> u64 {
        let base = u64::from(self.options.exponential_base);
        let min_delay = self
            .options
            .retry_interval_ms
            .saturating_mul(base.saturating_pow(attempts));
        let max_delay = self
            .options
            .retry_interval_ms
            .saturating_mul(base.saturating_pow(attempts + 1));
        let delay = if max_delay > min_delay {
            rand::thread_rng().gen_range(min_delay..max_delay)
        } else {
            min_delay
        };
        delay.min(self.options.max_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use async_trait::async_trait;

    struct MockWriter {
        lines: Mutex<Vec<String>>,
        reply_error: Mutex<Option<HttpError>>,
        request_times: Mutex<Vec<Instant>>,
        last: Mutex<Option<Instant>>,
    }

    impl MockWriter {
        fn new() -> Self {
            Self {
                lines: Mutex::new(Vec::new()),
                reply_error: Mutex::new(None),
                request_times: Mutex::new(Vec::new()),
                last: Mutex::new(None),
            }
        }

        fn set_reply_error(&self, error: Option<HttpError>) {
            *self.reply_error.lock() = error;
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().clone()
        }

        fn requests(&self) -> usize {
            self.request_times.lock().len()
        }
    }

    #[async_trait]
    impl BatchWriter for MockWriter {
        async fn write_batch(&self, batch: &Batch) -> Result<()> {
            *self.last.lock() = Some(Instant::now());
            self.request_times.lock().push(Instant::now());
            if let Some(e) = self.reply_error.lock().clone() {
                return Err(Error::Http(e));
            }
            let mut lines = self.lines.lock();
            for line in batch.lines.lines() {
                lines.push(line.to_string());
            }
            Ok(())
        }

        fn last_write_attempt(&self) -> Option<Instant> {
            *self.last.lock()
        }
    }

    fn worker(service: Arc<MockWriter>, options: WriteOptions) -> (WriteWorker<MockWriter>, mpsc::Receiver<Batch>) {
        let (write_tx, write_rx) = mpsc::channel(1);
        let worker = WriteWorker {
            service,
            queue: RetryQueue::new(options.retry_queue_capacity()),
            options,
            retry_delay: 0,
            retry_attempts: 0,
            write_tx,
            in_flight: Arc::new(AtomicUsize::new(0)),
            failed_cb: Arc::new(Mutex::new(None)),
            retry_timer: None,
        };
        (worker, write_rx)
    }

    fn retry_error(retry_after: Option<u64>) -> HttpError {
        HttpError {
            status: 429,
            code: "too many requests".to_string(),
            message: "exceeded rate limit".to_string(),
            retry_after,
        }
    }

    fn assert_between(value: u64, min: u64, max: u64) {
        assert!(
            value >= min && value <= max,
            "{} is outside <{};{}>",
            value,
            min,
            max
        );
    }

    #[tokio::test]
    async fn test_compute_retry_delay_defaults() {
        let (w, _rx) = worker(Arc::new(MockWriter::new()), WriteOptions::default());
        assert_between(w.compute_retry_delay(0), 5_000, 10_000);
        assert_between(w.compute_retry_delay(1), 10_000, 20_000);
        assert_between(w.compute_retry_delay(2), 20_000, 40_000);
        assert_between(w.compute_retry_delay(3), 40_000, 80_000);
        assert_between(w.compute_retry_delay(4), 80_000, 125_000);
        assert_eq!(w.compute_retry_delay(5), 125_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_progression_until_discard() {
        // permanent 503: expect max_retries + 1 attempts, growing delays,
        // batch finally discarded
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(HttpError {
            status: 503,
            code: "unavailable".to_string(),
            message: "service temporarily unavailable".to_string(),
            retry_after: None,
        }));
        let opts = WriteOptions::default().retry_interval(10).max_retries(5);
        let (mut w, mut write_rx) = worker(svc.clone(), opts.clone());

        let batch = Batch::new("1\n".to_string(), opts.max_retry_time_ms);
        assert!(w.send_batch(batch).await.is_err());
        assert_between(w.retry_delay, 10, 20);
        assert_eq!(w.queue.len(), 1);
        assert_eq!(w.retry_attempts, 1);

        let mut last_delay = w.retry_delay;
        for round in 2..=5u32 {
            // the armed timer re-sends the batch after the delay
            let again = write_rx.recv().await.expect("scheduled retry");
            assert_eq!(again.attempts, round - 1);
            assert!(w.send_batch(again).await.is_err());
            assert!(w.retry_delay >= last_delay);
            last_delay = w.retry_delay;
            assert_eq!(w.queue.len(), 1);
            assert_eq!(w.retry_attempts, round);
        }

        // sixth attempt reaches max_retries and the batch is discarded
        let again = write_rx.recv().await.expect("scheduled retry");
        assert_eq!(again.attempts, 5);
        assert!(w.send_batch(again).await.is_err());
        assert!(w.queue.is_empty());
        assert_eq!(svc.requests(), 6);

        // nothing left to retry
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(write_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_paces_attempts() {
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(retry_error(Some(1))));
        let opts = WriteOptions::default();
        let (mut w, mut write_rx) = worker(svc.clone(), opts.clone());

        let batch = Batch::new("1\n".to_string(), opts.max_retry_time_ms);
        assert!(w.send_batch(batch).await.is_err());
        assert_eq!(w.retry_delay, 1000);

        let again = write_rx.recv().await.expect("scheduled retry");
        assert!(w.send_batch(again).await.is_err());
        assert_eq!(w.retry_delay, 1000);

        svc.set_reply_error(None);
        let again = write_rx.recv().await.expect("scheduled retry");
        assert!(w.send_batch(again).await.is_ok());

        assert_eq!(w.retry_delay, 0);
        assert_eq!(w.retry_attempts, 0);
        assert!(w.queue.is_empty());
        assert_eq!(svc.requests(), 3);
        let times = svc.request_times.lock().clone();
        assert!(times[1] - times[0] >= Duration::from_millis(1000));
        assert!(times[2] - times[1] >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_batches_queue_behind_retries() {
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(retry_error(None)));
        // queue capacity 3
        let opts = WriteOptions::default()
            .retry_interval(1)
            .batch_size(5000)
            .retry_buffer_limit(15_000);
        let (mut w, mut write_rx) = worker(svc.clone(), opts.clone());

        assert!(w
            .send_batch(Batch::new("1\n".to_string(), opts.max_retry_time_ms))
            .await
            .is_err());
        assert_eq!(w.queue.len(), 1);

        // fresh batches while retrying are parked, not written
        for payload in ["2\n", "3\n"] {
            let err = w
                .send_batch(Batch::new(payload.to_string(), opts.max_retry_time_ms))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::RetryQueueBusy));
        }
        assert_eq!(w.queue.len(), 3);
        assert_eq!(svc.requests(), 1);

        // one more overflows the buffer, dropping the oldest batch
        assert!(w
            .send_batch(Batch::new("4\n".to_string(), opts.max_retry_time_ms))
            .await
            .is_err());
        assert_eq!(w.queue.len(), 3);
        assert_eq!(w.queue.first().unwrap().lines.as_ref(), "2\n");

        // server recovers; the armed timer drains the queue front, each
        // success chains the next element
        svc.set_reply_error(None);
        for _ in 0..3 {
            let again = write_rx.recv().await.expect("scheduled batch");
            let _ = w.send_batch(again).await;
        }
        assert!(w.queue.is_empty());
        assert_eq!(svc.lines(), vec!["2", "3", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_gate_defers_new_batch() {
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(retry_error(Some(10))));
        let opts = WriteOptions::default();
        let (mut w, _write_rx) = worker(svc.clone(), opts.clone());

        assert!(w
            .send_batch(Batch::new("1\n".to_string(), opts.max_retry_time_ms))
            .await
            .is_err());
        assert_eq!(w.retry_delay, 10_000);

        // the retry queue is drained of the blocked batch so the gate is
        // what rejects the next one
        w.queue.remove_if_first(w.queue.first().unwrap().id);
        w.retry_attempts = 0;

        let err = w
            .send_batch(Batch::new("2\n".to_string(), opts.max_retry_time_ms))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackoffActive(_)));
        assert_eq!(w.queue.len(), 1);
        assert_eq!(svc.requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_queue_front_discarded_before_write() {
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(retry_error(None)));
        let opts = WriteOptions::default().retry_interval(1).max_retry_time(5);
        let (mut w, mut write_rx) = worker(svc.clone(), opts.clone());

        assert!(w
            .send_batch(Batch::new("1\n".to_string(), opts.max_retry_time_ms))
            .await
            .is_err());
        assert_eq!(w.queue.len(), 1);
        svc.set_reply_error(None);

        // let the batch expire before its retry lands
        tokio::time::sleep(Duration::from_millis(10)).await;
        let again = write_rx.recv().await.expect("scheduled retry");
        assert!(w.send_batch(again).await.is_ok());

        // the expired batch was dropped without another request
        assert!(w.queue.is_empty());
        assert_eq!(svc.requests(), 1);
        assert!(svc.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_rejection_discards_batch() {
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(retry_error(None)));
        let opts = WriteOptions::default().retry_interval(1);
        let (mut w, mut write_rx) = worker(svc.clone(), opts.clone());
        *w.failed_cb.lock() = Some(Arc::new(|_lines: &str, _err: &Error, attempts: u32| {
            attempts < 1
        }));

        assert!(w
            .send_batch(Batch::new("1\n".to_string(), opts.max_retry_time_ms))
            .await
            .is_err());
        assert_eq!(w.queue.len(), 1);

        // second failure reports attempts = 1, the callback vetoes the batch
        let again = write_rx.recv().await.expect("scheduled retry");
        assert!(w.send_batch(again).await.is_err());
        assert!(w.queue.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(write_rx.try_recv().is_err());
        assert_eq!(svc.requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(HttpError {
            status: 400,
            code: "invalid".to_string(),
            message: "line protocol poorly formed".to_string(),
            retry_after: None,
        }));
        let opts = WriteOptions::default();
        let (mut w, mut write_rx) = worker(svc.clone(), opts.clone());

        let err = w
            .send_batch(Batch::new("1\n".to_string(), opts.max_retry_time_ms))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WriteFailed { attempts: 0, .. }));
        assert!(w.queue.is_empty());
        assert_eq!(w.retry_attempts, 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(write_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_retries_zero_disables_retrying() {
        let svc = Arc::new(MockWriter::new());
        svc.set_reply_error(Some(retry_error(None)));
        let opts = WriteOptions::default().max_retries(0);
        let (mut w, _write_rx) = worker(svc.clone(), opts.clone());

        let err = w
            .send_batch(Batch::new("1\n".to_string(), opts.max_retry_time_ms))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WriteFailed { .. }));
        assert!(w.queue.is_empty());
        assert_eq!(w.retry_attempts, 0);
    }
}
