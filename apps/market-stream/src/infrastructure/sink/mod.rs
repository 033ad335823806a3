//! Tick Sink
//!
//! Durable destination for tick records. The CSV sink owns its file handle
//! for the process lifetime: created with a header row when the file is new,
//! appended to otherwise. A writer task drains the bounded tick queue in
//! receipt order, so sink order always matches wire order.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::tick::{SINK_HEADER, TickRecord};

/// Errors from the tick sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Filesystem failure.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failure.
    #[error("sink CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Append-only destination for tick records.
///
/// Implementations are exclusively owned by the writer task; no other
/// writer may interleave appends.
pub trait TickSink: Send {
    /// Append one record durably.
    fn append(&mut self, record: &TickRecord) -> Result<(), SinkError>;
}

// =============================================================================
// CSV Sink
// =============================================================================

/// CSV file sink with the layout
/// `Timestamp,Symbol,LastPrice,Bid,Ask,Volume`.
pub struct CsvTickSink {
    writer: csv::Writer<File>,
}

impl CsvTickSink {
    /// Open the sink, creating the file with a header row if it is missing
    /// or empty, appending otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let needs_header = match std::fs::metadata(path) {
            Ok(metadata) => metadata.len() == 0,
            Err(_) => true,
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(SINK_HEADER)?;
            writer.flush()?;
        }

        Ok(Self { writer })
    }
}

impl TickSink for CsvTickSink {
    fn append(&mut self, record: &TickRecord) -> Result<(), SinkError> {
        self.writer.write_record(record.to_row())?;
        // Low write volume; flushing per record keeps rows durable across
        // an abrupt process exit.
        self.writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// Writer Task
// =============================================================================

/// Shared counters for the writer task.
#[derive(Debug, Default)]
pub struct WriterStats {
    written: AtomicU64,
    failed: AtomicU64,
}

impl WriterStats {
    /// Records appended successfully.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Records whose append failed (logged and skipped, never fatal).
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Drains the bounded tick queue into the sink, in order.
pub struct TickWriter<S: TickSink> {
    sink: S,
    rx: mpsc::Receiver<TickRecord>,
    stats: Arc<WriterStats>,
    cancel: CancellationToken,
}

impl<S: TickSink> TickWriter<S> {
    /// Create a writer over a sink and the receiving end of the tick queue.
    pub fn new(
        sink: S,
        rx: mpsc::Receiver<TickRecord>,
        cancel: CancellationToken,
    ) -> (Self, Arc<WriterStats>) {
        let stats = Arc::new(WriterStats::default());
        (
            Self {
                sink,
                rx,
                stats: Arc::clone(&stats),
                cancel,
            },
            stats,
        )
    }

    /// Run until the queue closes or a stop is requested. Queued records are
    /// drained before exit so a stop never discards already-received ticks.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    while let Ok(record) = self.rx.try_recv() {
                        self.write(&record);
                    }
                    tracing::debug!(
                        written = self.stats.written(),
                        failed = self.stats.failed(),
                        "tick writer stopped"
                    );
                    return;
                }
                record = self.rx.recv() => match record {
                    Some(record) => self.write(&record),
                    None => {
                        tracing::debug!("tick queue closed, writer exiting");
                        return;
                    }
                }
            }
        }
    }

    /// Append one record; a failed write is logged and counted, never fatal
    /// to the stream.
    fn write(&mut self, record: &TickRecord) {
        match self.sink.append(record) {
            Ok(()) => {
                self.stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let failed = self.stats.failed.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::error!(
                    error = %e,
                    symbol = %record.symbol,
                    failed_total = failed,
                    "failed to append tick"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn sample_tick(symbol: &str) -> TickRecord {
        TickRecord {
            captured_at: Utc::now(),
            symbol: symbol.to_owned(),
            last_price: Some(Decimal::new(439_025, 2)),
            bid: None,
            ask: None,
            volume: Some(10),
        }
    }

    /// In-memory sink for writer tests.
    struct MemorySink {
        symbols: Arc<parking_lot::Mutex<Vec<String>>>,
        fail: bool,
    }

    impl MemorySink {
        fn new(fail: bool) -> (Self, Arc<parking_lot::Mutex<Vec<String>>>) {
            let symbols = Arc::new(parking_lot::Mutex::new(Vec::new()));
            (
                Self {
                    symbols: Arc::clone(&symbols),
                    fail,
                },
                symbols,
            )
        }
    }

    impl TickSink for MemorySink {
        fn append(&mut self, record: &TickRecord) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Io(std::io::Error::other("disk full")));
            }
            self.symbols.lock().push(record.symbol.clone());
            Ok(())
        }
    }

    #[test]
    fn csv_sink_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.csv");

        {
            let mut sink = CsvTickSink::open(&path).unwrap();
            sink.append(&sample_tick("F.US.ES")).unwrap();
        }
        // Reopen and append: no second header.
        {
            let mut sink = CsvTickSink::open(&path).unwrap();
            sink.append(&sample_tick("F.US.NQ")).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,Symbol,LastPrice,Bid,Ask,Volume");
        assert!(lines[1].contains("F.US.ES"));
        assert!(lines[2].contains("F.US.NQ"));
    }

    #[test]
    fn csv_sink_leaves_missing_fields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.csv");

        let mut sink = CsvTickSink::open(&path).unwrap();
        sink.append(&sample_tick("F.US.NQ")).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        let cells: Vec<&str> = row.split(',').collect();
        assert_eq!(cells[1], "F.US.NQ");
        assert_eq!(cells[3], "");
        assert_eq!(cells[4], "");
        assert_eq!(cells[5], "10");
    }

    #[tokio::test]
    async fn writer_preserves_queue_order() {
        let (tx, rx) = mpsc::channel(8);
        let (sink, symbols) = MemorySink::new(false);
        let cancel = CancellationToken::new();
        let (writer, stats) = TickWriter::new(sink, rx, cancel);

        tx.send(sample_tick("F.US.ES")).await.unwrap();
        tx.send(sample_tick("F.US.NQ")).await.unwrap();
        drop(tx);

        writer.run().await;
        assert_eq!(stats.written(), 2);
        assert_eq!(*symbols.lock(), ["F.US.ES", "F.US.NQ"]);
    }

    #[tokio::test]
    async fn writer_drains_queue_on_stop() {
        let (tx, rx) = mpsc::channel(8);
        let (sink, symbols) = MemorySink::new(false);
        let cancel = CancellationToken::new();
        let (writer, stats) = TickWriter::new(sink, rx, cancel.clone());

        tx.send(sample_tick("F.US.ES")).await.unwrap();
        tx.send(sample_tick("F.US.GC")).await.unwrap();
        cancel.cancel();

        writer.run().await;
        assert_eq!(stats.written(), 2);
        assert_eq!(symbols.lock().len(), 2);
    }

    #[tokio::test]
    async fn writer_counts_failures_and_continues() {
        let (tx, rx) = mpsc::channel(8);
        let (sink, _symbols) = MemorySink::new(true);
        let cancel = CancellationToken::new();
        let (writer, stats) = TickWriter::new(sink, rx, cancel);

        tx.send(sample_tick("F.US.ES")).await.unwrap();
        tx.send(sample_tick("F.US.NQ")).await.unwrap();
        drop(tx);

        writer.run().await;
        assert_eq!(stats.written(), 0);
        assert_eq!(stats.failed(), 2);
    }
}
