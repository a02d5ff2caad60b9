//! In-process engine: a reader thread hands fixed-size blocks over a bounded
//! channel to a gzip encoder writing the temporary artifact.
//!
//! Read errors never abort the copy. The unreadable block is replaced with
//! zeros of the same length and reading resumes at the next block, which is
//! what `dd conv=noerror,sync` does.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    os::unix::fs::FileExt,
    sync::mpsc::{self, Receiver, SyncSender},
    thread,
};

use flate2::{write::GzEncoder, Compression};
use tracing::{debug, warn};

use super::{Stage, TransferOptions, TransferStats};
use crate::{logging, precheck::SourceDevice, signal::CancelFlag, Error, Result, EXIT_FAILURE};

/// Positional reads, so a failed block can be skipped without seeking.
pub trait ReadAt {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl ReadAt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }
}

#[derive(Debug)]
pub struct BlockReader<S> {
    source: S,
    len: u64,
    block_size: usize,
    offset: u64,
    blocks: u64,
    unreadable: u64,
}

impl<S: ReadAt> BlockReader<S> {
    pub fn new(source: S, len: u64, block_size: usize) -> Self {
        Self {
            source,
            len,
            block_size,
            offset: 0,
            blocks: 0,
            unreadable: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn unreadable_blocks(&self) -> u64 {
        self.unreadable
    }

    /// Next block, or `None` at the end of the source. The last block may be
    /// shorter than the block size.
    pub fn next_block(&mut self) -> Option<Vec<u8>> {
        if self.offset >= self.len {
            return None;
        }
        let want = usize::try_from(self.len - self.offset)
            .map_or(self.block_size, |rest| rest.min(self.block_size));
        let mut buf = vec![0u8; want];
        let mut filled = 0;

        while filled < want {
            match self
                .source
                .read_at(&mut buf[filled..], self.offset + filled as u64)
            {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(
                        offset = self.offset,
                        len = want,
                        error = %err,
                        "unreadable block; writing zeros"
                    );
                    buf.fill(0);
                    filled = want;
                    self.unreadable += 1;
                }
            }
        }

        // Source ended before its measured size.
        if filled < want {
            debug!(offset = self.offset + filled as u64, "source shorter than reported");
            self.len = self.offset + filled as u64;
            if filled == 0 {
                return None;
            }
            buf.truncate(filled);
        }

        self.offset += buf.len() as u64;
        self.blocks += 1;
        Some(buf)
    }
}

fn stage_error(stage: Stage, context: impl Into<String>) -> Error {
    Error::StageFailed {
        stage,
        code: EXIT_FAILURE,
        context: context.into(),
    }
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn read_stage<S: ReadAt>(
    mut reader: BlockReader<S>,
    tx: SyncSender<Vec<u8>>,
    cancel: &CancelFlag,
) -> Result<TransferStats> {
    let total = reader.len();
    let step = (total / 10).max(1);
    let mut next_report = step;

    loop {
        cancel.check()?;
        let Some(block) = reader.next_block() else {
            break;
        };
        // A closed channel means the compress stage stopped; it reports why.
        if tx.send(block).is_err() {
            break;
        }
        if reader.offset() >= next_report {
            logging::log_transfer_progress(reader.offset(), total, reader.unreadable_blocks());
            while next_report <= reader.offset() {
                next_report += step;
            }
        }
    }

    Ok(TransferStats {
        bytes_read: reader.offset(),
        compressed_bytes: 0,
        blocks: reader.blocks(),
        unreadable_blocks: reader.unreadable_blocks(),
    })
}

fn compress_stage<W: Write>(
    rx: Receiver<Vec<u8>>,
    sink: W,
    level: u32,
    cancel: &CancelFlag,
) -> Result<(u64, W)> {
    let counting = CountingWriter {
        inner: sink,
        count: 0,
    };
    let mut encoder = GzEncoder::new(counting, Compression::new(level));
    for block in rx {
        cancel.check()?;
        encoder
            .write_all(&block)
            .map_err(|e| stage_error(Stage::Compress, format!("gzip write: {e}")))?;
    }
    let counting = encoder
        .finish()
        .map_err(|e| stage_error(Stage::Compress, format!("gzip finish: {e}")))?;
    Ok((counting.count, counting.inner))
}

/// Run the two stages concurrently. The pipeline succeeds only if both do;
/// a compress failure is reported ahead of the read stage's view of it.
pub fn run_pipeline<S, W>(
    reader: BlockReader<S>,
    sink: W,
    options: &TransferOptions,
    cancel: &CancelFlag,
) -> Result<(TransferStats, W)>
where
    S: ReadAt + Send + 'static,
    W: Write,
{
    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(options.channel_depth.max(1));
    let read_cancel = cancel.clone();
    let producer = thread::Builder::new()
        .name("rawbak-read".into())
        .spawn(move || read_stage(reader, tx, &read_cancel))?;

    let compressed = compress_stage(rx, sink, options.compression_level, cancel);
    let read = producer
        .join()
        .unwrap_or_else(|_| Err(stage_error(Stage::Read, "reader thread panicked").into()));

    let (compressed_bytes, sink) = compressed?;
    let mut stats = read?;
    stats.compressed_bytes = compressed_bytes;
    Ok((stats, sink))
}

/// Copy `source` into `temp_file` and fsync it.
pub fn transfer_file(
    source: &SourceDevice,
    options: &TransferOptions,
    temp_file: File,
    cancel: &CancelFlag,
) -> Result<TransferStats> {
    let file = File::open(&source.path).map_err(|e| {
        stage_error(
            Stage::Read,
            format!("open {}: {e}", source.path.display()),
        )
    })?;
    let reader = BlockReader::new(file, source.size, options.block_size);

    let (stats, writer) = run_pipeline(reader, BufWriter::new(temp_file), options, cancel)?;
    let file = writer
        .into_inner()
        .map_err(|e| stage_error(Stage::Compress, format!("flush: {}", e.into_error())))?;
    file.sync_all()
        .map_err(|e| stage_error(Stage::Compress, format!("fsync: {e}")))?;
    Ok(stats)
}
