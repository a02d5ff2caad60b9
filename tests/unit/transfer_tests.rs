use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use rawbak::signal::CancelFlag;
use rawbak::transfer::native::run_pipeline;
use rawbak::transfer::{BlockReader, ReadAt, Stage, TransferOptions};
use rawbak::Error;

const BLOCK: usize = 4096;

/// In-memory device whose listed blocks fail with EIO.
struct FlakyDevice {
    data: Vec<u8>,
    bad_blocks: Vec<u64>,
}

impl ReadAt for FlakyDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if self.bad_blocks.contains(&(offset / BLOCK as u64)) {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

/// Sink that accepts `limit` bytes and then fails like a full disk.
#[derive(Debug)]
struct FailingSink {
    written: usize,
    limit: usize,
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() > self.limit {
            return Err(io::Error::from_raw_os_error(libc::ENOSPC));
        }
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn options() -> TransferOptions {
    TransferOptions {
        block_size: BLOCK,
        channel_depth: 2,
        ..TransferOptions::default()
    }
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 253) as u8 + 1).collect()
}

fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out).unwrap();
    out
}

#[test]
fn pipeline_produces_gzip_of_the_whole_source() -> rawbak::Result<()> {
    let data = patterned(10 * BLOCK + 123);
    let device = FlakyDevice {
        data: data.clone(),
        bad_blocks: vec![],
    };
    let reader = BlockReader::new(device, data.len() as u64, BLOCK);

    let (stats, sink) = run_pipeline(reader, Vec::new(), &options(), &CancelFlag::new())?;

    assert_eq!(data.len() as u64, stats.bytes_read);
    assert_eq!(11, stats.blocks);
    assert_eq!(0, stats.unreadable_blocks);
    assert_eq!(sink.len() as u64, stats.compressed_bytes);
    assert_eq!(data, gunzip(&sink));
    Ok(())
}

#[test]
fn unreadable_blocks_become_zeros_and_copy_continues() -> rawbak::Result<()> {
    let data = patterned(8 * BLOCK);
    let device = FlakyDevice {
        data: data.clone(),
        bad_blocks: vec![2, 5],
    };
    let reader = BlockReader::new(device, data.len() as u64, BLOCK);

    let (stats, sink) = run_pipeline(reader, Vec::new(), &options(), &CancelFlag::new())?;
    let image = gunzip(&sink);

    assert_eq!(2, stats.unreadable_blocks);
    assert_eq!(data.len(), image.len());
    for block in 0..8 {
        let range = block * BLOCK..(block + 1) * BLOCK;
        if block == 2 || block == 5 {
            assert!(image[range].iter().all(|b| *b == 0), "block {block} not zeroed");
        } else {
            assert_eq!(&data[range.clone()], &image[range], "block {block} differs");
        }
    }
    Ok(())
}

#[test]
fn compressor_failure_fails_the_pipeline() {
    let data = patterned(64 * BLOCK);
    let device = FlakyDevice {
        data: data.clone(),
        bad_blocks: vec![],
    };
    let reader = BlockReader::new(device, data.len() as u64, BLOCK);
    let sink = FailingSink {
        written: 0,
        limit: 0,
    };

    let err = run_pipeline(reader, sink, &options(), &CancelFlag::new())
        .expect_err("sink failure must surface");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::StageFailed {
            stage: Stage::Compress,
            code: 1,
            ..
        })
    ));
    assert_eq!(1, rawbak::exit_code(&err));
}

#[test]
fn cancellation_interrupts_the_pipeline() {
    let data = patterned(4 * BLOCK);
    let device = FlakyDevice {
        data: data.clone(),
        bad_blocks: vec![],
    };
    let reader = BlockReader::new(device, data.len() as u64, BLOCK);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = run_pipeline(reader, Vec::new(), &options(), &cancel)
        .expect_err("cancelled run must fail");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Interrupted)));
    assert_eq!(rawbak::EXIT_INTERRUPTED, rawbak::exit_code(&err));
}

#[test]
fn empty_source_yields_valid_empty_gzip() -> rawbak::Result<()> {
    let device = FlakyDevice {
        data: Vec::new(),
        bad_blocks: vec![],
    };
    let reader = BlockReader::new(device, 0, BLOCK);
    let (stats, sink) = run_pipeline(reader, Vec::new(), &options(), &CancelFlag::new())?;
    assert_eq!(0, stats.bytes_read);
    assert!(gunzip(&sink).is_empty());
    Ok(())
}
