//! Decompression engine
//! --------------------
//!
//! A container's data block is stored one of three ways, chosen by its
//! `compressed` / `condensed` flags:
//!
//! ```ascii
//! compressed condensed  mode        cost of reading one file
//! ---------- ---------  ----------  ----------------------------------------
//! no         any        Plain       seek + read `size` bytes
//! yes        no         Streamed    inflate from block start, skip `data_offset`
//! yes        yes        Compacted   inflate the whole block, slice the file out
//! ```
//!
//! Compressed blocks are a single zlib stream, which cannot be seeked. A single
//! streamed read therefore costs time proportional to the file's offset in the
//! block, and every call starts the decoder over; bulk reads go through
//! `read_spans`, which makes one forward pass over the block instead.
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use tracing::debug;

use crate::entry::{EntryId, Tree};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Plain,
    Streamed,
    Compacted,
}

/// How a container's data block is laid out in its byte source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub compressed: bool,
    pub condensed: bool,
    pub data_block_offset: u64,
    pub data_block_size: u64,
    pub data_block_size_compressed: u64,
}

impl BlockLayout {
    pub fn mode(&self) -> ReadMode {
        match (self.compressed, self.condensed) {
            (false, _) => ReadMode::Plain,
            (true, false) => ReadMode::Streamed,
            (true, true) => ReadMode::Compacted,
        }
    }
}

/// A byte range of a decoded data block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub data_offset: u64,
    pub size: u32,
}

impl Span {
    pub fn end(&self) -> u64 {
        self.data_offset.saturating_add(u64::from(self.size))
    }
}

/// Where a container's bytes come from. `base` is the position of the
/// container's first byte.
#[derive(Debug, Clone)]
pub enum Source {
    Disk { path: PathBuf, base: u64 },
    Memory { bytes: Arc<[u8]>, base: u64 },
}

impl Source {
    pub fn disk<P: AsRef<Path>>(path: P) -> Source {
        Source::Disk {
            path: path.as_ref().to_path_buf(),
            base: 0,
        }
    }

    pub fn memory(bytes: Vec<u8>) -> Source {
        Source::Memory {
            bytes: Arc::from(bytes),
            base: 0,
        }
    }

    /// The same source, starting `offset` bytes further in
    pub fn window(&self, offset: u64) -> Source {
        match self {
            Source::Disk { path, base } => Source::Disk {
                path: path.clone(),
                base: base.saturating_add(offset),
            },
            Source::Memory { bytes, base } => Source::Memory {
                bytes: Arc::clone(bytes),
                base: base.saturating_add(offset),
            },
        }
    }

    pub fn open(&self) -> Result<SourceReader> {
        Ok(match self {
            Source::Disk { path, base } => {
                let mut inner = BufReader::new(File::open(path)?);
                inner.seek(SeekFrom::Start(*base))?;
                SourceReader::Disk { inner, base: *base }
            }
            Source::Memory { bytes, base } => {
                let mut inner = Cursor::new(Arc::clone(bytes));
                inner.set_position(*base);
                SourceReader::Memory { inner, base: *base }
            }
        })
    }
}

/// Reader over a `Source`; seek positions are relative to the source's base.
pub enum SourceReader {
    Disk { inner: BufReader<File>, base: u64 },
    Memory { inner: Cursor<Arc<[u8]>>, base: u64 },
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SourceReader::Disk { inner, .. } => inner.read(buf),
            SourceReader::Memory { inner, .. } => inner.read(buf),
        }
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (absolute, base) = match self {
            SourceReader::Disk { inner, base } => (inner.seek(rebase(pos, *base)?)?, *base),
            SourceReader::Memory { inner, base } => (inner.seek(rebase(pos, *base)?)?, *base),
        };
        absolute.checked_sub(base).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of container")
        })
    }
}

fn rebase(pos: SeekFrom, base: u64) -> io::Result<SeekFrom> {
    match pos {
        SeekFrom::Start(offset) => offset
            .checked_add(base)
            .map(SeekFrom::Start)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflow")),
        other => Ok(other),
    }
}

/// Upper bound on buffer space reserved up front from a table-declared size
const MAX_RESERVE: u64 = 1 << 28;

fn reserve_for(size: u64) -> usize {
    size.min(MAX_RESERVE) as usize
}

fn truncated(name: &str, expected: u64, actual: u64) -> Error {
    Error::TruncatedDecode {
        name: name.to_string(),
        expected,
        actual,
    }
}

/// Read exactly `size` bytes, reporting a short read as truncation
fn read_exactly<R: Read>(reader: &mut R, size: u32, name: &str) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(reserve_for(u64::from(size)));
    reader.take(u64::from(size)).read_to_end(&mut buffer)?;
    if buffer.len() < size as usize {
        return Err(truncated(name, u64::from(size), buffer.len() as u64));
    }
    Ok(buffer)
}

fn block_decoder<'a, R: Read + Seek>(
    reader: &'a mut R,
    layout: &BlockLayout,
) -> Result<ZlibDecoder<io::Take<&'a mut R>>> {
    reader.seek(SeekFrom::Start(layout.data_block_offset))?;
    Ok(ZlibDecoder::new(reader.take(layout.data_block_size_compressed)))
}

/// Plain: seek straight to the file and read it
pub fn read_plain<R: Read + Seek>(
    reader: &mut R,
    layout: &BlockLayout,
    span: Span,
    name: &str,
) -> Result<Vec<u8>> {
    let start = layout
        .data_block_offset
        .checked_add(span.data_offset)
        .ok_or_else(|| truncated(name, u64::from(span.size), 0))?;
    reader.seek(SeekFrom::Start(start))?;
    read_exactly(reader, span.size, name)
}

/// Streamed: run the decoder from the start of the block, discard
/// `data_offset` bytes, then read the file.
pub fn read_streamed<R: Read + Seek>(
    reader: &mut R,
    layout: &BlockLayout,
    span: Span,
    name: &str,
) -> Result<Vec<u8>> {
    let mut decoder = block_decoder(reader, layout)?;
    let skipped = io::copy(&mut (&mut decoder).take(span.data_offset), &mut io::sink())?;
    if skipped < span.data_offset {
        return Err(truncated(name, span.end(), skipped));
    }
    read_exactly(&mut decoder, span.size, name)
}

/// Compacted: inflate the entire data block. Output stops at the declared block
/// size; a short block is returned as-is and surfaces when a file is sliced.
pub fn inflate_block<R: Read + Seek>(reader: &mut R, layout: &BlockLayout) -> Result<Vec<u8>> {
    let decoder = block_decoder(reader, layout)?;
    let mut block = Vec::with_capacity(reserve_for(layout.data_block_size));
    decoder.take(layout.data_block_size).read_to_end(&mut block)?;
    if (block.len() as u64) < layout.data_block_size {
        debug!(
            expected = layout.data_block_size,
            actual = block.len(),
            "data block inflated short"
        );
    }
    Ok(block)
}

/// Slice one file out of an inflated block
pub fn slice_block<'a>(block: &'a [u8], span: Span, name: &str) -> Result<&'a [u8]> {
    let available = (block.len() as u64).saturating_sub(span.data_offset);
    if span.end() > block.len() as u64 {
        return Err(truncated(
            name,
            u64::from(span.size),
            available.min(u64::from(span.size)),
        ));
    }
    Ok(&block[span.data_offset as usize..span.end() as usize])
}

/// Bytes of one file, whatever the container's mode
pub fn read_span(source: &Source, layout: &BlockLayout, span: Span, name: &str) -> Result<Vec<u8>> {
    let mut reader = source.open()?;
    match layout.mode() {
        ReadMode::Plain => read_plain(&mut reader, layout, span, name),
        ReadMode::Streamed => read_streamed(&mut reader, layout, span, name),
        ReadMode::Compacted => {
            let block = inflate_block(&mut reader, layout)?;
            Ok(slice_block(&block, span, name)?.to_vec())
        }
    }
}

/// Bytes of several files of one container, decoding the block at most once.
///
/// Results are returned in the order of `spans`; one bad span does not affect
/// the others. The outer error is reserved for failures of the container
/// itself (cannot open the source, corrupt compacted block).
pub fn read_spans(
    source: &Source,
    layout: &BlockLayout,
    spans: &[(Span, &str)],
) -> Result<Vec<Result<Vec<u8>>>> {
    if spans.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = source.open()?;
    match layout.mode() {
        ReadMode::Plain => Ok(spans
            .iter()
            .map(|(span, name)| read_plain(&mut reader, layout, *span, name))
            .collect()),
        ReadMode::Streamed => read_streamed_spans(&mut reader, layout, spans),
        ReadMode::Compacted => {
            let block = inflate_block(&mut reader, layout)?;
            Ok(spans
                .iter()
                .map(|(span, name)| slice_block(&block, *span, name).map(<[u8]>::to_vec))
                .collect())
        }
    }
}

fn read_streamed_spans<R: Read + Seek>(
    reader: &mut R,
    layout: &BlockLayout,
    spans: &[(Span, &str)],
) -> Result<Vec<Result<Vec<u8>>>> {
    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by_key(|&i| spans[i].0.data_offset);

    let mut results: HashMap<usize, Result<Vec<u8>>> = HashMap::with_capacity(spans.len());
    let mut overlapping = Vec::new();
    {
        let mut decoder = block_decoder(reader, layout)?;
        let mut cursor = 0u64;
        let mut failure: Option<(io::ErrorKind, String)> = None;

        for i in order {
            let (span, name) = spans[i];
            if let Some((kind, message)) = &failure {
                results.insert(i, Err(io::Error::new(*kind, message.clone()).into()));
                continue;
            }
            if span.data_offset < cursor {
                overlapping.push(i);
                continue;
            }

            let gap = span.data_offset - cursor;
            let skipped = io::copy(&mut (&mut decoder).take(gap), &mut io::sink());
            let result = skipped.and_then(|skipped| {
                cursor += skipped;
                let mut buffer = Vec::with_capacity(reserve_for(u64::from(span.size)));
                if skipped == gap {
                    (&mut decoder)
                        .take(u64::from(span.size))
                        .read_to_end(&mut buffer)?;
                    cursor += buffer.len() as u64;
                }
                Ok(buffer)
            });

            let result = match result {
                Ok(buffer) if buffer.len() == span.size as usize => Ok(buffer),
                Ok(buffer) => Err(truncated(name, u64::from(span.size), buffer.len() as u64)),
                Err(e) => {
                    failure = Some((e.kind(), e.to_string()));
                    Err(e.into())
                }
            };
            results.insert(i, result);
        }
    }

    // Spans starting inside bytes already consumed need their own pass.
    for i in overlapping {
        let (span, name) = spans[i];
        results.insert(i, read_streamed(reader, layout, span, name));
    }

    Ok((0..spans.len())
        .map(|i| {
            results
                .remove(&i)
                .unwrap_or_else(|| Err(truncated(spans[i].1, u64::from(spans[i].0.size), 0)))
        })
        .collect())
}

/// Seekable view over the start of one span of a decoded block.
///
/// Bytes are pulled from the decoder only as far as reads reach, and kept so
/// earlier positions can be revisited. Nothing past the span's size is decoded.
pub struct SpanPrefix<R> {
    inner: io::Take<R>,
    size: u64,
    buffer: Vec<u8>,
    position: u64,
    failure: Option<(io::ErrorKind, String)>,
}

impl<R: Read> SpanPrefix<R> {
    pub fn new(inner: R, size: u32) -> SpanPrefix<R> {
        SpanPrefix {
            inner: inner.take(u64::from(size)),
            size: u64::from(size),
            buffer: Vec::new(),
            position: 0,
            failure: None,
        }
    }

    /// Bytes taken from the decoder so far
    pub fn consumed(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn fill_to(&mut self, end: u64) -> io::Result<()> {
        let end = end.min(self.size);
        let have = self.buffer.len() as u64;
        if end <= have {
            return Ok(());
        }
        let result = (&mut self.inner).take(end - have).read_to_end(&mut self.buffer);
        if let Err(e) = &result {
            self.failure = Some((e.kind(), e.to_string()));
        }
        result.map(|_| ())
    }
}

impl<R: Read> Read for SpanPrefix<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill_to(self.position.saturating_add(buf.len() as u64))?;
        let start = usize::try_from(self.position)
            .unwrap_or(usize::MAX)
            .min(self.buffer.len());
        let available = &self.buffer[start..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl<R: Read> Seek for SpanPrefix<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
        };
        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek outside of span")
        })?;
        Ok(self.position)
    }
}

/// Run `visit` over the start of each span of a compressed block in one
/// forward pass. Only the bytes `visit` reads are decoded, and they are
/// dropped before the next span is reached.
///
/// Results are returned in the order of `spans`. A decoder failure fails the
/// span being visited and every span after it.
pub fn scan_span_prefixes<T, F>(
    source: &Source,
    layout: &BlockLayout,
    spans: &[(Span, &str)],
    mut visit: F,
) -> Result<Vec<Result<T>>>
where
    F: FnMut(&mut SpanPrefix<&mut dyn Read>) -> Result<T>,
{
    if spans.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = source.open()?;
    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by_key(|&i| spans[i].0.data_offset);

    let mut results: Vec<Option<Result<T>>> = (0..spans.len()).map(|_| None).collect();
    let mut overlapping = Vec::new();
    {
        let mut decoder = block_decoder(&mut reader, layout)?;
        let mut cursor = 0u64;
        let mut failure: Option<(io::ErrorKind, String)> = None;

        for i in order {
            let (span, name) = spans[i];
            if let Some((kind, message)) = &failure {
                results[i] = Some(Err(io::Error::new(*kind, message.clone()).into()));
                continue;
            }
            if span.data_offset < cursor {
                overlapping.push(i);
                continue;
            }

            let gap = span.data_offset - cursor;
            let skipped = match io::copy(&mut (&mut decoder).take(gap), &mut io::sink()) {
                Ok(skipped) => skipped,
                Err(e) => {
                    failure = Some((e.kind(), e.to_string()));
                    results[i] = Some(Err(e.into()));
                    continue;
                }
            };
            cursor += skipped;
            if skipped < gap {
                results[i] = Some(Err(truncated(name, span.end(), cursor)));
                continue;
            }

            let mut prefix = SpanPrefix::new(&mut decoder as &mut dyn Read, span.size);
            results[i] = Some(visit(&mut prefix));
            cursor += prefix.consumed();
            if let Some(error) = prefix.failure.take() {
                failure = Some(error);
            }
        }
    }

    // Spans starting inside bytes already consumed need their own pass.
    for i in overlapping {
        let (span, name) = spans[i];
        results[i] = Some(visit_span_prefix(&mut reader, layout, span, name, &mut visit));
    }

    Ok(results
        .into_iter()
        .enumerate()
        .map(|(i, result)| {
            result.unwrap_or_else(|| Err(truncated(spans[i].1, u64::from(spans[i].0.size), 0)))
        })
        .collect())
}

fn visit_span_prefix<T, F>(
    reader: &mut SourceReader,
    layout: &BlockLayout,
    span: Span,
    name: &str,
    visit: &mut F,
) -> Result<T>
where
    F: FnMut(&mut SpanPrefix<&mut dyn Read>) -> Result<T>,
{
    let mut decoder = block_decoder(reader, layout)?;
    let skipped = io::copy(&mut (&mut decoder).take(span.data_offset), &mut io::sink())?;
    if skipped < span.data_offset {
        return Err(truncated(name, span.end(), skipped));
    }
    visit(&mut SpanPrefix::new(&mut decoder as &mut dyn Read, span.size))
}

impl Tree {
    /// Byte source of a container's data. Outer archives read their file on disk;
    /// a nested container reads a window of its archive when the archive is plain,
    /// and its decoded bytes otherwise.
    pub fn container_source(&self, dir: EntryId) -> Result<Source> {
        let directory = self.directory(dir)?;
        if let Some(path) = &directory.archive_path {
            return Ok(Source::disk(path));
        }
        let parent = match directory.info.parent {
            Some(parent) if !self.is_root(parent) => parent,
            _ => return Err(Error::ParentUnavailable(self.path_of(dir))),
        };
        let outer = self.directory(parent)?;
        let outer_source = self.container_source(parent)?;
        let outer_layout = outer.layout();
        match outer_layout.mode() {
            ReadMode::Plain => Ok(outer_source.window(
                outer_layout
                    .data_block_offset
                    .saturating_add(directory.info.data_offset),
            )),
            _ => {
                let span = self.get(dir).span();
                let bytes = read_span(&outer_source, &outer_layout, span, &directory.info.name)?;
                Ok(Source::memory(bytes))
            }
        }
    }

    /// Decode one file on demand, ignoring any cached copy
    pub fn decode_file(&self, id: EntryId) -> Result<Vec<u8>> {
        let file = self.file(id)?;
        let parent = match file.info.parent {
            Some(parent) if !self.is_root(parent) => parent,
            _ => return Err(Error::ParentUnavailable(self.path_of(id))),
        };
        let container = self.directory(parent)?;
        if container.compacted() {
            if let Some(outer) = container.info.parent.filter(|&p| !self.is_root(p)) {
                if self.directory(outer)?.compacted() {
                    return Err(Error::UnsupportedCompactedNestedRead(self.path_of(id)));
                }
            }
        }

        let source = self.container_source(parent)?;
        read_span(&source, &container.layout(), self.get(id).span(), &file.info.name)
    }
}
