// HTTP Range-based media source for remote episodes

use podplay_core::{AudioError, Result};
use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::time::Duration;
use symphonia::core::io::MediaSource;

/// Bytes fetched per Range request (256KB)
const CHUNK_SIZE: usize = 256 * 1024;

/// Chunks kept around for re-reads after a seek (10MB)
const MAX_CACHED_CHUNKS: usize = 40;

/// Whether `uri` is served over HTTP(S)
pub fn is_remote(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn create_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(15))
        .timeout_read(Duration::from_secs(30))
        .user_agent("PodPlay/0.1")
        .redirects(10)
        .build()
}

fn network_error(context: &str, err: ureq::Error) -> AudioError {
    match err {
        ureq::Error::Status(code, _) => AudioError::NetworkError(format!("{}: HTTP {}", context, code)),
        other => AudioError::NetworkError(format!("{}: {}", context, other)),
    }
}

struct Chunk {
    offset: u64,
    data: Vec<u8>,
}

impl Chunk {
    fn contains(&self, position: u64) -> bool {
        position >= self.offset && position < self.offset + self.data.len() as u64
    }
}

/// Seekable reader over a remote file, fetched in chunks with Range requests.
///
/// Servers that ignore `Range` still work; the skipped prefix is read and
/// discarded.
pub struct HttpRangeSource {
    url: String,
    agent: ureq::Agent,
    len: Option<u64>,
    position: u64,
    chunks: VecDeque<Chunk>,
}

impl HttpRangeSource {
    /// Connect and learn the content length. Fails when the server cannot
    /// be reached or answers with an error status.
    pub fn open(url: &str) -> Result<Self> {
        let agent = create_agent();
        let len = content_length(&agent, url)?;
        match len {
            Some(len) => log::info!(
                "[http] {} is {} bytes ({:.2} MB)",
                url,
                len,
                len as f64 / 1024.0 / 1024.0
            ),
            None => log::info!("[http] {} has no known length", url),
        }

        Ok(Self {
            url: url.to_string(),
            agent,
            len,
            position: 0,
            chunks: VecDeque::new(),
        })
    }

    fn cached(&self, position: u64) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.contains(position))
    }

    fn fetch(&mut self, offset: u64) -> Result<()> {
        let mut end = offset + CHUNK_SIZE as u64 - 1;
        if let Some(len) = self.len {
            end = end.min(len.saturating_sub(1));
        }
        log::debug!("[http] fetching bytes={}-{}", offset, end);

        let response = self
            .agent
            .get(&self.url)
            .set("Range", &format!("bytes={}-{}", offset, end))
            .call()
            .map_err(|e| network_error("Range request failed", e))?;

        let ignored_range = response.status() == 200;
        let mut reader = response.into_reader();
        if ignored_range && offset > 0 {
            io::copy(&mut reader.by_ref().take(offset), &mut io::sink())
                .map_err(|e| AudioError::NetworkError(format!("Failed to skip to {}: {}", offset, e)))?;
        }

        let mut data = Vec::with_capacity(CHUNK_SIZE);
        reader
            .take(end - offset + 1)
            .read_to_end(&mut data)
            .map_err(|e| AudioError::NetworkError(format!("Failed to read response: {}", e)))?;

        if self.chunks.len() == MAX_CACHED_CHUNKS {
            self.chunks.pop_front();
        }
        self.chunks.push_back(Chunk { offset, data });
        Ok(())
    }
}

fn content_length(agent: &ureq::Agent, url: &str) -> Result<Option<u64>> {
    match agent.head(url).call() {
        Ok(response) => Ok(response
            .header("Content-Length")
            .and_then(|s| s.parse::<u64>().ok())),
        Err(err) => {
            // Some hosts refuse HEAD; ask for the first byte instead
            log::debug!("[http] HEAD failed ({}), trying a one-byte range", err);
            let response = agent
                .get(url)
                .set("Range", "bytes=0-0")
                .call()
                .map_err(|e| network_error("Cannot open remote source", e))?;

            if let Some(total) = response
                .header("Content-Range")
                .and_then(total_from_content_range)
            {
                return Ok(Some(total));
            }
            Ok(response
                .header("Content-Length")
                .and_then(|s| s.parse::<u64>().ok()))
        }
    }
}

/// `bytes 0-0/12345` -> 12345
fn total_from_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

impl Read for HttpRangeSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.len.is_some_and(|len| self.position >= len) {
            return Ok(0);
        }

        if self.cached(self.position).is_none() {
            self.fetch(self.position)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        }
        let Some(chunk) = self.cached(self.position) else {
            // Nothing came back: end of the resource
            return Ok(0);
        };

        let start = (self.position - chunk.offset) as usize;
        let count = buf.len().min(chunk.data.len() - start);
        buf[..count].copy_from_slice(&chunk.data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let len = self.len.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "Cannot seek from end: length unknown")
                })?;
                len.checked_add_signed(delta)
            }
        };

        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Seek before start of stream")
        })?;
        Ok(self.position)
    }
}

impl MediaSource for HttpRangeSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}
