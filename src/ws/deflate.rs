use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

use super::consts::DEFLATE_TRAILER;
use crate::error::{Error, Result};

const CHUNK: usize = 4096;

/// permessage-deflate state of one connection.
///
/// Both directions keep their dictionary for the whole lifetime of the
/// connection (context takeover is always on), so one `Deflate` must serve
/// every message of a connection.
pub struct Deflate {
    compress: Compress,
    decompress: Decompress,
}

impl std::fmt::Debug for Deflate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deflate")
            .field("total_in", &self.compress.total_in())
            .field("total_out", &self.decompress.total_out())
            .finish()
    }
}

impl Deflate {
    pub fn new(level: u32) -> Self {
        Deflate {
            // raw deflate, no zlib header
            compress: Compress::new(Compression::new(level), false),
            decompress: Decompress::new(false),
        }
    }

    /// Compresses one message, sync-flushed with the trailing empty block removed.
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() / 2 + CHUNK);
        let start = self.compress.total_in();
        loop {
            let consumed = (self.compress.total_in() - start) as usize;
            self.compress
                .compress_vec(&data[consumed..], &mut output, FlushCompress::Sync)
                .map_err(|e| Error::Compression(e.to_string()))?;
            let consumed = (self.compress.total_in() - start) as usize;
            // a flush is complete once the output was not filled up
            if consumed == data.len() && output.len() < output.capacity() {
                break;
            }
            output.reserve(CHUNK);
        }
        if output.ends_with(&DEFLATE_TRAILER) {
            output.truncate(output.len() - DEFLATE_TRAILER.len());
        }
        Ok(output)
    }

    /// Inflates one message, restoring the trailer stripped by the sender.
    pub fn decompress(&mut self, data: &[u8], limit: u64) -> Result<Vec<u8>> {
        let input = [data, &DEFLATE_TRAILER[..]].concat();
        let mut output = Vec::with_capacity(data.len() * 2 + CHUNK);
        let start = self.decompress.total_in();
        loop {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            self.decompress
                .decompress_vec(
                    &input[(before_in - start) as usize..],
                    &mut output,
                    FlushDecompress::Sync,
                )
                .map_err(|e| Error::Compression(e.to_string()))?;
            if output.len() as u64 > limit {
                return Err(Error::MessageTooLarge {
                    size: output.len() as u64,
                    limit,
                });
            }
            let consumed = (self.decompress.total_in() - start) as usize;
            if consumed == input.len() && output.len() < output.capacity() {
                break;
            }
            if self.decompress.total_in() == before_in
                && self.decompress.total_out() == before_out
            {
                return Err(Error::Compression("deflate stream stalled".into()));
            }
            output.reserve(CHUNK);
        }
        Ok(output)
    }
}
