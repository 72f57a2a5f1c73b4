use crate::errors::DemuxError;
use flate2::read::MultiGzDecoder;
use seq_io::fastq::Reader;
use std::fs::File;
use std::io::{self, Read, Write};

/// Open a FASTQ file, transparently decompressing gzip if the path ends in `.gz`
pub fn open_fastq(path: &str) -> Result<Reader<Box<dyn Read + Send>>, DemuxError> {
    let file = File::open(path).map_err(|e| DemuxError::Open {
        path: path.to_string(),
        source: e,
    })?;
    let reader: Box<dyn Read + Send> = if path.to_ascii_lowercase().ends_with(".gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Reader::new(reader))
}

/// Append one four-line record. The separator line is normalized to a bare `+`.
pub fn write_record<W: Write>(
    out: &mut W,
    head: &[u8],
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    out.write_all(b"@")?;
    out.write_all(head)?;
    out.write_all(b"\n")?;
    out.write_all(seq)?;
    out.write_all(b"\n+\n")?;
    out.write_all(qual)?;
    out.write_all(b"\n")
}
