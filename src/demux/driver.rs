use crate::errors::DemuxError;
use crate::progress::records_spinner;
use crate::report::{DemuxSummary, TagCount};
use crate::select::{selector_for, Select};
use crate::sink::SinkRegistry;
use crate::table::AdaptorTable;
use colored::Colorize;
use seq_io::fastq::{Reader, Record};
use std::io::Read;

/// How many leading bases of an unassigned read the verbose log shows.
const TRASH_PREVIEW: usize = 14;

/// Per-read routing diagnostics, injected so the driver itself never touches
/// the console.
pub trait RouteLog {
    fn routed(&mut self, read: &[u8], prefix: &[u8], tag: &str);
}

pub struct NullLog;

impl RouteLog for NullLog {
    fn routed(&mut self, _read: &[u8], _prefix: &[u8], _tag: &str) {}
}

pub struct ConsoleLog;

impl RouteLog for ConsoleLog {
    fn routed(&mut self, read: &[u8], prefix: &[u8], tag: &str) {
        println!(
            "  {} '{}' starts with {}... and goes to {}",
            "Read".dimmed(),
            String::from_utf8_lossy(read),
            String::from_utf8_lossy(prefix),
            tag.bold()
        );
    }
}

/// Strip `len` leading bases from sequence and quality in lockstep. Eating
/// the whole read (or more) is a fatal condition, never a truncation.
fn trim<'a>(
    head: &[u8],
    seq: &'a [u8],
    qual: &'a [u8],
    len: usize,
) -> Result<(&'a [u8], &'a [u8]), DemuxError> {
    if len >= seq.len() {
        return Err(DemuxError::TrimTooLong {
            read: String::from_utf8_lossy(head).into_owned(),
            len,
        });
    }
    Ok((&seq[len..], &qual[len..]))
}

/// The streaming pipeline: pull records, classify, trim, route, count.
/// Setup happens in `new` (policy validated before any output file exists),
/// streaming in `run_single`/`run_paired`, and both of those flush every
/// sink before reporting, error or not.
pub struct Demultiplexer<'t> {
    table: &'t AdaptorTable,
    selector: Box<dyn Select + 't>,
    registry: SinkRegistry,
    counters: Vec<u64>,
}

// The `selector` trait object is not `Debug`, so the struct can't derive it;
// this hand-written impl skips that field and reports the rest.
impl std::fmt::Debug for Demultiplexer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demultiplexer")
            .field("table", &self.table)
            .field("registry", &self.registry)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<'t> Demultiplexer<'t> {
    pub fn new(
        table: &'t AdaptorTable,
        rate: Option<f64>,
        all_agree: bool,
        output_prefix: &str,
        paired: bool,
    ) -> Result<Self, DemuxError> {
        // Threshold validation must fire before the registry creates files.
        let selector = selector_for(table, rate, all_agree)?;
        let registry = SinkRegistry::build(table, output_prefix, paired)?;
        let counters = vec![0; table.len() + 1];
        Ok(Self {
            table,
            selector,
            registry,
            counters,
        })
    }

    pub fn run_single<R: Read>(
        &mut self,
        reader: Reader<R>,
        log: &mut dyn RouteLog,
    ) -> Result<DemuxSummary, DemuxError> {
        let streamed = self.stream_single(reader, log);
        let closed = self.registry.finish();
        streamed?;
        closed?;
        Ok(self.summary())
    }

    pub fn run_paired<R1: Read, R2: Read>(
        &mut self,
        reader1: Reader<R1>,
        reader2: Reader<R2>,
        paths: (&str, &str),
        strict: bool,
        log: &mut dyn RouteLog,
    ) -> Result<DemuxSummary, DemuxError> {
        let streamed = self.stream_paired(reader1, reader2, paths, strict, log);
        let closed = self.registry.finish();
        streamed?;
        closed?;
        Ok(self.summary())
    }

    fn stream_single<R: Read>(
        &mut self,
        mut reader: Reader<R>,
        log: &mut dyn RouteLog,
    ) -> Result<(), DemuxError> {
        let spinner = records_spinner();
        let mut seen: u64 = 0;

        while let Some(record) = reader.next() {
            let record = record?;
            let seq = record.seq();

            match self.selector.select_single(seq) {
                Some(idx) => {
                    let entry = self.table.entry(idx);
                    let cut = entry.seq.len();
                    log.routed(record.head(), &seq[..cut.min(seq.len())], &entry.tag);
                    let (seq, qual) = trim(record.head(), seq, record.qual(), cut)?;
                    self.registry.write_mate1(Some(idx), record.head(), seq, qual)?;
                    self.counters[idx] += 1;
                }
                None => {
                    log.routed(
                        record.head(),
                        &seq[..seq.len().min(TRASH_PREVIEW)],
                        self.table.trash_tag(),
                    );
                    self.registry
                        .write_mate1(None, record.head(), seq, record.qual())?;
                    *self.counters.last_mut().unwrap() += 1;
                }
            }

            seen += 1;
            spinner.set_message(seen.to_string());
        }

        spinner.finish_with_message(format!("{seen} reads"));
        Ok(())
    }

    fn stream_paired<R1: Read, R2: Read>(
        &mut self,
        mut reader1: Reader<R1>,
        mut reader2: Reader<R2>,
        paths: (&str, &str),
        strict: bool,
        log: &mut dyn RouteLog,
    ) -> Result<(), DemuxError> {
        let spinner = records_spinner();
        let mut seen: u64 = 0;

        loop {
            match (reader1.next(), reader2.next()) {
                (None, None) => break,
                (Some(rec1), Some(rec2)) => {
                    let rec1 = rec1?;
                    let rec2 = rec2?;
                    let (seq1, seq2) = (rec1.seq(), rec2.seq());

                    match self.selector.select_paired(seq1, seq2) {
                        Some(idx) => {
                            let entry = self.table.entry(idx);
                            let cut = entry.seq.len();
                            log.routed(rec1.head(), &seq1[..cut.min(seq1.len())], &entry.tag);
                            // Trim both mates before either write, so an
                            // abort never leaves half a pair on disk.
                            let (s1, q1) = trim(rec1.head(), seq1, rec1.qual(), cut)?;
                            let (s2, q2) = trim(rec2.head(), seq2, rec2.qual(), cut)?;
                            self.registry.write_mate1(Some(idx), rec1.head(), s1, q1)?;
                            self.registry.write_mate2(Some(idx), rec2.head(), s2, q2)?;
                            self.counters[idx] += 1;
                        }
                        None => {
                            log.routed(
                                rec1.head(),
                                &seq1[..seq1.len().min(TRASH_PREVIEW)],
                                self.table.trash_tag(),
                            );
                            self.registry
                                .write_mate1(None, rec1.head(), seq1, rec1.qual())?;
                            self.registry
                                .write_mate2(None, rec2.head(), seq2, rec2.qual())?;
                            *self.counters.last_mut().unwrap() += 1;
                        }
                    }

                    seen += 1;
                    spinner.set_message(seen.to_string());
                }
                // One stream ran dry: by default stop at the shorter file,
                // in strict mode the leftover is an error.
                (Some(_), None) => {
                    if strict {
                        return Err(DemuxError::PairedStreamMismatch {
                            path: paths.0.to_string(),
                        });
                    }
                    break;
                }
                (None, Some(_)) => {
                    if strict {
                        return Err(DemuxError::PairedStreamMismatch {
                            path: paths.1.to_string(),
                        });
                    }
                    break;
                }
            }
        }

        spinner.finish_with_message(format!("{seen} pairs"));
        Ok(())
    }

    fn summary(&self) -> DemuxSummary {
        let mut counts: Vec<TagCount> = self
            .table
            .declaration()
            .iter()
            .zip(&self.counters)
            .map(|(entry, &reads)| TagCount {
                adaptor: String::from_utf8_lossy(&entry.seq).into_owned(),
                tag: entry.tag.clone(),
                reads,
            })
            .collect();
        counts.push(TagCount {
            adaptor: "*".to_string(),
            tag: self.table.trash_tag().to_string(),
            reads: *self.counters.last().unwrap(),
        });
        DemuxSummary { counts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn reader(content: &'static [u8]) -> Reader<&'static [u8]> {
        Reader::new(content)
    }

    fn prefix_in(dir: &tempfile::TempDir) -> String {
        dir.path().join("run").to_str().unwrap().to_string()
    }

    #[test]
    fn test_single_end_exact_match_trims_and_counts() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("AAA s1\n* trash\n").unwrap();
        let mut demux = Demultiplexer::new(&table, None, false, &prefix, false).unwrap();

        let input = b"@r1\nAAACCCGGG\n+\nIIIHHHGGG\n";
        let summary = demux.run_single(reader(input), &mut NullLog).unwrap();

        assert_eq!(summary.counts[0].tag, "s1");
        assert_eq!(summary.counts[0].reads, 1);
        assert_eq!(summary.counts[1].tag, "trash");
        assert_eq!(summary.counts[1].reads, 0);

        // Adaptor length stripped from sequence and quality in lockstep.
        let matched = fs::read_to_string(format!("{prefix}-s1.fastq")).unwrap();
        assert_eq!(matched, "@r1\nCCCGGG\n+\nHHHGGG\n");
        // The trash file exists even though nothing was routed there.
        assert_eq!(fs::read_to_string(format!("{prefix}-trash.fastq")).unwrap(), "");
    }

    #[test]
    fn test_single_end_unmatched_is_written_verbatim() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("AAA s1\n* trash\n").unwrap();
        let mut demux = Demultiplexer::new(&table, None, false, &prefix, false).unwrap();

        let input = b"@r1 extra meta\nTTTCCC\n+\nIIIIII\n";
        let summary = demux.run_single(reader(input), &mut NullLog).unwrap();

        assert_eq!(summary.counts[0].reads, 0);
        assert_eq!(summary.counts[1].reads, 1);
        let trash = fs::read_to_string(format!("{prefix}-trash.fastq")).unwrap();
        assert_eq!(trash, "@r1 extra meta\nTTTCCC\n+\nIIIIII\n");
    }

    #[test]
    fn test_wildcard_only_table_routes_everything_to_trash() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("* trash\n").unwrap();
        let mut demux = Demultiplexer::new(&table, None, false, &prefix, false).unwrap();

        let input = b"@r1\nACGT\n+\nIIII\n@r2\nTGCA\n+\nIIII\n";
        let summary = demux.run_single(reader(input), &mut NullLog).unwrap();

        assert_eq!(summary.counts.len(), 1);
        assert_eq!(summary.counts[0].tag, "trash");
        assert_eq!(summary.counts[0].reads, 2);
    }

    #[test]
    fn test_trim_too_long_aborts_but_keeps_earlier_output() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("AAA s1\n* trash\n").unwrap();
        let mut demux = Demultiplexer::new(&table, None, false, &prefix, false).unwrap();

        // Second read is exactly the adaptor: nothing would remain after
        // trimming, which is fatal.
        let input = b"@r1\nAAACCC\n+\nIIIIII\n@r2\nAAA\n+\nIII\n";
        let err = demux.run_single(reader(input), &mut NullLog).unwrap_err();
        assert!(matches!(err, DemuxError::TrimTooLong { len: 3, .. }));

        // The abort still flushed what was already routed.
        let matched = fs::read_to_string(format!("{prefix}-s1.fastq")).unwrap();
        assert_eq!(matched, "@r1\nCCC\n+\nIII\n");
    }

    #[test]
    fn test_paired_one_sided_match_trims_both_mates() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("AAA s1\n* trash\n").unwrap();
        let mut demux = Demultiplexer::new(&table, None, false, &prefix, true).unwrap();

        let mate1 = b"@p1/1\nAAACCC\n+\nIIIIII\n@p2/1\nGGGCCC\n+\nIIIIII\n";
        let mate2 = b"@p1/2\nTTTGGG\n+\nHHHHHH\n@p2/2\nTTTGGG\n+\nHHHHHH\n";
        let summary = demux
            .run_paired(reader(mate1), reader(mate2), ("m1", "m2"), false, &mut NullLog)
            .unwrap();

        assert_eq!(summary.counts[0].reads, 1);
        assert_eq!(summary.counts[1].reads, 1);

        // The matched pair loses the adaptor length on both mates.
        let s1_1 = fs::read_to_string(format!("{prefix}-s1_1.fastq")).unwrap();
        let s1_2 = fs::read_to_string(format!("{prefix}-s1_2.fastq")).unwrap();
        assert_eq!(s1_1, "@p1/1\nCCC\n+\nIII\n");
        assert_eq!(s1_2, "@p1/2\nGGG\n+\nHHH\n");

        // The unmatched pair lands verbatim in both trash files.
        let t1 = fs::read_to_string(format!("{prefix}-trash_1.fastq")).unwrap();
        let t2 = fs::read_to_string(format!("{prefix}-trash_2.fastq")).unwrap();
        assert_eq!(t1, "@p2/1\nGGGCCC\n+\nIIIIII\n");
        assert_eq!(t2, "@p2/2\nTTTGGG\n+\nHHHHHH\n");
    }

    #[test]
    fn test_paired_stops_at_shorter_stream_by_default() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("AAA s1\n* trash\n").unwrap();
        let mut demux = Demultiplexer::new(&table, None, false, &prefix, true).unwrap();

        let mate1 = b"@p1/1\nAAACCC\n+\nIIIIII\n@p2/1\nAAAGGG\n+\nIIIIII\n";
        let mate2 = b"@p1/2\nTTTGGG\n+\nHHHHHH\n";
        let summary = demux
            .run_paired(reader(mate1), reader(mate2), ("m1", "m2"), false, &mut NullLog)
            .unwrap();

        // Only the complete pair was processed.
        assert_eq!(summary.total(), 1);
    }

    #[test]
    fn test_paired_strict_mode_reports_leftover_stream() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("AAA s1\n* trash\n").unwrap();
        let mut demux = Demultiplexer::new(&table, None, false, &prefix, true).unwrap();

        let mate1 = b"@p1/1\nAAACCC\n+\nIIIIII\n@p2/1\nAAAGGG\n+\nIIIIII\n";
        let mate2 = b"@p1/2\nTTTGGG\n+\nHHHHHH\n";
        let err = demux
            .run_paired(reader(mate1), reader(mate2), ("m1", "m2"), true, &mut NullLog)
            .unwrap_err();
        assert!(matches!(err, DemuxError::PairedStreamMismatch { path } if path == "m1"));
    }

    #[test]
    fn test_invalid_threshold_creates_no_files() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table = AdaptorTable::parse("AAA s1\n* trash\n").unwrap();

        let err = Demultiplexer::new(&table, Some(2.0), false, &prefix, false).unwrap_err();
        assert!(matches!(err, DemuxError::InvalidThreshold(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_fuzzy_run_end_to_end() {
        let dir = tempdir().unwrap();
        let prefix = prefix_in(&dir);
        let table =
            AdaptorTable::parse("AAAAAAAAAAAAAAAAAAAA s1\nCCCCCCCCCCCCCCCCCCCC s2\n* trash\n")
                .unwrap();
        let mut demux = Demultiplexer::new(&table, Some(0.9), false, &prefix, false).unwrap();

        // One substitution inside the adaptor prefix: similarity 0.95.
        let input = b"@r1\nAAAAAAAAAAAAAAAAAAATGGGG\n+\nIIIIIIIIIIIIIIIIIIIIIIII\n";
        let summary = demux.run_single(reader(input), &mut NullLog).unwrap();

        assert_eq!(summary.counts[0].reads, 1);
        let matched = fs::read_to_string(format!("{prefix}-s1.fastq")).unwrap();
        assert_eq!(matched, "@r1\nGGGG\n+\nIIII\n");
    }
}
