use crate::errors::DemuxError;
use crate::io::io::write_record;
use crate::table::AdaptorTable;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::rc::Rc;

type Shared = Rc<RefCell<BufWriter<File>>>;

/// One open output sink per distinct destination tag (a mate pair of sinks in
/// paired-end mode). Entries sharing a tag share the same sink object, so
/// their reads interleave into one file in input order. Every sink is opened
/// up front and flushed exactly once by `finish`, written or not.
#[derive(Debug)]
pub struct SinkRegistry {
    mate1: Vec<Shared>,
    mate2: Vec<Shared>,
    trash1: Shared,
    trash2: Option<Shared>,
    opened: Vec<(String, Shared)>,
}

impl SinkRegistry {
    pub fn build(table: &AdaptorTable, prefix: &str, paired: bool) -> Result<Self, DemuxError> {
        let mut opened: Vec<(String, Shared)> = Vec::new();
        let mut mate1: Vec<Shared> = Vec::with_capacity(table.len());
        let mut mate2: Vec<Shared> = Vec::new();

        // Cache by tag: the second entry with a tag reuses the first one's
        // sink instead of opening the same path twice.
        let mut first_with_tag: HashMap<&str, usize> = HashMap::new();

        for entry in table.declaration() {
            if let Some(&first) = first_with_tag.get(entry.tag.as_str()) {
                mate1.push(mate1[first].clone());
                if paired {
                    mate2.push(mate2[first].clone());
                }
            } else {
                first_with_tag.insert(&entry.tag, mate1.len());
                if paired {
                    mate1.push(open_sink(
                        format!("{prefix}-{}_1.fastq", entry.tag),
                        &mut opened,
                    )?);
                    mate2.push(open_sink(
                        format!("{prefix}-{}_2.fastq", entry.tag),
                        &mut opened,
                    )?);
                } else {
                    mate1.push(open_sink(
                        format!("{prefix}-{}.fastq", entry.tag),
                        &mut opened,
                    )?);
                }
            }
        }

        // The trash always gets its own sink(s), even if nothing lands there.
        let trash = table.trash_tag();
        let (trash1, trash2) = if paired {
            (
                open_sink(format!("{prefix}-{trash}_1.fastq"), &mut opened)?,
                Some(open_sink(format!("{prefix}-{trash}_2.fastq"), &mut opened)?),
            )
        } else {
            (open_sink(format!("{prefix}-{trash}.fastq"), &mut opened)?, None)
        };

        Ok(Self {
            mate1,
            mate2,
            trash1,
            trash2,
            opened,
        })
    }

    /// Append one record to the mate-1 sink of entry `idx` (`None` = trash).
    pub fn write_mate1(
        &self,
        idx: Option<usize>,
        head: &[u8],
        seq: &[u8],
        qual: &[u8],
    ) -> Result<(), DemuxError> {
        let sink = match idx {
            Some(i) => &self.mate1[i],
            None => &self.trash1,
        };
        write_record(&mut *sink.borrow_mut(), head, seq, qual)?;
        Ok(())
    }

    /// Append one record to the mate-2 sink of entry `idx` (`None` = trash).
    /// Only valid on a registry built for paired-end output.
    pub fn write_mate2(
        &self,
        idx: Option<usize>,
        head: &[u8],
        seq: &[u8],
        qual: &[u8],
    ) -> Result<(), DemuxError> {
        let sink = match idx {
            Some(i) => self
                .mate2
                .get(i)
                .expect("mate-2 write on a single-end registry"),
            None => self
                .trash2
                .as_ref()
                .expect("mate-2 write on a single-end registry"),
        };
        write_record(&mut *sink.borrow_mut(), head, seq, qual)?;
        Ok(())
    }

    pub fn is_paired(&self) -> bool {
        self.trash2.is_some()
    }

    /// Flush every opened file exactly once. Also runs on the error path:
    /// whatever was routed before an abort must be complete on disk.
    pub fn finish(&mut self) -> Result<(), DemuxError> {
        for (path, sink) in self.opened.drain(..) {
            sink.borrow_mut().flush().map_err(|e| DemuxError::Write {
                path: path.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

fn open_sink(path: String, opened: &mut Vec<(String, Shared)>) -> Result<Shared, DemuxError> {
    let file = File::create(&path).map_err(|e| DemuxError::Create {
        path: path.clone(),
        source: e,
    })?;
    let sink: Shared = Rc::new(RefCell::new(BufWriter::new(file)));
    opened.push((path, sink.clone()));
    Ok(sink)
}
