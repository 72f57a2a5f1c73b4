use crate::errors::DemuxError;
use colored::Colorize;
use serde::Serialize;

/// Final count for one table entry. The wildcard appears as adaptor `*`.
#[derive(Debug, Clone, Serialize)]
pub struct TagCount {
    pub adaptor: String,
    pub tag: String,
    pub reads: u64,
}

/// Per-entry routing counts of a finished run, wildcard last.
#[derive(Debug)]
pub struct DemuxSummary {
    pub counts: Vec<TagCount>,
}

impl DemuxSummary {
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.reads).sum()
    }

    pub fn print(&self) {
        println!("\n{}", "Summary".bold().underline());
        for count in &self.counts {
            println!(
                "  • {}: {} reads",
                count.tag.bold(),
                count.reads.to_string().green().bold()
            );
        }
        println!(
            "  • {}: {} reads\n",
            "total".dimmed(),
            self.total().to_string().bold()
        );
    }

    /// Serde guided TSV report, one row per table entry.
    pub fn write_tsv(&self, path: &str) -> Result<(), DemuxError> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        for count in &self.counts {
            writer.serialize(count)?;
        }
        writer.flush()?;
        Ok(())
    }
}
