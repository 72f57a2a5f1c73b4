use crate::errors::DemuxError;
use crate::table::AdaptorTable;
use std::cmp::Ordering;

/// Index of the matched entry in the table's declaration view, `None` when
/// the read(s) stay unassigned and belong in the trash.
pub type Selection = Option<usize>;

/// A selection policy over one table. Both arities are available; the driver
/// calls the one matching the run mode, fixed at startup. Feeding a
/// single-end run through `select_paired` (or the reverse) is a programming
/// error upstream, not something a policy can recover from.
pub trait Select {
    fn select_single(&self, seq: &[u8]) -> Selection;
    fn select_paired(&self, seq1: &[u8], seq2: &[u8]) -> Selection;
}

/// Similarity ratio between two sequences in [0, 1], 1.0 iff identical.
/// Deterministic, so tie detection can use exact float equality.
fn similarity(a: &[u8], b: &[u8]) -> f64 {
    strsim::normalized_levenshtein(&String::from_utf8_lossy(a), &String::from_utf8_lossy(b))
}

/// Max ratio, index of the first entry attaining it, and whether it is
/// uniquely attained. `None` on an empty table.
fn best(ratios: &[f64]) -> Option<(f64, usize, bool)> {
    if ratios.is_empty() {
        return None;
    }
    let max = ratios.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let argmax = ratios.iter().position(|&r| r == max).unwrap();
    let unique = ratios.iter().filter(|&&r| r == max).count() == 1;
    Some((max, argmax, unique))
}

/// Build the policy selected on the command line: no rate means exact
/// dichotomic search, a rate means fuzzy best-match, `--all` tightens the
/// paired-end rule to full agreement.
pub fn selector_for(
    table: &AdaptorTable,
    rate: Option<f64>,
    all_agree: bool,
) -> Result<Box<dyn Select + '_>, DemuxError> {
    match rate {
        None => Ok(Box::new(ExactSelector::new(table))),
        Some(rate) if all_agree => Ok(Box::new(FuzzyAllSelector::new(table, rate)?)),
        Some(rate) => Ok(Box::new(FuzzySelector::new(table, rate)?)),
    }
}

/// Exact prefix lookup by binary search over the sorted view. Sortedness of
/// that view is the precondition making the three-way probe valid.
pub struct ExactSelector<'t> {
    table: &'t AdaptorTable,
}

impl<'t> ExactSelector<'t> {
    pub fn new(table: &'t AdaptorTable) -> Self {
        Self { table }
    }

    fn search(&self, seq: &[u8]) -> Selection {
        let order = self.table.sorted_idx();
        let (mut lo, mut hi) = (0usize, order.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            let adaptor = &self.table.entry(order[mid]).seq;
            let prefix = &seq[..adaptor.len().min(seq.len())];
            match adaptor.as_slice().cmp(prefix) {
                Ordering::Greater => hi = mid,
                Ordering::Less => lo = mid + 1,
                Ordering::Equal => return Some(order[mid]),
            }
        }
        None
    }
}

impl Select for ExactSelector<'_> {
    fn select_single(&self, seq: &[u8]) -> Selection {
        self.search(seq)
    }

    /// Each mate is searched independently; one match carries the pair,
    /// disagreeing matches cancel out.
    fn select_paired(&self, seq1: &[u8], seq2: &[u8]) -> Selection {
        match (self.search(seq1), self.search(seq2)) {
            (None, None) => None,
            (Some(hit), None) | (None, Some(hit)) => Some(hit),
            (Some(hit1), Some(hit2)) if hit1 == hit2 => Some(hit1),
            _ => None,
        }
    }
}

/// Fuzzy best-match over the declaration view: the highest similarity wins
/// if it clears the rate and no other adaptor ties it.
pub struct FuzzySelector<'t> {
    table: &'t AdaptorTable,
    rate: f64,
}

impl<'t> FuzzySelector<'t> {
    pub fn new(table: &'t AdaptorTable, rate: f64) -> Result<Self, DemuxError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(DemuxError::InvalidThreshold(rate));
        }
        Ok(Self { table, rate })
    }

    /// Ratio of every adaptor against the read prefix of that adaptor's length.
    fn prefix_ratios(&self, seq: &[u8]) -> Vec<f64> {
        self.table
            .declaration()
            .iter()
            .map(|entry| similarity(&entry.seq, &seq[..entry.seq.len().min(seq.len())]))
            .collect()
    }
}

impl Select for FuzzySelector<'_> {
    fn select_single(&self, seq: &[u8]) -> Selection {
        let mut ratios = Vec::with_capacity(self.table.len());
        for (idx, entry) in self.table.declaration().iter().enumerate() {
            let ratio = similarity(&entry.seq, &seq[..entry.seq.len().min(seq.len())]);
            // First exact hit wins outright, so declaration order matters.
            if ratio == 1.0 {
                return Some(idx);
            }
            ratios.push(ratio);
        }
        let (max, argmax, unique) = best(&ratios)?;
        if max >= self.rate && unique {
            Some(argmax)
        } else {
            None
        }
    }

    /// The mate with the strictly higher maximum governs; on equal maxima the
    /// two argmax positions must coincide, with uniqueness required on at
    /// least one side (mate 1 checked first).
    fn select_paired(&self, seq1: &[u8], seq2: &[u8]) -> Selection {
        let ratios1 = self.prefix_ratios(seq1);
        let ratios2 = self.prefix_ratios(seq2);
        let (max1, argmax1, unique1) = best(&ratios1)?;
        let (max2, argmax2, unique2) = best(&ratios2)?;

        if max1 > max2 {
            if max1 >= self.rate && unique1 {
                return Some(argmax1);
            }
        } else if max2 > max1 {
            if max2 >= self.rate && unique2 {
                return Some(argmax2);
            }
        } else if max1 >= self.rate {
            if unique1 {
                if argmax1 == argmax2 {
                    return Some(argmax1);
                }
            } else if unique2 && argmax1 == argmax2 {
                return Some(argmax2);
            }
        }
        None
    }
}

/// Like [`FuzzySelector`] for single reads, stricter for pairs: both mates
/// must independently clear the rate, each with a unique best adaptor, and
/// the two best adaptors must be the same entry.
pub struct FuzzyAllSelector<'t> {
    inner: FuzzySelector<'t>,
}

impl<'t> FuzzyAllSelector<'t> {
    pub fn new(table: &'t AdaptorTable, rate: f64) -> Result<Self, DemuxError> {
        Ok(Self {
            inner: FuzzySelector::new(table, rate)?,
        })
    }
}

impl Select for FuzzyAllSelector<'_> {
    fn select_single(&self, seq: &[u8]) -> Selection {
        self.inner.select_single(seq)
    }

    fn select_paired(&self, seq1: &[u8], seq2: &[u8]) -> Selection {
        let (max1, argmax1, unique1) = best(&self.inner.prefix_ratios(seq1))?;
        let (max2, argmax2, unique2) = best(&self.inner.prefix_ratios(seq2))?;
        if max1 >= self.inner.rate
            && max2 >= self.inner.rate
            && unique1
            && unique2
            && argmax1 == argmax2
        {
            Some(argmax1)
        } else {
            None
        }
    }
}

/// Maximal similarity ratio between any two adaptors of the table. High
/// values warn that fuzzy demultiplexing with a low rate will misassign.
pub fn max_adaptor_similarity(table: &AdaptorTable) -> f64 {
    let entries = table.declaration();
    let mut max = 0.0f64;
    for (i, a) in entries.iter().enumerate() {
        for b in &entries[i + 1..] {
            max = max.max(similarity(&a.seq, &b.seq));
        }
    }
    max
}
